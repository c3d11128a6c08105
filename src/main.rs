use anyhow::Result;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use storefront_service::{
    build_router,
    platform::{
        app_state::AppState,
        bootstrap::{self, bootstrap},
        config, db,
    },
};

/// Migrations embedded into the binary so the image needs no migration files.
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    bootstrap::init_tracing();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let pool = db::create_pool(&config.database);
    let state = AppState::new(pool, config);

    tracing::info!("Bootstrapping...");
    bootstrap("StorefrontService", build_router(), state).await?;
    Ok(())
}
