use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Extension, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    consumers::{self, InProcessSink},
    messaging::AmqpPublisher,
    platform::{
        app_state::AppState,
        middleware::JwtKeys,
        outbox::{self, EventSink},
    },
};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn init_env() {
    if dotenvy::dotenv().is_err() {
        tracing::debug!("No .env file found, using process environment");
    }
}

/// Attaches the layers every deployment needs: auth keys, tracing, CORS and state.
pub fn finalize_router(app: Router<AppState>, state: AppState) -> Router {
    let keys = JwtKeys::from_secret(&state.config.auth.jwt_secret);

    app.layer(Extension(keys))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Starts the outbox relay and event consumers, then serves HTTP until shutdown.
pub async fn bootstrap(service_name: &str, app: Router<AppState>, state: AppState) -> Result<()> {
    let sink: Arc<dyn EventSink> = match &state.config.amqp {
        Some(amqp) => {
            let publisher = AmqpPublisher::connect(amqp)
                .await
                .context("Failed to connect to AMQP")?;
            consumers::spawn_amqp_consumers(state.clone(), amqp.clone());
            Arc::new(publisher)
        }
        None => {
            tracing::info!("AMQP_URL not set, dispatching events in-process");
            Arc::new(InProcessSink::new(state.clone()))
        }
    };
    outbox::spawn_relay(state.clone(), sink);

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let app = finalize_router(app, state);

    tracing::info!("{} listening on {}", service_name, addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
    tracing::info!("Shutting down");
}
