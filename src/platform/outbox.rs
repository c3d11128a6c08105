//! Transactional outbox.
//!
//! Handlers call [`publish`] inside the transaction that changes state. The
//! relay started by [`spawn_relay`] later hands each due row to an
//! [`EventSink`] and marks it `SENT`. A failed delivery stays `PENDING` with
//! an exponential backoff until it runs out of attempts and becomes `FAILED`.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    models::{CreateOutboxEntity, OutboxEntity},
    platform::app_state::AppState,
    schema::outbox,
};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_SENT: &str = "SENT";
pub const STATUS_FAILED: &str = "FAILED";

const MAX_BACKOFF_SECS: i64 = 300;

/// Wait before the next attempt once `attempts` deliveries have failed.
pub fn retry_delay(attempts: i32) -> TimeDelta {
    let exponent = attempts.clamp(1, 16) as u32 - 1;
    TimeDelta::seconds((1_i64 << exponent).min(MAX_BACKOFF_SECS))
}

/// What happens to a row after a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retry { attempts: i32, at: DateTime<Utc> },
    GiveUp { attempts: i32 },
}

pub fn after_failure(
    previous_attempts: i32,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> FailureOutcome {
    let attempts = previous_attempts.saturating_add(1);
    if attempts >= max_attempts {
        FailureOutcome::GiveUp { attempts }
    } else {
        FailureOutcome::Retry {
            attempts,
            at: now + retry_delay(attempts),
        }
    }
}

/// Queues an event in the caller's transaction.
pub async fn publish<T: Serialize>(
    conn: &mut AsyncPgConnection,
    event_type: String,
    payload: T,
) -> Result<OutboxEntity> {
    let payload = serde_json::to_string(&payload).context("Failed to serialize event")?;

    diesel::insert_into(outbox::table)
        .values(CreateOutboxEntity {
            event_type,
            payload,
            status: STATUS_PENDING.into(),
        })
        .returning(OutboxEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to write outbox event")
}

/// Destination of relayed events: a broker, or the in-process consumers.
pub trait EventSink: Send + Sync {
    fn deliver<'a>(&'a self, event_type: &'a str, payload: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Drains one batch of due events. Returns how many were handled.
pub async fn relay_batch(state: &AppState, sink: &dyn EventSink) -> Result<usize> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;
    let batch_size = state.config.storefront.outbox_batch_size;
    let max_attempts = state.config.storefront.outbox_max_attempts;

    conn.transaction(move |conn| {
        Box::pin(async move {
            let due: Vec<OutboxEntity> = outbox::table
                .filter(outbox::status.eq(STATUS_PENDING))
                .filter(outbox::next_attempt_at.le(diesel::dsl::now))
                .order_by(outbox::id.asc())
                .limit(batch_size)
                .for_update()
                .skip_locked()
                .select(OutboxEntity::as_select())
                .get_results(conn)
                .await
                .context("Failed to load pending outbox events")?;

            for event in &due {
                let target = outbox::table.find(event.id);
                match sink.deliver(&event.event_type, &event.payload).await {
                    Ok(()) => {
                        diesel::update(target)
                            .set((
                                outbox::status.eq(STATUS_SENT),
                                outbox::attempts.eq(event.attempts + 1),
                                outbox::last_error.eq(None::<String>),
                                outbox::updated_at.eq(diesel::dsl::now),
                            ))
                            .execute(conn)
                            .await
                            .context("Failed to update outbox status")?;
                    }
                    Err(err) => {
                        let reason = format!("{:#}", err);
                        let (status, attempts, next_attempt_at) =
                            match after_failure(event.attempts, max_attempts, Utc::now()) {
                                FailureOutcome::Retry { attempts, at } => {
                                    warn!(
                                        outbox_id = event.id,
                                        event_type = %event.event_type,
                                        attempts,
                                        retry_at = %at,
                                        "Failed to relay event: {}",
                                        reason
                                    );
                                    (STATUS_PENDING, attempts, at)
                                }
                                FailureOutcome::GiveUp { attempts } => {
                                    error!(
                                        outbox_id = event.id,
                                        event_type = %event.event_type,
                                        attempts,
                                        "Giving up on event: {}",
                                        reason
                                    );
                                    (STATUS_FAILED, attempts, event.next_attempt_at)
                                }
                            };

                        diesel::update(target)
                            .set((
                                outbox::status.eq(status),
                                outbox::attempts.eq(attempts),
                                outbox::next_attempt_at.eq(next_attempt_at),
                                outbox::last_error.eq(Some(reason)),
                                outbox::updated_at.eq(diesel::dsl::now),
                            ))
                            .execute(conn)
                            .await
                            .context("Failed to update outbox status")?;
                    }
                }
            }

            Ok::<usize, anyhow::Error>(due.len())
        })
    })
    .await
}

/// Polls the outbox forever on the configured interval.
pub fn spawn_relay(state: AppState, sink: Arc<dyn EventSink>) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_millis(state.config.storefront.outbox_poll_millis);
    info!(interval_ms = interval.as_millis() as u64, "Starting outbox relay");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match relay_batch(&state, sink.as_ref()).await {
                Ok(0) => {}
                Ok(count) => info!("Relayed {} outbox events", count),
                Err(err) => warn!("Outbox relay failed: {:#}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(retry_delay(1), TimeDelta::seconds(1));
        assert_eq!(retry_delay(2), TimeDelta::seconds(2));
        assert_eq!(retry_delay(5), TimeDelta::seconds(16));
        assert_eq!(retry_delay(9), TimeDelta::seconds(MAX_BACKOFF_SECS));
        assert_eq!(retry_delay(i32::MAX), TimeDelta::seconds(MAX_BACKOFF_SECS));
    }

    #[test]
    fn failed_delivery_stays_pending_until_attempts_run_out() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();

        assert_eq!(
            after_failure(0, 3, now),
            FailureOutcome::Retry {
                attempts: 1,
                at: now + TimeDelta::seconds(1)
            }
        );
        assert_eq!(
            after_failure(1, 3, now),
            FailureOutcome::Retry {
                attempts: 2,
                at: now + TimeDelta::seconds(2)
            }
        );
        assert_eq!(after_failure(2, 3, now), FailureOutcome::GiveUp { attempts: 3 });
    }
}
