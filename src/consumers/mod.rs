//! Event consumers. Events reach them either through RabbitMQ or, without a
//! broker, straight from the outbox relay via [`InProcessSink`].

use std::time::Duration;

use anyhow::Result;
use futures::{StreamExt, future::BoxFuture};
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tracing::{error, info, warn};

use crate::{
    messaging,
    platform::{app_state::AppState, config::AmqpConfig, outbox::EventSink},
};

pub mod notifications;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct InProcessSink {
    state: AppState,
}

impl InProcessSink {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl EventSink for InProcessSink {
    fn deliver<'a>(&'a self, event_type: &'a str, payload: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            notifications::handle_event(&self.state, event_type, payload).await?;
            Ok(())
        })
    }
}

/// Consumes the notification queue until the process exits, reconnecting
/// after broker failures.
pub fn spawn_amqp_consumers(state: AppState, config: AmqpConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match messaging::consume(&config, notifications::ROUTING_KEYS).await {
                Ok((_conn, mut consumer)) => {
                    while let Some(delivery) = consumer.next().await {
                        let delivery = match delivery {
                            Ok(delivery) => delivery,
                            Err(err) => {
                                error!("Consumer stream failed: {}", err);
                                break;
                            }
                        };

                        let event_type = delivery.routing_key.as_str().to_string();
                        let outcome = match std::str::from_utf8(&delivery.data) {
                            Ok(payload) => {
                                notifications::handle_event(&state, &event_type, payload).await
                            }
                            Err(err) => Err(err.into()),
                        };

                        let acked = match outcome {
                            Ok(_) => delivery.ack(BasicAckOptions::default()).await,
                            Err(err) => {
                                error!(
                                    event_type = %event_type,
                                    "Failed to handle event: {:#}", err
                                );
                                delivery
                                    .nack(BasicNackOptions {
                                        requeue: false,
                                        ..Default::default()
                                    })
                                    .await
                            }
                        };
                        if let Err(err) = acked {
                            warn!(
                                event_type = %event_type,
                                "Failed to acknowledge delivery: {}", err
                            );
                        }
                    }
                    info!("Consumer stream ended");
                }
                Err(err) => error!("Failed to start consumer: {:#}", err),
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    })
}
