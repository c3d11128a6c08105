//! RabbitMQ plumbing: a topic exchange keyed by event type.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::platform::{config::AmqpConfig, outbox::EventSink};

async fn open_channel(config: &AmqpConfig) -> Result<(Connection, Channel)> {
    let conn = Connection::connect(&config.url, ConnectionProperties::default())
        .await
        .context("Failed to connect")?;
    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare exchange")?;

    Ok((conn, channel))
}

/// Publishes outbox events. The channel is reopened on the next delivery
/// after any publish error, so a broker restart only delays events.
pub struct AmqpPublisher {
    config: AmqpConfig,
    // Dropping the connection closes the channel.
    link: Mutex<Option<(Connection, Channel)>>,
}

impl AmqpPublisher {
    pub async fn connect(config: &AmqpConfig) -> Result<Self> {
        let link = open_channel(config).await?;
        info!(exchange = %config.exchange, "Connected to AMQP publisher");

        Ok(Self {
            config: config.clone(),
            link: Mutex::new(Some(link)),
        })
    }

    async fn publish(&self, channel: &Channel, event_type: &str, payload: &str) -> Result<()> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        channel
            .basic_publish(
                &self.config.exchange,
                event_type,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                properties,
            )
            .await
            .context("Failed to publish")?
            .await
            .context("Broker did not confirm publish")?;

        Ok(())
    }
}

impl EventSink for AmqpPublisher {
    fn deliver<'a>(&'a self, event_type: &'a str, payload: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut link = self.link.lock().await;

            let reusable = link
                .as_ref()
                .is_some_and(|(_, channel)| channel.status().connected());
            if !reusable {
                *link = None;
                let fresh = open_channel(&self.config)
                    .await
                    .context("Failed to reopen AMQP channel")?;
                info!(exchange = %self.config.exchange, "Reconnected AMQP publisher");
                *link = Some(fresh);
            }

            let Some((_, channel)) = link.as_ref() else {
                anyhow::bail!("AMQP channel is not open");
            };

            if let Err(err) = self.publish(channel, event_type, payload).await {
                warn!("Dropping AMQP channel after publish error");
                *link = None;
                return Err(err);
            }

            debug!(exchange = %self.config.exchange, routing_key = event_type, "Published event");
            Ok(())
        })
    }
}

/// Declares the service queue, binds it to every routing key and starts consuming.
pub async fn consume(config: &AmqpConfig, routing_keys: &[&str]) -> Result<(Connection, Consumer)> {
    let (conn, channel) = open_channel(config).await?;

    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare queue")?;

    for routing_key in routing_keys {
        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("Failed to bind {}", routing_key))?;
    }

    let consumer = channel
        .basic_consume(
            &config.queue,
            "storefront-service",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = %config.queue, "Consuming events");
    Ok((conn, consumer))
}
