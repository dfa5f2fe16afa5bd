use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use bytes::Bytes;
use slash_command_core::{PublishError, Publisher, RoutingKey};
use tracing::{debug, info};

use crate::settings::NatsSettings;

/// JetStream-backed publisher. Each routing key maps to the subject
/// `<subject_prefix>.<routing_key>`.
pub struct NatsPublisher {
    jetstream: jetstream::Context,
    subject_prefix: String,
}

impl NatsPublisher {
    pub async fn connect(settings: &NatsSettings) -> Result<Self> {
        let timeout = settings.connect_timeout();
        info!(url = %settings.url, ?timeout, "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(settings.url.as_str())
            .await
            .with_context(|| format!("failed to connect to NATS at {}", settings.url))?;
        let publisher = Self {
            jetstream: jetstream::new(client),
            subject_prefix: settings.subject_prefix.clone(),
        };

        if let Some(stream) = settings.stream.as_deref() {
            publisher.ensure_stream(stream).await?;
        }
        info!("connected to NATS");
        Ok(publisher)
    }

    async fn ensure_stream(&self, stream_name: &str) -> Result<()> {
        if self.jetstream.get_stream(stream_name).await.is_ok() {
            info!(stream = stream_name, "stream already exists");
            return Ok(());
        }
        let config = StreamConfig {
            name: stream_name.to_string(),
            subjects: vec![stream_filter(&self.subject_prefix)],
            description: Some("Forwarded slash commands".to_string()),
            ..Default::default()
        };
        self.jetstream
            .create_stream(config)
            .await
            .with_context(|| format!("failed to create stream {stream_name}"))?;
        info!(stream = stream_name, "created stream");
        Ok(())
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, routing_key: &RoutingKey, payload: Bytes) -> Result<(), PublishError> {
        let subject = subject_for(&self.subject_prefix, routing_key);
        debug!(subject = %subject, size_bytes = payload.len(), "publishing command");

        let ack = self
            .jetstream
            .publish(subject.clone(), payload)
            .await
            .map_err(|err| PublishError::new(subject.as_str(), err))?;
        ack.await
            .map_err(|err| PublishError::new(subject.as_str(), err))?;

        debug!(subject = %subject, "publish acknowledged");
        Ok(())
    }
}

pub fn subject_for(prefix: &str, routing_key: &RoutingKey) -> String {
    if prefix.is_empty() {
        routing_key.to_string()
    } else {
        format!("{prefix}.{routing_key}")
    }
}

fn stream_filter(prefix: &str) -> String {
    if prefix.is_empty() {
        ">".to_string()
    } else {
        format!("{prefix}.>")
    }
}
