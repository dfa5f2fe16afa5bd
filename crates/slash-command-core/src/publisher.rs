use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::payload::RoutingKey;

#[derive(Debug, Error)]
#[error("publish to '{destination}' failed: {source}")]
pub struct PublishError {
    pub destination: String,
    #[source]
    pub source: anyhow::Error,
}

impl PublishError {
    pub fn new(destination: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            destination: destination.into(),
            source: source.into(),
        }
    }
}

/// Outbound side of the proxy: delivers one serialized payload to the queue
/// topic named by the routing key and resolves once the queue acknowledges it.
///
/// Dropping the returned future abandons the publish.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, routing_key: &RoutingKey, payload: Bytes) -> Result<(), PublishError>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PublishedMessage {
        pub routing_key: String,
        pub payload: Bytes,
    }

    /// Records every publish and acknowledges immediately.
    #[derive(Debug, Default)]
    pub struct RecordingPublisher {
        published: Mutex<Vec<PublishedMessage>>,
    }

    impl RecordingPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn published(&self) -> Vec<PublishedMessage> {
            self.published
                .lock()
                .map(|guard| guard.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            routing_key: &RoutingKey,
            payload: Bytes,
        ) -> Result<(), PublishError> {
            if let Ok(mut guard) = self.published.lock() {
                guard.push(PublishedMessage {
                    routing_key: routing_key.to_string(),
                    payload,
                });
            }
            Ok(())
        }
    }

    /// Fails every publish.
    #[derive(Debug, Default)]
    pub struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(
            &self,
            routing_key: &RoutingKey,
            _payload: Bytes,
        ) -> Result<(), PublishError> {
            Err(PublishError::new(
                routing_key.as_str(),
                anyhow::anyhow!("queue unavailable"),
            ))
        }
    }

    /// Never acknowledges.
    #[derive(Debug, Default)]
    pub struct StalledPublisher;

    #[async_trait]
    impl Publisher for StalledPublisher {
        async fn publish(
            &self,
            _routing_key: &RoutingKey,
            _payload: Bytes,
        ) -> Result<(), PublishError> {
            std::future::pending().await
        }
    }
}
