//! External transport seam.

use std::sync::Arc;

use async_trait::async_trait;
use helpdesk_core::error::DomainError;
use helpdesk_core::outbox::{MessageHandler, OutboxEntry};
use tracing::info;

/// A message broker or other out-of-process consumer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes `entry` to `destination`. `Ok(())` means the broker accepted
    /// it; a failure that may clear up should be `DomainError::Transient`.
    async fn publish(&self, destination: &str, entry: &OutboxEntry) -> Result<(), DomainError>;
}

/// Adapts a [`Transport`] to the relay's [`MessageHandler`] seam.
#[derive(Clone)]
pub struct TransportHandler {
    destination: String,
    transport: Arc<dyn Transport>,
}

impl TransportHandler {
    /// Publishes everything it receives to `destination` on `transport`.
    #[must_use]
    pub fn new(destination: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            destination: destination.into(),
            transport,
        }
    }
}

impl std::fmt::Debug for TransportHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandler")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageHandler for TransportHandler {
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), DomainError> {
        self.transport.publish(&self.destination, entry).await
    }
}

/// Transport that writes every message to the log. Stands in for a broker in
/// local runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

#[async_trait]
impl Transport for TracingTransport {
    async fn publish(&self, destination: &str, entry: &OutboxEntry) -> Result<(), DomainError> {
        info!(
            destination,
            message_type = %entry.message_type,
            correlation_id = %entry.correlation_id,
            payload = %entry.payload,
            "published message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_core::cascade::OutgoingMessage;
    use helpdesk_test_support::fixed_now;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct CapturingTransport {
        published: Mutex<Vec<(String, Uuid)>>,
    }

    #[async_trait]
    impl Transport for CapturingTransport {
        async fn publish(&self, destination: &str, entry: &OutboxEntry) -> Result<(), DomainError> {
            self.published
                .lock()
                .unwrap()
                .push((destination.to_owned(), entry.id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transport_handler_publishes_to_its_destination() {
        // Arrange
        let transport = Arc::new(CapturingTransport::default());
        let handler = TransportHandler::new("notifications", transport.clone());
        let entry = OutboxEntry::pending(
            OutgoingMessage {
                destination: "notifications".into(),
                message_type: "RingAllTheAlarms".into(),
                payload: serde_json::json!({}),
                ordering_key: "k".into(),
                correlation_id: Uuid::new_v4(),
                causation_id: Uuid::new_v4(),
            },
            1,
            fixed_now(),
        );

        // Act
        handler.handle(&entry).await.unwrap();

        // Assert
        assert_eq!(
            *transport.published.lock().unwrap(),
            vec![("notifications".to_owned(), entry.id)]
        );
    }
}
