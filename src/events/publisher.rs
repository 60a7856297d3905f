use tokio::sync::broadcast;

use super::types::EngineEvent;

/// High-throughput event publisher for lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: EngineEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a lifecycle event
    pub async fn publish(&self, event: EngineEvent) -> Result<(), PublishError> {
        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };

        // For broadcast channels, send() returns an error if there are no subscribers
        // In our case, this is acceptable - we want to publish events even if no one is listening
        match self.sender.send(published) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => {
                // No subscribers - this is acceptable for event publishing
                Ok(())
            }
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000) // Default capacity of 1000 events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(16);
        let result = publisher
            .publish(EngineEvent::RollCallCreated {
                roll_call_uuid: Uuid::new_v4(),
                organization_uuid: Uuid::new_v4(),
                self_test: false,
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let publisher = EventPublisher::new(16);
        let mut receiver = publisher.subscribe();

        let roll_call_uuid = Uuid::new_v4();
        publisher
            .publish(EngineEvent::RollCallDispatched {
                roll_call_uuid,
                sent: 3,
                failed: 0,
                unreachable: 1,
            })
            .await
            .unwrap();

        let published = receiver.recv().await.unwrap();
        assert_eq!(published.event.name(), "roll_call.dispatched");
        match published.event {
            EngineEvent::RollCallDispatched {
                roll_call_uuid: uuid,
                sent,
                ..
            } => {
                assert_eq!(uuid, roll_call_uuid);
                assert_eq!(sent, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
