//! Event publisher trait and implementations.

use std::sync::Arc;

use async_trait::async_trait;
use domain::Event;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};

use crate::error::ServiceError;

/// An event as it leaves the service: a channel name and a flat JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: serde_json::Value,
}

impl PublishedMessage {
    pub fn new(channel: &str, event: &Event) -> Result<Self, ServiceError> {
        Ok(Self {
            channel: channel.to_string(),
            payload: event.payload()?,
        })
    }
}

/// Broadcasts events to external subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &Event) -> Result<(), ServiceError>;
}

/// Publisher backed by a tokio broadcast channel.
///
/// Every subscriber receives every message sent after it subscribed.
/// Publishing with no subscriber is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PublishedMessage>,
}

impl BroadcastPublisher {
    /// Creates a publisher buffering up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, channel: &str, event: &Event) -> Result<(), ServiceError> {
        let message = PublishedMessage::new(channel, event)?;
        match self.sender.send(message) {
            Ok(receivers) => {
                tracing::debug!(channel, receivers, event_type = event.event_type(), "event published");
            }
            Err(_) => {
                tracing::debug!(channel, event_type = event.event_type(), "event published with no subscribers");
            }
        }
        Ok(())
    }
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    published: Arc<RwLock<Vec<PublishedMessage>>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything published so far, oldest first.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, channel: &str, event: &Event) -> Result<(), ServiceError> {
        let message = PublishedMessage::new(channel, event)?;
        self.published.write().await.push(message);
        Ok(())
    }
}
