//! Notifier trait and implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// Sends a short message to a destination such as an email address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<(), ServiceError>;
}

/// Notifier that only writes a log record.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), ServiceError> {
        tracing::info!(destination, message, "notification sent");
        Ok(())
    }
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<HashMap<String, Vec<String>>>>,
    fail_on_send: Arc<AtomicBool>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Returns the messages sent to a destination, oldest first.
    pub async fn sent_to(&self, destination: &str) -> Vec<String> {
        self.sent
            .read()
            .await
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the total number of messages sent.
    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), ServiceError> {
        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(ServiceError::Notification(format!(
                "cannot reach {destination}"
            )));
        }

        self.sent
            .write()
            .await
            .entry(destination.to_string())
            .or_default()
            .push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_messages_per_destination() {
        let notifier = InMemoryNotifier::new();
        notifier.send("a@example.com", "one").await.unwrap();
        notifier.send("b@example.com", "two").await.unwrap();
        notifier.send("a@example.com", "three").await.unwrap();

        assert_eq!(notifier.sent_to("a@example.com").await, vec!["one", "three"]);
        assert_eq!(notifier.sent_count().await, 3);
    }

    #[tokio::test]
    async fn test_fail_on_send() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);

        assert!(notifier.send("a@example.com", "one").await.is_err());
        assert_eq!(notifier.sent_count().await, 0);
    }
}
