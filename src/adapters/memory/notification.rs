//! In-process notification channel.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{NotificationSource, NotificationStream};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum Message {
    Payload { channel: String, payload: String },
    Disconnect,
}

/// Broadcast-backed stand-in for LISTEN/NOTIFY with fault injection.
pub struct InMemoryNotificationSource {
    sender: broadcast::Sender<Message>,
    failing_subscriptions: AtomicU32,
}

impl InMemoryNotificationSource {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            failing_subscriptions: AtomicU32::new(0),
        }
    }

    /// Make the next `count` subscribe calls fail.
    pub fn fail_subscriptions(&self, count: u32) {
        self.failing_subscriptions.store(count, Ordering::SeqCst);
    }

    /// Drop every open subscription with a transport error.
    pub fn disconnect_all(&self) {
        let _ = self.sender.send(Message::Disconnect);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryNotificationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSource for InMemoryNotificationSource {
    async fn subscribe(&self, channel: &str) -> CacheResult<Box<dyn NotificationStream>> {
        let failing = self
            .failing_subscriptions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CacheError::TransportFailure("connection refused".to_string()));
        }

        Ok(Box::new(InMemoryStream {
            channel: channel.to_string(),
            receiver: Some(self.sender.subscribe()),
        }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<()> {
        // No subscribers is not an error, same as NOTIFY.
        let _ = self.sender.send(Message::Payload {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

struct InMemoryStream {
    channel: String,
    receiver: Option<broadcast::Receiver<Message>>,
}

#[async_trait]
impl NotificationStream for InMemoryStream {
    async fn recv(&mut self) -> CacheResult<String> {
        loop {
            let Some(receiver) = self.receiver.as_mut() else {
                return Err(CacheError::TransportFailure("subscription closed".to_string()));
            };

            match receiver.recv().await {
                Ok(Message::Payload { channel, payload }) if channel == self.channel => return Ok(payload),
                Ok(Message::Payload { .. }) => {}
                Ok(Message::Disconnect) => {
                    self.receiver = None;
                    return Err(CacheError::TransportFailure("connection reset".to_string()));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification stream lagged");
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return Err(CacheError::TransportFailure("channel closed".to_string()));
                }
            }
        }
    }

    async fn close(&mut self) -> CacheResult<()> {
        self.receiver = None;
        Ok(())
    }
}
