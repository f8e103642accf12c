//! Change notification transport port.

use async_trait::async_trait;

use crate::domain::errors::CacheResult;

/// A publish/subscribe channel the store's triggers write to.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Open a subscription on `channel`.
    async fn subscribe(&self, channel: &str) -> CacheResult<Box<dyn NotificationStream>>;

    /// Publish a raw payload on `channel`.
    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<()>;
}

/// An open subscription.
#[async_trait]
pub trait NotificationStream: Send {
    /// Wait for the next payload.
    ///
    /// Returns `TransportFailure` when the connection is lost; the caller is
    /// expected to drop this stream and subscribe again.
    async fn recv(&mut self) -> CacheResult<String>;

    /// Stop listening and release the connection.
    async fn close(&mut self) -> CacheResult<()>;
}
