//! LISTEN/NOTIFY transport.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{NotificationSource, NotificationStream};

/// Notification source opening a dedicated listener connection per
/// subscription.
#[derive(Clone)]
pub struct PgNotificationSource {
    pool: PgPool,
}

impl PgNotificationSource {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn transport(err: &sqlx::Error) -> CacheError {
    CacheError::TransportFailure(err.to_string())
}

#[async_trait]
impl NotificationSource for PgNotificationSource {
    async fn subscribe(&self, channel: &str) -> CacheResult<Box<dyn NotificationStream>> {
        let mut listener = PgListener::connect_with(&self.pool).await.map_err(|e| transport(&e))?;
        listener.listen(channel).await.map_err(|e| transport(&e))?;

        tracing::debug!(channel, "Subscribed to notification channel");
        Ok(Box::new(PgNotificationStream {
            listener: Some(listener),
        }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

struct PgNotificationStream {
    listener: Option<PgListener>,
}

#[async_trait]
impl NotificationStream for PgNotificationStream {
    async fn recv(&mut self) -> CacheResult<String> {
        let Some(listener) = self.listener.as_mut() else {
            return Err(CacheError::TransportFailure("subscription closed".to_string()));
        };

        // `try_recv` reports a dropped connection as `None` instead of
        // silently reconnecting, so the supervisor sees the gap.
        match listener.try_recv().await {
            Ok(Some(notification)) => Ok(notification.payload().to_string()),
            Ok(None) => Err(CacheError::TransportFailure("connection lost".to_string())),
            Err(e) => Err(transport(&e)),
        }
    }

    async fn close(&mut self) -> CacheResult<()> {
        if let Some(mut listener) = self.listener.take() {
            listener.unlisten_all().await.map_err(|e| transport(&e))?;
        }
        Ok(())
    }
}
