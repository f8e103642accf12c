//! Change notification listener.
//!
//! Subscribes to the store's change channel and turns each notification
//! into targeted invalidation through a [`ChangeHandler`]. The listener runs
//! as a supervised task:
//!
//! - `Connecting` while a subscription is being opened or re-opened
//! - `Listening` while blocked on the next notification
//! - `Stopped` after `stop()` or once reconnection attempts are exhausted
//!
//! A lost connection is retried with exponential backoff. Stopping is
//! observed during the blocking wait, during a connection attempt and
//! during a backoff sleep.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::models::{ChangeEvent, DatabaseConfig, ListenerConfig};
use crate::domain::ports::{NotificationSource, NotificationStream};

/// Lifecycle state of the listener task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Stopped,
    Connecting,
    Listening,
}

impl ListenerState {
    /// Lowercase label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives decoded change events.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Apply `event`. Returns `false` when the event was ignored
    /// (unknown table or operation).
    async fn handle_change(&self, event: &ChangeEvent) -> bool;

    /// Called after a lost subscription is re-established. Notifications
    /// sent while disconnected are gone.
    async fn on_resubscribe(&self) {}
}

/// Counters reported by [`ListenerHandle::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    /// Payloads taken off the channel.
    pub events_received: u64,
    /// Events that touched a tracked table.
    pub events_applied: u64,
    /// Payloads that failed to parse.
    pub malformed_events: u64,
    /// Reconnect attempts made.
    pub reconnects: u64,
}

#[derive(Default)]
struct Counters {
    events_received: AtomicU64,
    events_applied: AtomicU64,
    malformed_events: AtomicU64,
    reconnects: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            malformed_events: self.malformed_events.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Listener tuning.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// Notification channel to LISTEN on.
    pub channel: String,
    /// Consecutive failed reconnects tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// First reconnect delay.
    pub initial_backoff: Duration,
    /// Cap on the reconnect delay.
    pub max_backoff: Duration,
    /// How often an idle listener rechecks for shutdown.
    pub wake_interval: Duration,
}

impl ListenerSettings {
    /// Settings from the loaded configuration.
    pub fn from_config(database: &DatabaseConfig, listener: &ListenerConfig) -> Self {
        Self {
            channel: database.notification_channel.clone(),
            max_reconnect_attempts: listener.max_reconnect_attempts,
            initial_backoff: listener.initial_backoff(),
            max_backoff: listener.max_backoff(),
            wake_interval: listener.wake_interval(),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self::from_config(&DatabaseConfig::default(), &ListenerConfig::default())
    }
}

/// Control handle for a running listener.
pub struct ListenerHandle {
    state_rx: watch::Receiver<ListenerState>,
    shutdown_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
    task: JoinHandle<CacheResult<()>>,
}

impl ListenerHandle {
    /// Current state.
    pub fn state(&self) -> ListenerState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change of this listener.
    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state_rx.clone()
    }

    /// Wait until the listener reaches `target`, up to `timeout`.
    pub async fn wait_for_state(&self, target: ListenerState, timeout: Duration) -> bool {
        let mut state_rx = self.state_rx.clone();
        tokio::time::timeout(timeout, state_rx.wait_for(|state| *state == target))
            .await
            .is_ok_and(|changed| changed.is_ok())
    }

    /// Request shutdown. Idempotent and non-blocking.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::info!("Stopping change listener");
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }

    /// Wait for the task to exit.
    ///
    /// Returns `TransportFailure` when the listener gave up reconnecting.
    pub async fn join(self) -> CacheResult<()> {
        self.task
            .await
            .map_err(|e| CacheError::TransportFailure(format!("listener task aborted: {e}")))?
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(self) -> CacheResult<()> {
        self.stop();
        self.join().await
    }
}

enum Disconnect {
    Shutdown,
    Lost(CacheError),
}

/// Supervised subscriber to the change channel.
pub struct ChangeListener {
    source: Arc<dyn NotificationSource>,
    handler: Arc<dyn ChangeHandler>,
    settings: ListenerSettings,
    counters: Arc<Counters>,
}

impl ChangeListener {
    /// Listener dispatching events from `source` to `handler`.
    pub fn new(source: Arc<dyn NotificationSource>, handler: Arc<dyn ChangeHandler>, settings: ListenerSettings) -> Self {
        Self {
            source,
            handler,
            settings,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawn the listener task.
    pub fn start(self) -> ListenerHandle {
        let (state_tx, state_rx) = watch::channel(ListenerState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = self.counters.clone();

        tracing::info!(channel = %self.settings.channel, "Starting change listener");
        let task = tokio::spawn(self.run(state_tx, shutdown_rx));

        ListenerHandle {
            state_rx,
            shutdown_tx,
            counters,
            task,
        }
    }

    async fn run(
        self,
        state_tx: watch::Sender<ListenerState>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> CacheResult<()> {
        let mut backoff = self.settings.backoff();
        let mut attempts = 0u32;
        let mut connected_before = false;

        let result = loop {
            if *shutdown_rx.borrow() {
                break Ok(());
            }
            state_tx.send_replace(ListenerState::Connecting);

            let subscribed = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break Ok(()),
                subscribed = self.source.subscribe(&self.settings.channel) => subscribed,
            };

            let error = match subscribed {
                Ok(mut stream) => {
                    attempts = 0;
                    backoff.reset();
                    if connected_before {
                        self.handler.on_resubscribe().await;
                    }
                    connected_before = true;
                    state_tx.send_replace(ListenerState::Listening);
                    tracing::info!(channel = %self.settings.channel, "Listening for change notifications");

                    let outcome = self.listen(stream.as_mut(), &mut shutdown_rx).await;
                    if let Err(e) = stream.close().await {
                        tracing::debug!(error = %e, "Error closing subscription");
                    }
                    match outcome {
                        Disconnect::Shutdown => break Ok(()),
                        Disconnect::Lost(e) => e,
                    }
                }
                Err(e) => e,
            };

            if attempts >= self.settings.max_reconnect_attempts {
                tracing::error!(
                    channel = %self.settings.channel,
                    attempts,
                    error = %error,
                    "Giving up on change notifications"
                );
                break Err(CacheError::TransportFailure(format!(
                    "reconnect attempts exhausted after {attempts}: {error}"
                )));
            }

            attempts += 1;
            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            let delay = backoff.next_backoff().unwrap_or(self.settings.max_backoff);
            tracing::warn!(
                attempt = attempts,
                max_attempts = self.settings.max_reconnect_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Change listener disconnected, reconnecting"
            );
            state_tx.send_replace(ListenerState::Connecting);

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        };

        state_tx.send_replace(ListenerState::Stopped);
        tracing::info!(stats = ?self.counters.snapshot(), "Change listener stopped");
        result
    }

    async fn listen(&self, stream: &mut dyn NotificationStream, shutdown_rx: &mut watch::Receiver<bool>) -> Disconnect {
        loop {
            if *shutdown_rx.borrow() {
                return Disconnect::Shutdown;
            }

            let payload = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => return Disconnect::Shutdown,
                received = tokio::time::timeout(self.settings.wake_interval, stream.recv()) => received,
            };

            match payload {
                Err(_elapsed) => {}
                Ok(Err(e)) => return Disconnect::Lost(e),
                Ok(Ok(payload)) => self.dispatch(&payload).await,
            }
        }
    }

    async fn dispatch(&self, payload: &str) {
        self.counters.events_received.fetch_add(1, Ordering::Relaxed);

        let event = match ChangeEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                self.counters.malformed_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, payload, "Ignoring malformed change notification");
                return;
            }
        };

        tracing::debug!(
            operation = %event.operation,
            table = %event.table,
            entity_id = %event.entity_id,
            "Received change notification"
        );

        if self.handler.handle_change(&event).await {
            self.counters.events_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::debug!(table = %event.table, "No cache tracks this table");
        }
    }
}
