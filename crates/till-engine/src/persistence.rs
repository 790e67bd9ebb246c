//! # Cart Persister
//!
//! Background task writing the cart to the local cache and the shared
//! remote store. Callers never wait on it.
//!
//! ## Write Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cart Persister                                   │
//! │                                                                         │
//! │  CartStore mutation ── schedule(items) ──► watch channel (latest only)  │
//! │                                                │                        │
//! │                                                ▼                        │
//! │                              wait for quiet period (debounce)           │
//! │                                                │                        │
//! │                      ┌─────────────────────────┴───────────┐            │
//! │                      ▼                                     ▼            │
//! │              local cache save                    remote PUT /carts/{t}  │
//! │              (always first)                         │                   │
//! │                                          fail ──► backoff, retry        │
//! │                                                     │  newer snapshot?  │
//! │                                                     └─► drop, start over│
//! │                                                                         │
//! │  PersistenceStatus: Idle → Synced | LocalOnly → Degraded (threshold)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the newest item list matters: a snapshot scheduled while an older
//! one is still retrying replaces it.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use till_core::LineItem;

use crate::config::PersistenceSettings;
use crate::error::{PersistenceWarning, ServiceError};
use crate::services::{CartRemoteStore, LocalCartCache};

// =============================================================================
// Status
// =============================================================================

/// Where the last persisted cart ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceStatus {
    /// Nothing written yet.
    Idle,
    /// Remote store has the latest cart.
    Synced { at: DateTime<Utc> },
    /// Remote writes failing; still below the warning threshold.
    LocalOnly {
        consecutive_failures: u32,
        last_error: String,
    },
    /// Remote writes have failed often enough to tell the cashier.
    Degraded(PersistenceWarning),
}

impl PersistenceStatus {
    pub fn warning(&self) -> Option<&PersistenceWarning> {
        match self {
            PersistenceStatus::Degraded(warning) => Some(warning),
            _ => None,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct PersisterConfig {
    pub debounce: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub warning_threshold: u32,
}

impl From<&PersistenceSettings> for PersisterConfig {
    fn from(settings: &PersistenceSettings) -> Self {
        PersisterConfig {
            debounce: settings.debounce(),
            initial_backoff: settings.initial_backoff(),
            max_backoff: settings.max_backoff(),
            warning_threshold: settings.warning_threshold.max(1),
        }
    }
}

impl Default for PersisterConfig {
    fn default() -> Self {
        PersisterConfig::from(&PersistenceSettings::default())
    }
}

// =============================================================================
// Handle
// =============================================================================

type Scheduled = Option<Arc<Vec<LineItem>>>;

/// The CartStore's side of the persister.
#[derive(Debug)]
pub struct PersisterHandle {
    items_tx: watch::Sender<Scheduled>,
    status_rx: watch::Receiver<PersistenceStatus>,
    shutdown: Arc<Notify>,
}

impl PersisterHandle {
    /// Queues `items` for writing, replacing anything not yet written.
    pub fn schedule(&self, items: Vec<LineItem>) {
        self.items_tx.send_replace(Some(Arc::new(items)));
    }

    pub fn status(&self) -> PersistenceStatus {
        self.status_rx.borrow().clone()
    }

    pub fn warning(&self) -> Option<PersistenceWarning> {
        self.status_rx.borrow().warning().cloned()
    }

    /// Receives every status change.
    pub fn subscribe(&self) -> watch::Receiver<PersistenceStatus> {
        self.status_rx.clone()
    }

    /// Flushes whatever is pending once more, then stops the task.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

// =============================================================================
// Persister Task
// =============================================================================

pub struct CartPersister {
    terminal: String,
    remote: Arc<dyn CartRemoteStore>,
    local: Arc<dyn LocalCartCache>,
    config: PersisterConfig,
    items_rx: watch::Receiver<Scheduled>,
    status_tx: watch::Sender<PersistenceStatus>,
    shutdown: Arc<Notify>,
    consecutive_failures: u32,
    failing_since: Option<DateTime<Utc>>,
    dirty: bool,
    stopping: bool,
}

impl CartPersister {
    /// Starts the persister for `terminal` on the current runtime.
    pub fn spawn(
        terminal: impl Into<String>,
        remote: Arc<dyn CartRemoteStore>,
        local: Arc<dyn LocalCartCache>,
        config: PersisterConfig,
    ) -> (PersisterHandle, JoinHandle<()>) {
        let (items_tx, items_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(PersistenceStatus::Idle);
        let shutdown = Arc::new(Notify::new());

        let persister = CartPersister {
            terminal: terminal.into(),
            remote,
            local,
            config,
            items_rx,
            status_tx,
            shutdown: shutdown.clone(),
            consecutive_failures: 0,
            failing_since: None,
            dirty: false,
            stopping: false,
        };
        let task = tokio::spawn(persister.run());

        let handle = PersisterHandle {
            items_tx,
            status_rx,
            shutdown,
        };
        (handle, task)
    }

    async fn run(mut self) {
        info!(terminal = %self.terminal, "Cart persister started");

        loop {
            if !self.dirty {
                tokio::select! {
                    biased;
                    changed = self.items_rx.changed() => match changed {
                        Ok(()) => self.dirty = true,
                        Err(_) => self.stopping = true,
                    },
                    _ = self.shutdown.notified() => self.stopping = true,
                }
            }

            while self.dirty && !self.stopping {
                tokio::select! {
                    biased;
                    changed = self.items_rx.changed() => {
                        if changed.is_err() {
                            self.stopping = true;
                        }
                    }
                    _ = tokio::time::sleep(self.config.debounce) => break,
                    _ = self.shutdown.notified() => self.stopping = true,
                }
            }

            if self.dirty {
                self.dirty = false;
                let scheduled = self.items_rx.borrow_and_update().clone();
                if let Some(items) = scheduled {
                    self.write_through(&items).await;
                }
            }

            if self.stopping {
                break;
            }
        }

        info!(terminal = %self.terminal, "Cart persister stopped");
    }

    /// Local save, then remote save with retries until it lands, is
    /// superseded, or fails permanently.
    async fn write_through(&mut self, items: &[LineItem]) {
        if let Err(err) = self.local.save_local(&self.terminal, items).await {
            warn!(terminal = %self.terminal, error = %err, "Local cart cache write failed");
        }

        let mut backoff = self.create_backoff();
        loop {
            let err = match self.remote.save_cart(&self.terminal, items).await {
                Ok(()) => {
                    self.record_success(items.len());
                    return;
                }
                Err(err) => err,
            };

            self.record_failure(&err);
            if !err.is_retryable() || self.stopping {
                return;
            }
            let Some(delay) = backoff.next_backoff() else {
                return;
            };
            debug!(?delay, attempt = self.consecutive_failures, "Retrying remote cart save");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = self.items_rx.changed() => {
                    match changed {
                        Ok(()) => self.dirty = true,
                        Err(_) => self.stopping = true,
                    }
                    return;
                }
                _ = self.shutdown.notified() => {
                    self.stopping = true;
                    return;
                }
            }
        }
    }

    fn record_success(&mut self, items: usize) {
        if self.consecutive_failures >= self.config.warning_threshold {
            info!(
                terminal = %self.terminal,
                failures = self.consecutive_failures,
                "Remote cart store reachable again"
            );
        }
        self.consecutive_failures = 0;
        self.failing_since = None;
        debug!(terminal = %self.terminal, items, "Cart saved remotely");
        self.status_tx
            .send_replace(PersistenceStatus::Synced { at: Utc::now() });
    }

    fn record_failure(&mut self, err: &ServiceError) {
        self.consecutive_failures += 1;
        let since = *self.failing_since.get_or_insert_with(Utc::now);

        let status = if self.consecutive_failures >= self.config.warning_threshold {
            if self.consecutive_failures == self.config.warning_threshold {
                warn!(
                    terminal = %self.terminal,
                    failures = self.consecutive_failures,
                    error = %err,
                    "Cart is only being saved locally"
                );
            }
            PersistenceStatus::Degraded(PersistenceWarning {
                terminal: self.terminal.clone(),
                consecutive_failures: self.consecutive_failures,
                last_error: err.to_string(),
                since,
            })
        } else {
            debug!(
                terminal = %self.terminal,
                failures = self.consecutive_failures,
                error = %err,
                "Remote cart save failed"
            );
            PersistenceStatus::LocalOnly {
                consecutive_failures: self.consecutive_failures,
                last_error: err.to_string(),
            }
        };
        self.status_tx.send_replace(status);
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.config.initial_backoff,
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}
