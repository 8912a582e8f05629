//! Background scheduling of sync runs.
//!
//! The scheduler owns a single task that serializes all triggers for one
//! device, so periodic ticks, reconnect edges, and manual requests never
//! race each other into the engine's single-flight guard.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use confab_common::{DeviceId, Error, Result, UserId};
use confab_store::{ChangeLog, ConflictStore, SyncCommit, SyncMetadataStore};

use crate::engine::{SyncEngine, SyncOutcome};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::transport::SyncTransport;

/// When the scheduler starts a sync on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Only explicit triggers.
    Manual,
    /// Sync whenever the device transitions offline to online.
    OnReconnect,
    /// Sync on a fixed interval while online.
    Periodic,
    /// Both reconnect edges and the interval.
    Hybrid,
}

impl SyncMode {
    fn on_reconnect(&self) -> bool {
        matches!(self, SyncMode::OnReconnect | SyncMode::Hybrid)
    }

    fn periodic(&self) -> bool {
        matches!(self, SyncMode::Periodic | SyncMode::Hybrid)
    }
}

/// What caused a scheduled sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Manual,
    Reconnect,
    Interval,
}

enum Command {
    Trigger(oneshot::Sender<Result<SyncOutcome>>),
    Shutdown,
}

/// Configuration for the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub mode: SyncMode,
    /// Tick length for `Periodic`/`Hybrid`.
    pub interval: Duration,
    /// Backoff applied to failed automatic runs. Manual triggers report
    /// the first error instead of retrying, so the caller stays in
    /// control.
    pub retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Hybrid,
            interval: Duration::from_secs(300),
            retry: RetryConfig::default(),
        }
    }
}

/// Handle to a running scheduler.
///
/// Dropping the handle shuts the loop down.
pub struct SyncSchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SyncSchedulerHandle {
    /// Run a sync now and wait for its outcome.
    pub async fn trigger(&self) -> Result<SyncOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Trigger(reply_tx))
            .await
            .map_err(|_| Error::Transport("sync scheduler has shut down".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Transport("sync scheduler dropped the request".to_string()))?
    }

    /// Stop the scheduler loop.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

/// Drives the engine for one `(user, device)` pair.
pub struct SyncScheduler<S, T> {
    engine: Arc<SyncEngine<S, T>>,
    user_id: UserId,
    device_id: DeviceId,
    credential: String,
    online: watch::Receiver<bool>,
    config: SchedulerConfig,
}

impl<S, T> SyncScheduler<S, T>
where
    S: ChangeLog + SyncMetadataStore + ConflictStore + SyncCommit + 'static,
    T: SyncTransport + 'static,
{
    pub fn new(
        engine: Arc<SyncEngine<S, T>>,
        user_id: UserId,
        device_id: DeviceId,
        credential: impl Into<String>,
        online: watch::Receiver<bool>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            user_id,
            device_id,
            credential: credential.into(),
            online,
            config,
        }
    }

    /// Spawn the scheduler loop and return its handle.
    pub fn spawn(self) -> SyncSchedulerHandle {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(self.run(rx));
        SyncSchedulerHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(
            user = %self.user_id,
            device = %self.device_id,
            mode = ?self.config.mode,
            "Sync scheduler started"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of tokio's interval fires immediately.
        tick.tick().await;

        let mut was_online = *self.online.borrow();
        let mut probe_alive = true;

        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(Command::Trigger(reply)) => {
                            let outcome = self.run_once(SyncTrigger::Manual).await;
                            let _ = reply.send(outcome);
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
                changed = self.online.changed(), if probe_alive => {
                    if changed.is_err() {
                        // Reachability probe is gone; keep serving
                        // manual triggers and the interval.
                        probe_alive = false;
                        continue;
                    }
                    let is_online = *self.online.borrow();
                    let reconnected = is_online && !was_online;
                    was_online = is_online;
                    if reconnected && self.config.mode.on_reconnect() {
                        self.run_automatic(SyncTrigger::Reconnect).await;
                    }
                }
                _ = tick.tick(), if self.config.mode.periodic() => {
                    if *self.online.borrow() {
                        self.run_automatic(SyncTrigger::Interval).await;
                    } else {
                        debug!("Skipping periodic sync while offline");
                    }
                }
            }
        }

        info!(device = %self.device_id, "Sync scheduler stopped");
    }

    /// Automatic runs absorb failures; the change log keeps the work.
    async fn run_automatic(&self, trigger: SyncTrigger) {
        let executor = RetryExecutor::new(self.config.retry.clone());
        let result = executor
            .execute(|| self.engine.sync(&self.user_id, &self.device_id, &self.credential))
            .await;
        match result {
            Ok(outcome) => {
                debug!(?trigger, synced = outcome.synced_count, "Scheduled sync done")
            }
            Err(Error::SyncInProgress(_)) => {
                debug!(?trigger, "Sync already running, trigger coalesced")
            }
            Err(err) => warn!(?trigger, %err, "Scheduled sync failed"),
        }
    }

    async fn run_once(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        debug!(?trigger, "Running sync");
        self.engine
            .sync(&self.user_id, &self.device_id, &self.credential)
            .await
    }
}
