//! Debounced, periodic and reconnect-triggered pushes.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::services::StoreEvent;

use super::diagnostics::LogLevel;
use super::engine::{lock, PushOutcome, SyncEngine};

/// A debounced push waiting for its quiet period to end.
pub(super) struct PendingSync {
    pub(super) generation: u64,
    pub(super) task: JoinHandle<()>,
}

impl SyncEngine {
    /// Push after a quiet period. Each call restarts the timer, so a burst
    /// of writes leads to one push.
    pub fn schedule_sync(&self) {
        if !self.is_enabled() {
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let delay = self.inner.options.debounce;
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(engine) = SyncEngine::from_weak(&weak) else {
                return;
            };
            if !engine.take_pending(generation) {
                return;
            }
            if engine.try_push().await == PushOutcome::Busy {
                tracing::debug!("Sync in progress; deferring scheduled push");
                engine.schedule_sync();
            }
        });

        let previous = lock(&self.inner.pending).replace(PendingSync { generation, task });
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    /// Release the pending slot if it still belongs to `generation`.
    fn take_pending(&self, generation: u64) -> bool {
        let mut pending = lock(&self.inner.pending);
        match pending.as_ref() {
            Some(current) if current.generation == generation => {
                pending.take();
                true
            }
            _ => false,
        }
    }

    /// Push now if a scheduled push is waiting. Returns whether a push ran
    /// and succeeded.
    pub async fn flush_pending_sync(&self) -> bool {
        let pending = lock(&self.inner.pending).take();
        match pending {
            Some(pending) => {
                pending.task.abort();
                match self.try_push().await {
                    PushOutcome::Pushed => true,
                    PushOutcome::Busy => {
                        self.schedule_sync();
                        false
                    }
                    PushOutcome::Failed => false,
                }
            }
            None => false,
        }
    }

    /// Schedule a sync for every local write made through the store.
    pub fn spawn_local_write_listener(&self) {
        let mut events = self.inner.store.subscribe();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                let schedule = match events.recv().await {
                    Ok(StoreEvent::LocalWrite(_)) => true,
                    Ok(_) => false,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Missed {} store events", skipped);
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
                if schedule {
                    let Some(engine) = SyncEngine::from_weak(&weak) else {
                        break;
                    };
                    engine.schedule_sync();
                }
            }
        });
        lock(&self.inner.background).push(task);
    }

    /// Push periodically while sync is enabled.
    pub fn spawn_auto_sync(&self) {
        let period = self.inner.options.auto_sync_interval;
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = SyncEngine::from_weak(&weak) else {
                    break;
                };
                if engine.is_enabled() {
                    engine.push_to_cloud().await;
                }
            }
        });
        lock(&self.inner.background).push(task);
    }

    /// Connectivity came back: push what accumulated offline.
    pub async fn notify_online(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.log(LogLevel::Info, "Back online; pushing local changes");
        self.push_to_cloud().await
    }
}
