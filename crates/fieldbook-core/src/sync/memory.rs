//! In-process remote: one shared document for any number of engines.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::config::SyncConfig;

use super::remote::{
    RemoteChannel, RemoteConnector, RemoteDocument, RemoteError, RemoteResult, Subscription,
};

const SUBSCRIPTION_BUFFER: usize = 16;

struct Shared {
    document: watch::Sender<Option<RemoteDocument>>,
    failure: Mutex<Option<RemoteError>>,
    get_delay: Mutex<Option<Duration>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

/// A remote document held in memory.
///
/// Clones share the same document, so several engines connected to clones of
/// one `MemoryRemote` behave like devices sharing a cloud account.
#[derive(Clone)]
pub struct MemoryRemote {
    shared: Arc<Shared>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (document, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                document,
                failure: Mutex::new(None),
                get_delay: Mutex::new(None),
                gets: AtomicUsize::new(0),
                sets: AtomicUsize::new(0),
            }),
        }
    }

    /// Current document without counting as a read.
    pub fn document(&self) -> Option<RemoteDocument> {
        self.shared.document.borrow().clone()
    }

    /// Replace the document as if another client wrote it.
    pub fn put(&self, document: RemoteDocument) {
        self.shared.document.send_replace(Some(document));
    }

    /// Make every operation fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<RemoteError>) {
        *self
            .shared
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Make every read take `delay` before answering.
    pub fn set_get_delay(&self, delay: Option<Duration>) {
        *self
            .shared
            .get_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn get_count(&self) -> usize {
        self.shared.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.shared.sets.load(Ordering::SeqCst)
    }

    fn check(&self) -> RemoteResult<()> {
        match self
            .shared
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteChannel for MemoryRemote {
    async fn get(&self) -> RemoteResult<Option<RemoteDocument>> {
        let delay = *self
            .shared
            .get_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        self.shared.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.document())
    }

    async fn set(&self, document: &RemoteDocument) -> RemoteResult<()> {
        self.check()?;
        self.shared.sets.fetch_add(1, Ordering::SeqCst);
        self.put(document.clone());
        Ok(())
    }

    async fn subscribe(&self) -> RemoteResult<Subscription> {
        self.check()?;
        let mut changes = self.shared.document.subscribe();
        changes.mark_unchanged();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let task = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let document = changes.borrow_and_update().clone();
                if let Some(document) = document {
                    if tx.send(document).await.is_err() {
                        break;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}

/// Connector that hands out a [`MemoryRemote`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    remote: MemoryRemote,
    failure: Option<RemoteError>,
    delay: Option<Duration>,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            ..Self::default()
        }
    }

    /// Fail every connection attempt with `error`.
    #[must_use]
    pub fn failing(mut self, error: RemoteError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Wait `delay` before completing each connection.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn remote(&self) -> &MemoryRemote {
        &self.remote
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    async fn connect(&self, _config: &SyncConfig) -> RemoteResult<Arc<dyn RemoteChannel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(Arc::new(self.remote.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn set_then_get_and_counters() {
        let remote = MemoryRemote::new();
        assert_eq!(remote.get().await.unwrap(), None);

        let document = RemoteDocument {
            updated_at: Some(10),
            ..RemoteDocument::default()
        };
        remote.set(&document).await.unwrap();

        assert_eq!(remote.get().await.unwrap(), Some(document));
        assert_eq!(remote.get_count(), 2);
        assert_eq!(remote.set_count(), 1);
    }

    #[tokio::test]
    async fn subscription_sees_later_writes_only() {
        let remote = MemoryRemote::new();
        remote.put(RemoteDocument {
            updated_at: Some(1),
            ..RemoteDocument::default()
        });

        let mut subscription = remote.subscribe().await.unwrap();
        remote.put(RemoteDocument {
            updated_at: Some(2),
            ..RemoteDocument::default()
        });

        let next = subscription.next().await.unwrap();
        assert_eq!(next.updated_at, Some(2));
    }

    #[tokio::test]
    async fn injected_failure_is_returned() {
        let remote = MemoryRemote::new();
        remote.set_failure(Some(RemoteError::transport("offline")));
        assert_eq!(
            remote.get().await.unwrap_err(),
            RemoteError::transport("offline")
        );

        remote.set_failure(None);
        assert!(remote.get().await.is_ok());
    }
}
