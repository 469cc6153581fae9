//! # Push Outbox
//!
//! Local changes waiting to reach the remote store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Push Worker Loop                                 │
//! │                                                                         │
//! │  CatalogService / CartEngine                                            │
//! │       │ enqueue(PushJob)   (never waits on the network)                 │
//! │       ▼                                                                 │
//! │  mpsc queue ──► worker ──► remote.put / remote.delete                   │
//! │                    │                                                    │
//! │                    ├── retryable error → sleep(backoff) → again         │
//! │                    ├── backoff exhausted / permanent → last_error       │
//! │                    └── shutdown signal → stop, even mid-backoff         │
//! │                                                                         │
//! │  The local write already happened; a failed push never undoes it.       │
//! │  Anything dropped here is picked up by the next sync_now.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use till_core::{Item, Sale};

use crate::coordinator::SyncCoordinator;
use crate::error::SyncResult;

/// A local change to push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushJob {
    UpsertItem(Item),
    DeleteItem { id: String, version: i64 },
    Sale(Sale),
}

impl PushJob {
    pub fn id(&self) -> &str {
        match self {
            PushJob::UpsertItem(item) => &item.id,
            PushJob::DeleteItem { id, .. } => id,
            PushJob::Sale(sale) => &sale.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PushJob::UpsertItem(_) => "upsert_item",
            PushJob::DeleteItem { .. } => "delete_item",
            PushJob::Sale(_) => "sale",
        }
    }
}

/// Drains the push queue until shut down.
pub(crate) struct OutboxWorker {
    coordinator: SyncCoordinator,
    jobs: mpsc::Receiver<PushJob>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl OutboxWorker {
    pub(crate) fn new(
        coordinator: SyncCoordinator,
        jobs: mpsc::Receiver<PushJob>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        OutboxWorker {
            coordinator,
            jobs,
            shutdown_rx,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Push worker starting");

        loop {
            tokio::select! {
                Some(job) = self.jobs.recv() => {
                    match self.push_with_retry(&job).await {
                        Some(Ok(())) => {
                            debug!(kind = job.kind(), id = %job.id(), "Pushed");
                        }
                        Some(Err(e)) => {
                            error!(kind = job.kind(), id = %job.id(), error = %e, "Push failed");
                            self.coordinator.record_error(&e).await;
                        }
                        None => break,
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Push worker shutting down");
                    break;
                }
            }
        }

        info!("Push worker stopped");
    }

    /// `None` when shut down while waiting to retry.
    async fn push_with_retry(&mut self, job: &PushJob) -> Option<SyncResult<()>> {
        let mut backoff = self.coordinator.config().push_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match self.coordinator.push(job).await {
                Ok(()) => return Some(Ok(())),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Some(Err(e)),
            };

            let Some(wait) = backoff.next_backoff() else {
                return Some(Err(err));
            };
            debug!(attempt, ?wait, error = %err, "Push failed, retrying");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown during push backoff");
                    return None;
                }
            }
        }
    }
}
