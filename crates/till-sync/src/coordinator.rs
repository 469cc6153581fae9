//! # Sync Coordinator
//!
//! Keeps the local store and the remote document store converging, and
//! writes backups to the blob store.
//!
//! ## Coordinator Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator Architecture                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                       SyncCoordinator                            │  │
//! │  │                                                                  │  │
//! │  │  sync_now()           push sales → pull + deletes → push items   │  │
//! │  │  apply_remote_change  last-writer-wins, one record at a time     │  │
//! │  │  create_backup(kind)  snapshot → blob store                      │  │
//! │  │  enqueue(job)         hand a local change to the push worker     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ start()                                 │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │Remote listener │  │  Push worker   │  │   Session watcher      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ remote changes │  │ queued pushes  │  │ sync on sign-in        │    │
//! │  │ → LWW apply    │  │ with backoff   │  │ auto-backup timer      │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  STATE MACHINE:                                                         │
//! │  ──────────────                                                         │
//! │  Idle ──sync_now──► Syncing ──ok──► Idle                                │
//! │                        └────err──► Error ──sync_now──► Syncing          │
//! │                                                                         │
//! │  A sync_now while Syncing returns false and leaves the state alone.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use till_core::{now_millis, resolve, Identity, Item, Resolution, Sale, Versioned};
use till_db::{Collection, LocalStore, Record};

use crate::backup::{build_snapshot, BackupKind, BackupRecord};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::outbox::{OutboxWorker, PushJob};
use crate::remote::{BlobStore, Document, DocumentStore, RemoteChange};
use crate::session::Session;

// =============================================================================
// Sync Status
// =============================================================================

/// Where the coordinator is in its sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Error,
}

/// Observable sync state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,

    /// Completion time of the last successful sync.
    pub last_sync: Option<DateTime<Utc>>,

    /// Message of the most recent failure, cleared by a successful sync.
    pub last_error: Option<String>,

    /// Backups written since start, oldest first.
    pub backups: Vec<BackupRecord>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives status changes, e.g. to forward them to a UI.
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);

    fn emit_error(&self, message: &str, retryable: bool);
}

/// Emitter that drops everything.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

/// Result of applying one remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The local copy was newer, or there was nothing to change.
    Skipped,
}

/// Counts from one `sync_now` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sales_pushed: usize,
    pub pulled: usize,
    pub items_pushed: usize,
}

// =============================================================================
// Sync Coordinator
// =============================================================================

/// Reconciles the local store with the remote stores. Cheap to clone.
#[derive(Clone)]
pub struct SyncCoordinator {
    store: LocalStore,
    documents: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    session: Session,
    config: Arc<SyncConfig>,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,

    /// Held for the duration of a sync.
    sync_lock: Arc<Mutex<()>>,

    /// Push queue, present while started.
    outbox: Arc<RwLock<Option<mpsc::Sender<PushJob>>>>,
}

impl SyncCoordinator {
    pub fn new(
        store: LocalStore,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        session: Session,
        config: SyncConfig,
    ) -> Self {
        Self::with_emitter(store, documents, blobs, session, config, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        store: LocalStore,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        session: Session,
        config: SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        SyncCoordinator {
            store,
            documents,
            blobs,
            session,
            config: Arc::new(config),
            status: Arc::new(RwLock::new(SyncStatus::default())),
            emitter,
            sync_lock: Arc::new(Mutex::new(())),
            outbox: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Whether the background tasks are running.
    pub async fn is_running(&self) -> bool {
        self.outbox.read().await.is_some()
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    /// Runs one full reconciliation pass.
    ///
    /// Returns `false` when a sync is already running (state untouched) or
    /// when the pass failed (failure recorded in [`SyncStatus::last_error`]).
    pub async fn sync_now(&self) -> bool {
        let Ok(_guard) = self.sync_lock.try_lock() else {
            debug!("Sync already in progress, rejecting");
            return false;
        };

        self.update_status(|s| s.phase = SyncPhase::Syncing).await;

        match self.run_sync().await {
            Ok(report) => {
                info!(
                    sales_pushed = report.sales_pushed,
                    pulled = report.pulled,
                    items_pushed = report.items_pushed,
                    "Sync complete"
                );
                self.update_status(|s| {
                    s.phase = SyncPhase::Idle;
                    s.last_sync = Some(now_millis());
                    s.last_error = None;
                })
                .await;
                true
            }
            Err(e) => {
                warn!(error = %e, "Sync failed");
                self.record_error(&e).await;
                false
            }
        }
    }

    async fn run_sync(&self) -> SyncResult<SyncReport> {
        let identity = self.session.require_user("sync")?;
        debug!(uid = %identity.uid, "Sync starting");

        let mut report = SyncReport::default();

        let ledger = self.store.ledger();
        for sale in ledger.list_unsynced().await? {
            self.push_sale(&sale).await?;
            report.sales_pushed += 1;
        }

        let remote_items = self.documents.list(Collection::Catalog).await?;
        let deleted_items = self.documents.tombstones(Collection::Catalog).await?;
        let remote_sales = self.documents.list(Collection::Ledger).await?;

        // Newest thing the remote holds per item, live or deleted.
        let mut remote_versions: HashMap<String, i64> = remote_items
            .iter()
            .map(|doc| (doc.id.clone(), doc.version))
            .collect();
        for tombstone in &deleted_items {
            remote_versions
                .entry(tombstone.id.clone())
                .and_modify(|v| *v = (*v).max(tombstone.version))
                .or_insert(tombstone.version);
        }

        for (collection, documents) in [
            (Collection::Catalog, remote_items),
            (Collection::Ledger, remote_sales),
        ] {
            for document in documents {
                let change = RemoteChange::Upsert {
                    collection,
                    document,
                };
                match self.apply_remote_change(&change).await {
                    Ok(ApplyOutcome::Applied) => report.pulled += 1,
                    Ok(ApplyOutcome::Skipped) => {}
                    Err(SyncError::SerializationFailed(reason)) => {
                        warn!(%collection, id = %change.id(), %reason, "Skipping unreadable remote document");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        for tombstone in deleted_items {
            let change = RemoteChange::Delete {
                collection: Collection::Catalog,
                id: tombstone.id,
                version: tombstone.version,
            };
            if self.apply_remote_change(&change).await? == ApplyOutcome::Applied {
                report.pulled += 1;
            }
        }

        for item in self.store.catalog().list().await? {
            let newer = remote_versions
                .get(&item.id)
                .map_or(true, |remote| Record::version(&item) > *remote);
            if newer {
                self.documents
                    .put(Collection::Catalog, Document::from_record(&item)?)
                    .await?;
                report.items_pushed += 1;
            }
        }

        Ok(report)
    }

    /// Applies a change from the remote store, last writer wins.
    pub async fn apply_remote_change(&self, change: &RemoteChange) -> SyncResult<ApplyOutcome> {
        match change {
            RemoteChange::Upsert {
                collection: Collection::Catalog,
                document,
            } => {
                let item: Item = document.decode()?;
                item.validate().map_err(|e| {
                    SyncError::SerializationFailed(format!("item {}: {}", item.id, e))
                })?;
                self.apply_record(item).await
            }
            RemoteChange::Upsert {
                collection: Collection::Ledger,
                document,
            } => {
                let mut sale: Sale = document.decode()?;
                sale.synced = true;
                self.apply_record(sale).await
            }
            RemoteChange::Delete {
                collection: Collection::Catalog,
                id,
                version,
            } => {
                if self.store.delete_if_not_newer::<Item>(id, *version).await? {
                    debug!(item_id = %id, "Applied remote delete");
                    Ok(ApplyOutcome::Applied)
                } else {
                    Ok(ApplyOutcome::Skipped)
                }
            }
            RemoteChange::Delete {
                collection: Collection::Ledger,
                id,
                ..
            } => {
                debug!(sale_id = %id, "Ignoring remote delete of a sale");
                Ok(ApplyOutcome::Skipped)
            }
        }
    }

    async fn apply_record<R: Record + Versioned>(&self, record: R) -> SyncResult<ApplyOutcome> {
        let local = self.store.get_by_id::<R>(record.key()).await?;
        let local_version = local.as_ref().map(|l| Versioned::version(l));

        if resolve(local_version, Versioned::version(&record)) == Resolution::KeepLocal {
            debug!(
                collection = %R::COLLECTION,
                id = %record.key(),
                "Local copy is newer, keeping it"
            );
            return Ok(ApplyOutcome::Skipped);
        }
        if local.is_some() {
            debug!(
                collection = %R::COLLECTION,
                id = %record.key(),
                "Remote copy replaces local"
            );
        }

        // The store repeats the comparison inside the write.
        if self.store.put_if_newer(&record).await? {
            Ok(ApplyOutcome::Applied)
        } else {
            Ok(ApplyOutcome::Skipped)
        }
    }

    // -------------------------------------------------------------------------
    // Pushes
    // -------------------------------------------------------------------------

    /// Hands a local change to the push worker.
    ///
    /// Never waits on the network. Without a running worker the change is
    /// left for the next `sync_now`.
    pub async fn enqueue(&self, job: PushJob) {
        let outbox = self.outbox.read().await;
        let Some(tx) = outbox.as_ref() else {
            debug!(kind = job.kind(), id = %job.id(), "Push worker not running, deferring to next sync");
            return;
        };
        if let Err(e) = tx.try_send(job) {
            let job = match e {
                mpsc::error::TrySendError::Full(job) | mpsc::error::TrySendError::Closed(job) => job,
            };
            warn!(kind = job.kind(), id = %job.id(), "Push queue unavailable, deferring to next sync");
        }
    }

    pub(crate) async fn push(&self, job: &PushJob) -> SyncResult<()> {
        match job {
            PushJob::UpsertItem(item) => {
                self.documents
                    .put(Collection::Catalog, Document::from_record(item)?)
                    .await
            }
            PushJob::DeleteItem { id, version } => {
                self.documents.delete(Collection::Catalog, id, *version).await
            }
            PushJob::Sale(sale) => self.push_sale(sale).await,
        }
    }

    async fn push_sale(&self, sale: &Sale) -> SyncResult<()> {
        let mut remote = sale.clone();
        remote.synced = true;
        self.documents
            .put(Collection::Ledger, Document::from_record(&remote)?)
            .await?;
        self.store.ledger().mark_synced(&sale.id).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Backups
    // -------------------------------------------------------------------------

    /// Uploads a snapshot and returns its record. Failures also land in
    /// [`SyncStatus::last_error`].
    pub async fn create_backup(&self, kind: BackupKind) -> SyncResult<BackupRecord> {
        match self.run_backup(kind).await {
            Ok(record) => {
                info!(%kind, path = %record.path, records = record.records, "Backup uploaded");
                let stored = record.clone();
                self.update_status(move |s| s.backups.push(stored)).await;
                Ok(record)
            }
            Err(e) => {
                warn!(%kind, error = %e, "Backup failed");
                self.record_error(&e).await;
                Err(e)
            }
        }
    }

    async fn run_backup(&self, kind: BackupKind) -> SyncResult<BackupRecord> {
        let identity = self.session.require_user("create backup")?;
        let at = now_millis();
        let snapshot = build_snapshot(&self.store, kind, &identity.uid, at).await?;
        let url = self.blobs.upload(&snapshot.path, snapshot.contents).await?;

        Ok(BackupRecord {
            kind,
            path: snapshot.path,
            url,
            created_at: at,
            records: snapshot.records,
        })
    }

    async fn run_auto_backup(&self) {
        for kind in [BackupKind::Sales, BackupKind::Full] {
            if let Err(e) = self.create_backup(kind).await {
                error!(%kind, error = %e, "Auto-backup failed");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    pub(crate) async fn record_error(&self, err: &SyncError) {
        let message = err.to_string();
        self.emitter.emit_error(&message, err.is_retryable());
        self.update_status(|s| {
            s.phase = SyncPhase::Error;
            s.last_error = Some(message);
        })
        .await;
    }

    async fn update_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        let snapshot = {
            let mut status = self.status.write().await;
            f(&mut status);
            status.clone()
        };
        self.emitter.emit_status(&snapshot);
    }

    // -------------------------------------------------------------------------
    // Background tasks
    // -------------------------------------------------------------------------

    /// Spawns the remote listener, push worker and session watcher.
    pub async fn start(&self) -> SyncResult<CoordinatorHandle> {
        let mut outbox = self.outbox.write().await;
        if outbox.is_some() {
            return Err(SyncError::AlreadyRunning);
        }

        info!(
            device_id = %self.config.device_id(),
            auto_backup_secs = self.config.sync.auto_backup_interval_secs,
            "Starting sync coordinator"
        );

        let (job_tx, job_rx) = mpsc::channel(self.config.sync.queue_capacity);
        *outbox = Some(job_tx);
        drop(outbox);

        let mut tasks = Vec::with_capacity(3);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let changes = self.documents.watch();
        tasks.push(BackgroundTask {
            name: "remote listener",
            shutdown_tx,
            join: tokio::spawn(self.clone().listen_remote(changes, shutdown_rx)),
        });

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let worker = OutboxWorker::new(self.clone(), job_rx, shutdown_rx);
        tasks.push(BackgroundTask {
            name: "push worker",
            shutdown_tx,
            join: tokio::spawn(worker.run()),
        });

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let identities = self.session.subscribe();
        tasks.push(BackgroundTask {
            name: "session watcher",
            shutdown_tx,
            join: tokio::spawn(self.clone().watch_session(identities, shutdown_rx)),
        });

        info!("Sync coordinator started");
        Ok(CoordinatorHandle {
            tasks,
            outbox: self.outbox.clone(),
        })
    }

    async fn listen_remote(
        self,
        mut changes: broadcast::Receiver<RemoteChange>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Remote listener starting");

        loop {
            tokio::select! {
                received = changes.recv() => match received {
                    Ok(change) => match self.apply_remote_change(&change).await {
                        Ok(outcome) => {
                            debug!(
                                collection = %change.collection(),
                                id = %change.id(),
                                ?outcome,
                                "Remote change handled"
                            );
                        }
                        Err(e) => {
                            error!(
                                collection = %change.collection(),
                                id = %change.id(),
                                error = %e,
                                "Failed to apply remote change"
                            );
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Remote listener lagged, next sync reconciles");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Remote change feed closed");
                        break;
                    }
                },

                _ = shutdown_rx.recv() => {
                    info!("Remote listener shutting down");
                    break;
                }
            }
        }

        info!("Remote listener stopped");
    }

    async fn watch_session(
        self,
        mut identities: watch::Receiver<Option<Identity>>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Session watcher starting");

        let period = self.config.auto_backup_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut current_uid = identities.borrow_and_update().as_ref().map(|i| i.uid.clone());
        if current_uid.is_some() && self.config.sync.sync_on_login {
            self.sync_now().await;
        }

        loop {
            tokio::select! {
                changed = identities.changed() => {
                    if changed.is_err() {
                        info!("Session closed");
                        break;
                    }
                    let uid = identities.borrow_and_update().as_ref().map(|i| i.uid.clone());
                    let signed_in = uid.is_some() && uid != current_uid;
                    current_uid = uid;

                    if signed_in {
                        ticker.reset();
                        if self.config.sync.sync_on_login {
                            self.sync_now().await;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if current_uid.is_some() {
                        debug!("Auto-backup due");
                        self.run_auto_backup().await;
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Session watcher shutting down");
                    break;
                }
            }
        }

        info!("Session watcher stopped");
    }
}

// =============================================================================
// Coordinator Handle
// =============================================================================

struct BackgroundTask {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

/// Owns the coordinator's background tasks.
pub struct CoordinatorHandle {
    tasks: Vec<BackgroundTask>,
    outbox: Arc<RwLock<Option<mpsc::Sender<PushJob>>>>,
}

impl CoordinatorHandle {
    /// Stops every background task and waits for it to finish.
    pub async fn shutdown(self) {
        info!("Shutting down sync coordinator");

        self.outbox.write().await.take();

        for task in self.tasks {
            let _ = task.shutdown_tx.send(()).await;
            if let Err(e) = task.join.await {
                error!(task = task.name, error = %e, "Background task failed");
            }
        }

        info!("Sync coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::session::AccessPolicy;
    use chrono::TimeZone;
    use std::time::Duration;
    use till_core::{Cart, ItemForm, Money, PaymentMethod};
    use till_db::StoreConfig;

    struct Fixture {
        coordinator: SyncCoordinator,
        remote: Arc<MemoryRemote>,
        store: LocalStore,
        session: Session,
    }

    async fn fixture_with(config: SyncConfig) -> Fixture {
        fixture_on(Arc::new(MemoryRemote::new()), config).await
    }

    /// A terminal on `remote`, which other fixtures may share.
    async fn fixture_on(remote: Arc<MemoryRemote>, config: SyncConfig) -> Fixture {
        let store = LocalStore::open(StoreConfig::in_memory()).await.unwrap();
        let session = Session::new(AccessPolicy::new(vec!["owner@example.com".to_string()]));
        let coordinator = SyncCoordinator::new(
            store.clone(),
            remote.clone(),
            remote.clone(),
            session.clone(),
            config,
        );
        Fixture {
            coordinator,
            remote,
            store,
            session,
        }
    }

    fn test_config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.sync.sync_on_login = false;
        config.sync.initial_backoff_ms = 10;
        config.sync.max_backoff_secs = 1;
        config
    }

    async fn fixture() -> Fixture {
        fixture_with(test_config()).await
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn item_at(id: &str, name: &str, ms: i64) -> Item {
        let mut item = Item::create(ItemForm::new(name, Money::from_cents(300), 10), at(ms)).unwrap();
        item.id = id.to_string();
        item
    }

    fn upsert(item: &Item) -> RemoteChange {
        RemoteChange::Upsert {
            collection: Collection::Catalog,
            document: Document::from_record(item).unwrap(),
        }
    }

    async fn local_item(store: &LocalStore, id: &str) -> Option<Item> {
        store.catalog().get_by_id(id).await.unwrap()
    }

    async fn checkout(store: &LocalStore, item: &Item) -> Sale {
        let mut cart = Cart::default();
        cart.add(item, 1).unwrap();
        let sale = cart.to_sale(PaymentMethod::Cash, now_millis()).unwrap();
        store.ledger().commit_checkout(&sale).await.unwrap();
        sale
    }

    #[tokio::test]
    async fn test_sync_requires_sign_in() {
        let f = fixture().await;

        assert!(!f.coordinator.sync_now().await);

        let status = f.coordinator.status().await;
        assert_eq!(status.phase, SyncPhase::Error);
        assert_eq!(status.last_error.as_deref(), Some("Not authorized to sync"));
        assert!(status.last_sync.is_none());
    }

    #[tokio::test]
    async fn test_sync_pushes_and_pulls() {
        let f = fixture().await;
        f.session.sign_in("u1", None);

        let coffee = f
            .store
            .catalog()
            .create(ItemForm::new("Coffee", Money::from_cents(250), 10))
            .await
            .unwrap();
        let sale = checkout(&f.store, &coffee).await;
        let tea = item_at("tea", "Tea", 1_000);
        f.remote.publish(upsert(&tea)).await;

        assert!(f.coordinator.sync_now().await);

        let pushed = f.remote.document(Collection::Ledger, &sale.id).await.unwrap();
        assert_eq!(pushed.body["synced"], true);
        assert!(f.store.ledger().get_by_id(&sale.id).await.unwrap().unwrap().synced);
        assert!(f.store.ledger().list_unsynced().await.unwrap().is_empty());

        let remote_coffee = f.remote.document(Collection::Catalog, &coffee.id).await.unwrap();
        assert_eq!(remote_coffee.body["stock"], 9);
        assert_eq!(local_item(&f.store, "tea").await.unwrap().name, "Tea");

        let status = f.coordinator.status().await;
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(status.last_sync.is_some());
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_sync_keeps_newer_side() {
        let f = fixture().await;
        f.session.sign_in("u1", None);

        f.store.put(&item_at("a", "Local A", 2_000)).await.unwrap();
        f.store.put(&item_at("b", "Local B", 1_000)).await.unwrap();
        f.remote.publish(upsert(&item_at("a", "Remote A", 1_000))).await;
        f.remote.publish(upsert(&item_at("b", "Remote B", 2_000))).await;

        assert!(f.coordinator.sync_now().await);

        assert_eq!(local_item(&f.store, "a").await.unwrap().name, "Local A");
        assert_eq!(local_item(&f.store, "b").await.unwrap().name, "Remote B");
        let remote_a = f.remote.document(Collection::Catalog, "a").await.unwrap();
        assert_eq!(remote_a.body["name"], "Local A");
        let remote_b = f.remote.document(Collection::Catalog, "b").await.unwrap();
        assert_eq!(remote_b.body["name"], "Remote B");
    }

    #[tokio::test]
    async fn test_sync_is_single_flight() {
        let f = fixture().await;
        f.session.sign_in("u1", None);
        f.remote.set_latency(Duration::from_millis(200));

        let first = {
            let coordinator = f.coordinator.clone();
            tokio::spawn(async move { coordinator.sync_now().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!f.coordinator.sync_now().await);
        assert_eq!(f.coordinator.status().await.phase, SyncPhase::Syncing);

        assert!(first.await.unwrap());
        assert_eq!(f.coordinator.status().await.phase, SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_sync_failure_then_recovery() {
        let f = fixture().await;
        f.session.sign_in("u1", None);
        f.remote.set_online(false);

        assert!(!f.coordinator.sync_now().await);
        assert_eq!(f.coordinator.status().await.phase, SyncPhase::Error);

        f.remote.set_online(true);
        assert!(f.coordinator.sync_now().await);
        let status = f.coordinator.status().await;
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_remote_change_last_writer_wins() {
        let f = fixture().await;
        f.store.put(&item_at("a", "Local", 5_000)).await.unwrap();

        let older = f.coordinator.apply_remote_change(&upsert(&item_at("a", "Older", 4_000))).await;
        assert_eq!(older.unwrap(), ApplyOutcome::Skipped);
        assert_eq!(local_item(&f.store, "a").await.unwrap().name, "Local");

        let tie = f.coordinator.apply_remote_change(&upsert(&item_at("a", "Tie", 5_000))).await;
        assert_eq!(tie.unwrap(), ApplyOutcome::Applied);
        assert_eq!(local_item(&f.store, "a").await.unwrap().name, "Tie");

        let newer = f.coordinator.apply_remote_change(&upsert(&item_at("a", "Newer", 6_000))).await;
        assert_eq!(newer.unwrap(), ApplyOutcome::Applied);
        assert_eq!(local_item(&f.store, "a").await.unwrap().name, "Newer");
    }

    #[tokio::test]
    async fn test_remote_delete_respects_local_edits() {
        let f = fixture().await;
        f.store.put(&item_at("a", "Edited", 5_000)).await.unwrap();

        let stale = RemoteChange::Delete {
            collection: Collection::Catalog,
            id: "a".to_string(),
            version: 4_000,
        };
        assert_eq!(f.coordinator.apply_remote_change(&stale).await.unwrap(), ApplyOutcome::Skipped);
        assert!(local_item(&f.store, "a").await.is_some());

        let fresh = RemoteChange::Delete {
            collection: Collection::Catalog,
            id: "a".to_string(),
            version: 6_000,
        };
        assert_eq!(f.coordinator.apply_remote_change(&fresh).await.unwrap(), ApplyOutcome::Applied);
        assert!(local_item(&f.store, "a").await.is_none());
    }

    #[tokio::test]
    async fn test_apply_order_does_not_matter() {
        let changes = [
            upsert(&item_at("a", "First", 1_000)),
            upsert(&item_at("a", "Second", 3_000)),
            upsert(&item_at("a", "Third", 2_000)),
        ];

        let forward = fixture().await;
        for change in changes.iter() {
            forward.coordinator.apply_remote_change(change).await.unwrap();
        }
        let backward = fixture().await;
        for change in changes.iter().rev() {
            backward.coordinator.apply_remote_change(change).await.unwrap();
        }

        let a = local_item(&forward.store, "a").await.unwrap();
        let b = local_item(&backward.store, "a").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "Second");
    }

    #[tokio::test]
    async fn test_pulled_sales_are_marked_synced() {
        let f = fixture().await;
        let coffee = item_at("coffee", "Coffee", 1_000);
        let mut cart = Cart::default();
        cart.add(&coffee, 2).unwrap();
        let sale = cart.to_sale(PaymentMethod::Card, at(2_000)).unwrap();

        let change = RemoteChange::Upsert {
            collection: Collection::Ledger,
            document: Document::from_record(&sale).unwrap(),
        };
        assert_eq!(f.coordinator.apply_remote_change(&change).await.unwrap(), ApplyOutcome::Applied);

        let stored = f.store.ledger().get_by_id(&sale.id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.total, sale.total);

        let delete = RemoteChange::Delete {
            collection: Collection::Ledger,
            id: sale.id.clone(),
            version: 9_000,
        };
        assert_eq!(f.coordinator.apply_remote_change(&delete).await.unwrap(), ApplyOutcome::Skipped);
        assert!(f.store.ledger().get_by_id(&sale.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_remote_item_is_skipped() {
        let f = fixture().await;
        f.session.sign_in("u1", None);

        let mut broken = item_at("bad", "Broken", 1_000);
        broken.name = String::new();
        broken.stock = -5;
        let change = upsert(&broken);

        let err = f.coordinator.apply_remote_change(&change).await.unwrap_err();
        assert!(matches!(err, SyncError::SerializationFailed(_)));
        assert!(local_item(&f.store, "bad").await.is_none());

        // During a sync the document is skipped and the rest still applies
        f.remote.publish(change).await;
        f.remote.publish(upsert(&item_at("tea", "Tea", 1_000))).await;
        assert!(f.coordinator.sync_now().await);
        assert!(local_item(&f.store, "bad").await.is_none());
        assert!(local_item(&f.store, "tea").await.is_some());
    }

    #[tokio::test]
    async fn test_mismatched_document_is_rejected() {
        let f = fixture().await;
        let mut document = Document::from_record(&item_at("a", "A", 1_000)).unwrap();
        document.id = "b".to_string();

        let change = RemoteChange::Upsert {
            collection: Collection::Catalog,
            document,
        };
        assert!(f.coordinator.apply_remote_change(&change).await.is_err());
        assert!(local_item(&f.store, "a").await.is_none());
        assert!(local_item(&f.store, "b").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_reaches_device_that_missed_it() {
        let remote = Arc::new(MemoryRemote::new());
        let a = fixture_on(remote.clone(), test_config()).await;
        let b = fixture_on(remote.clone(), test_config()).await;
        a.session.sign_in("u1", None);
        b.session.sign_in("u2", None);

        let coffee = item_at("p1", "Coffee", 1_000);
        a.store.put(&coffee).await.unwrap();
        b.store.put(&coffee).await.unwrap();
        remote.publish(upsert(&coffee)).await;

        // A deletes while B is not listening
        a.store.delete::<Item>("p1").await.unwrap();
        a.coordinator
            .push(&PushJob::DeleteItem {
                id: "p1".to_string(),
                version: 2_000,
            })
            .await
            .unwrap();

        assert!(b.coordinator.sync_now().await);
        assert!(a.coordinator.sync_now().await);

        assert!(remote.document(Collection::Catalog, "p1").await.is_none());
        assert!(local_item(&a.store, "p1").await.is_none());
        assert!(local_item(&b.store, "p1").await.is_none());
    }

    #[tokio::test]
    async fn test_edit_newer_than_delete_wins_everywhere() {
        let remote = Arc::new(MemoryRemote::new());
        let a = fixture_on(remote.clone(), test_config()).await;
        let b = fixture_on(remote.clone(), test_config()).await;
        a.session.sign_in("u1", None);
        b.session.sign_in("u2", None);

        let coffee = item_at("p1", "Coffee", 1_000);
        a.store.put(&coffee).await.unwrap();
        remote.publish(upsert(&coffee)).await;

        a.store.delete::<Item>("p1").await.unwrap();
        a.coordinator
            .push(&PushJob::DeleteItem {
                id: "p1".to_string(),
                version: 2_000,
            })
            .await
            .unwrap();

        // B edited its copy offline after the delete
        b.store.put(&item_at("p1", "Espresso", 3_000)).await.unwrap();

        assert!(b.coordinator.sync_now().await);
        assert!(a.coordinator.sync_now().await);

        assert_eq!(local_item(&a.store, "p1").await.unwrap().name, "Espresso");
        assert_eq!(local_item(&b.store, "p1").await.unwrap().name, "Espresso");
        assert_eq!(remote.document(Collection::Catalog, "p1").await.unwrap().version, 3_000);
    }

    #[tokio::test]
    async fn test_http_delete_keeps_later_local_edit() {
        use crate::config::RemoteSettings;
        use crate::remote::{HttpRemote, Tombstone};
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        for collection in ["catalog", "ledger"] {
            Mock::given(method("GET"))
                .and(path(format!("/collections/{}/documents", collection)))
                .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Document>::new()))
                .mount(&server)
                .await;
        }
        let tombstones = vec![
            Tombstone {
                id: "edited".to_string(),
                version: 2_000,
            },
            Tombstone {
                id: "stale".to_string(),
                version: 2_000,
            },
        ];
        Mock::given(method("GET"))
            .and(path("/collections/catalog/tombstones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tombstones))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/catalog/documents/edited"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let remote = Arc::new(
            HttpRemote::new(&RemoteSettings {
                url: Some(server.uri()),
                token: None,
                timeout_secs: 5,
                poll_interval_secs: 1,
            })
            .unwrap(),
        );
        let store = LocalStore::open(StoreConfig::in_memory()).await.unwrap();
        let session = Session::new(AccessPolicy::default());
        let coordinator =
            SyncCoordinator::new(store.clone(), remote.clone(), remote, session.clone(), test_config());
        session.sign_in("u1", None);

        store.put(&item_at("edited", "Edited after delete", 3_000)).await.unwrap();
        store.put(&item_at("stale", "Untouched", 1_500)).await.unwrap();

        assert!(coordinator.sync_now().await);

        assert!(local_item(&store, "edited").await.is_some());
        assert!(local_item(&store, "stale").await.is_none());
    }

    #[tokio::test]
    async fn test_create_backup() {
        let f = fixture().await;
        let err = f.coordinator.create_backup(BackupKind::Full).await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized { .. }));
        assert!(f.coordinator.status().await.last_error.is_some());

        f.session.sign_in("u1", None);
        let coffee = f
            .store
            .catalog()
            .create(ItemForm::new("Coffee", Money::from_cents(250), 10))
            .await
            .unwrap();
        checkout(&f.store, &coffee).await;

        let full = f.coordinator.create_backup(BackupKind::Full).await.unwrap();
        assert!(full.path.starts_with("backups/full_backup_"));
        assert!(full.path.ends_with("Z.json"));
        assert_eq!(full.url, format!("memory://{}", full.path));
        assert_eq!(full.records, 2);

        let sales = f.coordinator.create_backup(BackupKind::Sales).await.unwrap();
        assert!(sales.path.starts_with("backups/sales_backup_"));

        let blob = f.remote.blob(&full.path).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["catalog"][0]["name"], "Coffee");

        let status = f.coordinator.status().await;
        assert_eq!(status.backups, vec![full, sales]);
    }

    #[tokio::test]
    async fn test_concurrent_backups_are_both_written() {
        let f = fixture().await;
        f.session.sign_in("u1", None);

        let (a, b) = tokio::join!(
            f.coordinator.create_backup(BackupKind::Full),
            f.coordinator.create_backup(BackupKind::Full)
        );

        let a = a.unwrap();
        let b = b.unwrap();
        for record in [&a, &b] {
            let blob = f.remote.blob(&record.path).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&blob).unwrap();
            assert!(json["catalog"].is_array());
        }
        assert_eq!(f.coordinator.status().await.backups.len(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_without_worker_defers() {
        let f = fixture().await;
        f.coordinator
            .enqueue(PushJob::UpsertItem(item_at("a", "A", 1_000)))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.remote.writes(), 0);
    }

    #[tokio::test]
    async fn test_push_worker_retries_until_online() {
        let f = fixture().await;
        f.remote.set_online(false);
        let handle = f.coordinator.start().await.unwrap();

        let item = item_at("a", "A", 1_000);
        f.coordinator.enqueue(PushJob::UpsertItem(item.clone())).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(f.remote.document(Collection::Catalog, "a").await.is_none());

        f.remote.set_online(true);
        let pushed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if f.remote.document(Collection::Catalog, "a").await.is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(pushed.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_push_worker_marks_sales_synced() {
        let f = fixture().await;
        let handle = f.coordinator.start().await.unwrap();

        let coffee = f
            .store
            .catalog()
            .create(ItemForm::new("Coffee", Money::from_cents(250), 10))
            .await
            .unwrap();
        let sale = checkout(&f.store, &coffee).await;
        f.coordinator.enqueue(PushJob::Sale(sale.clone())).await;

        let synced = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stored = f.store.ledger().get_by_id(&sale.id).await.unwrap().unwrap();
                if stored.synced {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(synced.is_ok());
        assert!(f.remote.document(Collection::Ledger, &sale.id).await.is_some());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_listener_and_shutdown() {
        let f = fixture().await;
        f.store.put(&item_at("a", "Local", 1_000)).await.unwrap();

        let handle = f.coordinator.start().await.unwrap();
        assert!(f.coordinator.is_running().await);
        assert!(matches!(f.coordinator.start().await, Err(SyncError::AlreadyRunning)));

        f.remote.publish(upsert(&item_at("a", "From another till", 2_000))).await;
        let applied = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if local_item(&f.store, "a").await.unwrap().name == "From another till" {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(applied.is_ok());

        handle.shutdown().await;
        assert!(!f.coordinator.is_running().await);

        f.remote.publish(upsert(&item_at("a", "After shutdown", 3_000))).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(local_item(&f.store, "a").await.unwrap().name, "From another till");
    }

    #[tokio::test]
    async fn test_sync_on_sign_in() {
        let mut config = test_config();
        config.sync.sync_on_login = true;
        let f = fixture_with(config).await;
        f.remote.publish(upsert(&item_at("tea", "Tea", 1_000))).await;

        let handle = f.coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.coordinator.status().await.last_sync.is_none());

        f.session.sign_in("u1", None);
        let synced = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if f.coordinator.status().await.last_sync.is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(synced.is_ok());
        assert!(local_item(&f.store, "tea").await.is_some());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_auto_backup_runs_only_while_signed_in() {
        let mut config = test_config();
        config.sync.auto_backup_interval_secs = 1;
        let f = fixture_with(config).await;
        let handle = f.coordinator.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_300)).await;
        assert!(f.remote.blob_paths().await.is_empty());

        f.session.sign_in("u1", None);
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let paths = f.remote.blob_paths().await;
        assert!(paths.iter().any(|p| p.starts_with("backups/sales_backup_")));
        assert!(paths.iter().any(|p| p.starts_with("backups/full_backup_")));

        f.session.sign_out();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let written = f.remote.blob_paths().await.len();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(f.remote.blob_paths().await.len(), written);

        handle.shutdown().await;
    }
}
