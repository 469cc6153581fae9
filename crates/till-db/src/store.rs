//! # Local Store
//!
//! Connection pool, versioned document collections, transactions and the
//! change feed.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Local Store                                     │
//! │                                                                         │
//! │  Terminal startup                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreHandle::open() ← first call connects + migrates, later calls     │
//! │       │                 return the same LocalStore                      │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool (WAL)             │                           │
//! │  │   catalog (id, version, body)           │                           │
//! │  │   ledger  (id, version, body)           │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── put / insert / get / delete / index lookups                  │
//! │       ├── put_if_newer  (one conditional upsert: LWW per record)       │
//! │       ├── begin() → StoreTx → commit()                                 │
//! │       └── subscribe() → StoreEvent stream                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! Readers don't block writers and writers don't block readers, so the
//! sync listener can apply remote changes while the cashier keeps selling.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations::{self, LATEST_VERSION};
use crate::record::{Collection, Index, IndexValue, Record, StoreEvent};
use crate::repository::{catalog::CatalogRepository, ledger::SaleLedger};

/// Capacity of the change feed before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// Local store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = StoreConfig::new("/path/to/till.db")
///     .max_connections(5)
///     .schema_version(2);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Schema version to open at.
    /// Default: the latest known version
    pub schema_version: i64,
}

impl StoreConfig {
    /// Creates a configuration for the database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            schema_version: LATEST_VERSION,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the schema version to open at.
    pub fn schema_version(mut self, version: i64) -> Self {
        self.schema_version = version;
        self
    }

    /// Creates an in-memory configuration (for testing).
    ///
    /// Every call gives a fresh, isolated database.
    pub fn in_memory() -> Self {
        StoreConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            schema_version: LATEST_VERSION,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Local Store
// =============================================================================

/// Handle to the open local store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    events: broadcast::Sender<StoreEvent>,
}

impl LocalStore {
    /// Opens the store and brings its schema to `config.schema_version`.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL journal, NORMAL synchronous
    /// 3. Creates the connection pool
    /// 4. Runs pending migrations (fails on a downgrade)
    pub async fn open(config: StoreConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            schema_version = config.schema_version,
            "Opening local store"
        );

        let base_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true)
        };

        let connect_options = base_options
            // Readers don't block the writer
            .journal_mode(SqliteJournalMode::Wal)
            // Safe from corruption, may lose the last commit on power loss
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(max_connections = config.max_connections, "Store pool created");

        if let Err(e) = migrations::run_migrations(&pool, config.schema_version).await {
            pool.close().await;
            return Err(e);
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!("Local store ready");

        Ok(LocalStore { pool, events })
    }

    /// Returns the connection pool, for queries the store doesn't cover.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persisted schema version.
    pub async fn schema_version(&self) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        migrations::current_version(&mut conn).await
    }

    /// Subscribes to committed changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Starts a transaction. Dropping the returned value rolls it back.
    pub async fn begin(&self) -> DbResult<StoreTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(StoreTx {
            tx,
            pending: Vec::new(),
            events: self.events.clone(),
        })
    }

    /// Catalog repository over this store.
    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.clone())
    }

    /// Sale ledger over this store.
    pub fn ledger(&self) -> SaleLedger {
        SaleLedger::new(self.clone())
    }

    // -------------------------------------------------------------------------
    // Record operations
    // -------------------------------------------------------------------------

    /// Inserts or replaces `record`.
    pub async fn put<R: Record>(&self, record: &R) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        ops::put(&mut conn, record).await?;
        self.emit(upserted::<R>(record.key()));
        Ok(())
    }

    /// Inserts `record`, failing with `UniqueViolation` if the key exists.
    pub async fn insert<R: Record>(&self, record: &R) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        ops::insert(&mut conn, record).await?;
        self.emit(upserted::<R>(record.key()));
        Ok(())
    }

    /// Writes `record` only if it is at least as new as the stored copy.
    ///
    /// One conditional upsert, so no other writer can slip between the
    /// comparison and the write. Returns whether the record was written.
    pub async fn put_if_newer<R: Record>(&self, record: &R) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let applied = ops::put_if_newer(&mut conn, record).await?;
        if applied {
            self.emit(upserted::<R>(record.key()));
        }
        Ok(applied)
    }

    /// All records of a collection in key order.
    pub async fn get_all<R: Record>(&self) -> DbResult<Vec<R>> {
        let mut conn = self.pool.acquire().await?;
        ops::get_all(&mut conn).await
    }

    pub async fn get_by_id<R: Record>(&self, id: &str) -> DbResult<Option<R>> {
        let mut conn = self.pool.acquire().await?;
        ops::get_by_id(&mut conn, id).await
    }

    /// Deletes a record. Returns whether it existed.
    pub async fn delete<R: Record>(&self, id: &str) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let deleted = ops::delete(&mut conn, R::COLLECTION, id, None).await?;
        if deleted {
            self.emit(deleted_event(R::COLLECTION, id));
        }
        Ok(deleted)
    }

    /// Deletes a record unless the stored copy is newer than `version`.
    pub async fn delete_if_not_newer<R: Record>(&self, id: &str, version: i64) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        let deleted = ops::delete(&mut conn, R::COLLECTION, id, Some(version)).await?;
        if deleted {
            self.emit(deleted_event(R::COLLECTION, id));
        }
        Ok(deleted)
    }

    /// Records whose indexed value equals `value`.
    pub async fn find_by_index<R: Record>(
        &self,
        index: Index,
        value: impl Into<IndexValue>,
    ) -> DbResult<Vec<R>> {
        let value = value.into();
        let mut conn = self.pool.acquire().await?;
        ops::range_by_index(&mut conn, index, Some(&value), Some(&value)).await
    }

    /// Records whose indexed value lies in `[lower, upper]`, ordered by it.
    ///
    /// Either bound may be open.
    pub async fn range_by_index<R: Record>(
        &self,
        index: Index,
        lower: Option<IndexValue>,
        upper: Option<IndexValue>,
    ) -> DbResult<Vec<R>> {
        let mut conn = self.pool.acquire().await?;
        ops::range_by_index(&mut conn, index, lower.as_ref(), upper.as_ref()).await
    }

    /// Number of records in `collection`.
    pub async fn count(&self, collection: Collection) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Checks if the store can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Closes the pool. Every later operation fails.
    pub async fn close(&self) {
        info!("Closing local store");
        self.pool.close().await;
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn upserted<R: Record>(id: &str) -> StoreEvent {
    StoreEvent::Upserted {
        collection: R::COLLECTION,
        id: id.to_string(),
    }
}

fn deleted_event(collection: Collection, id: &str) -> StoreEvent {
    StoreEvent::Deleted {
        collection,
        id: id.to_string(),
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// A multi-record transaction.
///
/// Writes become visible, and their events are published, only on
/// [`StoreTx::commit`]. Dropping without committing rolls everything back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
    pending: Vec<StoreEvent>,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreTx {
    pub async fn put<R: Record>(&mut self, record: &R) -> DbResult<()> {
        ops::put(&mut self.tx, record).await?;
        self.pending.push(upserted::<R>(record.key()));
        Ok(())
    }

    pub async fn insert<R: Record>(&mut self, record: &R) -> DbResult<()> {
        ops::insert(&mut self.tx, record).await?;
        self.pending.push(upserted::<R>(record.key()));
        Ok(())
    }

    pub async fn put_if_newer<R: Record>(&mut self, record: &R) -> DbResult<bool> {
        let applied = ops::put_if_newer(&mut self.tx, record).await?;
        if applied {
            self.pending.push(upserted::<R>(record.key()));
        }
        Ok(applied)
    }

    pub async fn get_all<R: Record>(&mut self) -> DbResult<Vec<R>> {
        ops::get_all(&mut self.tx).await
    }

    pub async fn get_by_id<R: Record>(&mut self, id: &str) -> DbResult<Option<R>> {
        ops::get_by_id(&mut self.tx, id).await
    }

    pub async fn delete<R: Record>(&mut self, id: &str) -> DbResult<bool> {
        let deleted = ops::delete(&mut self.tx, R::COLLECTION, id, None).await?;
        if deleted {
            self.pending.push(deleted_event(R::COLLECTION, id));
        }
        Ok(deleted)
    }

    /// Commits and publishes the collected change events.
    pub async fn commit(self) -> DbResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        for event in self.pending {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    /// Rolls back explicitly.
    pub async fn rollback(self) -> DbResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

// =============================================================================
// Open-once Handle
// =============================================================================

/// Opens the store at most once per process.
///
/// ```rust,ignore
/// let handle = StoreHandle::new(StoreConfig::new(path));
/// let store = handle.open().await?;   // connects + migrates
/// let again = handle.open().await?;   // same handle, no reinit
/// ```
#[derive(Debug)]
pub struct StoreHandle {
    config: StoreConfig,
    cell: OnceCell<LocalStore>,
}

impl StoreHandle {
    pub fn new(config: StoreConfig) -> Self {
        StoreHandle {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Opens the store on first call; later calls return the same handle.
    ///
    /// A failed open leaves the handle empty, so the next call retries.
    pub async fn open(&self) -> DbResult<&LocalStore> {
        self.cell
            .get_or_try_init(|| async {
                LocalStore::open(self.config.clone()).await.map_err(|e| {
                    warn!(error = %e, "Local store failed to open");
                    e
                })
            })
            .await
    }

    /// The store, if already open.
    pub fn get(&self) -> Option<&LocalStore> {
        self.cell.get()
    }
}

// =============================================================================
// Row Operations
// =============================================================================

/// SQL shared by the pool and transaction paths.
mod ops {
    use super::*;

    pub(super) async fn put<R: Record>(conn: &mut SqliteConnection, record: &R) -> DbResult<()> {
        let body = serde_json::to_string(record)?;
        let sql = format!(
            "INSERT INTO {t} (id, version, body) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET version = excluded.version, body = excluded.body",
            t = R::COLLECTION.table()
        );

        sqlx::query(&sql)
            .bind(record.key())
            .bind(record.version())
            .bind(body)
            .execute(&mut *conn)
            .await?;

        debug!(collection = %R::COLLECTION, id = %record.key(), "Record stored");
        Ok(())
    }

    pub(super) async fn insert<R: Record>(conn: &mut SqliteConnection, record: &R) -> DbResult<()> {
        let body = serde_json::to_string(record)?;
        let table = R::COLLECTION.table();
        let sql = format!("INSERT INTO {} (id, version, body) VALUES (?1, ?2, ?3)", table);

        sqlx::query(&sql)
            .bind(record.key())
            .bind(record.version())
            .bind(body)
            .execute(&mut *conn)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => {
                    DbError::duplicate(format!("{}.id", table), record.key())
                }
                other => other,
            })?;

        debug!(collection = %R::COLLECTION, id = %record.key(), "Record inserted");
        Ok(())
    }

    pub(super) async fn put_if_newer<R: Record>(
        conn: &mut SqliteConnection,
        record: &R,
    ) -> DbResult<bool> {
        let body = serde_json::to_string(record)?;
        let sql = format!(
            "INSERT INTO {t} (id, version, body) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET version = excluded.version, body = excluded.body \
             WHERE excluded.version >= {t}.version",
            t = R::COLLECTION.table()
        );

        let result = sqlx::query(&sql)
            .bind(record.key())
            .bind(record.version())
            .bind(body)
            .execute(&mut *conn)
            .await?;

        let applied = result.rows_affected() > 0;
        debug!(
            collection = %R::COLLECTION,
            id = %record.key(),
            version = record.version(),
            applied,
            "Conditional put"
        );
        Ok(applied)
    }

    pub(super) async fn get_all<R: Record>(conn: &mut SqliteConnection) -> DbResult<Vec<R>> {
        let sql = format!("SELECT body FROM {} ORDER BY id", R::COLLECTION.table());
        let bodies: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&mut *conn).await?;
        decode_all(bodies)
    }

    pub(super) async fn get_by_id<R: Record>(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<R>> {
        let sql = format!("SELECT body FROM {} WHERE id = ?1", R::COLLECTION.table());
        let body: Option<String> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        body.map(|b| serde_json::from_str(&b).map_err(DbError::from))
            .transpose()
    }

    pub(super) async fn delete(
        conn: &mut SqliteConnection,
        collection: Collection,
        id: &str,
        not_newer_than: Option<i64>,
    ) -> DbResult<bool> {
        let result = match not_newer_than {
            Some(version) => {
                let sql = format!(
                    "DELETE FROM {} WHERE id = ?1 AND version <= ?2",
                    collection.table()
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(version)
                    .execute(&mut *conn)
                    .await?
            }
            None => {
                let sql = format!("DELETE FROM {} WHERE id = ?1", collection.table());
                sqlx::query(&sql).bind(id).execute(&mut *conn).await?
            }
        };

        let deleted = result.rows_affected() > 0;
        debug!(collection = %collection, id = %id, deleted, "Record delete");
        Ok(deleted)
    }

    pub(super) async fn range_by_index<R: Record>(
        conn: &mut SqliteConnection,
        index: Index,
        lower: Option<&IndexValue>,
        upper: Option<&IndexValue>,
    ) -> DbResult<Vec<R>> {
        if index.collection() != R::COLLECTION {
            return Err(DbError::QueryFailed(format!(
                "index {} does not belong to {}",
                index.name(),
                R::COLLECTION
            )));
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT body FROM {} WHERE 1 = 1", R::COLLECTION.table()));

        if let Some(value) = lower {
            qb.push(format!(" AND {} >= ", index.expr()));
            push_value(&mut qb, value);
        }
        if let Some(value) = upper {
            qb.push(format!(" AND {} <= ", index.expr()));
            push_value(&mut qb, value);
        }
        qb.push(format!(" ORDER BY {}, id", index.expr()));

        let bodies: Vec<String> = qb
            .build_query_scalar()
            .fetch_all(&mut *conn)
            .await?;
        decode_all(bodies)
    }

    fn push_value(qb: &mut QueryBuilder<Sqlite>, value: &IndexValue) {
        match value {
            IndexValue::Text(v) => qb.push_bind(v.clone()),
            IndexValue::Integer(v) => qb.push_bind(*v),
            IndexValue::Bool(v) => qb.push_bind(i64::from(*v)),
        };
    }

    fn decode_all<R: Record>(bodies: Vec<String>) -> DbResult<Vec<R>> {
        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(DbError::from))
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
