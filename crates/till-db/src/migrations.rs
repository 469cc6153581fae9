//! # Schema Migrations
//!
//! Versioned, embedded schema upgrades for the local store.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  LocalStore::open(config { schema_version: N })                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PRAGMA user_version  → persisted P                                    │
//! │       │                                                                 │
//! │       ├── N < P ? → DbError::VersionConflict (nothing touched)         │
//! │       ├── N = P ? → nothing to do                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │    0001_catalog.sql   (if P < 1 <= N)                                  │
//! │    0002_ledger.sql    (if P < 2 <= N)                                  │
//! │    PRAGMA user_version = N                                             │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create `migrations/NNNN_description.sql` with the next number
//! 2. Use `IF NOT EXISTS` everywhere; never drop or rewrite data
//! 3. Append it to [`MIGRATIONS`] and bump [`LATEST_VERSION`]
//! 4. **NEVER** modify existing migrations

use sqlx::{Executor, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// One schema upgrade step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Every known upgrade step, in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "catalog collection",
        sql: include_str!("../migrations/0001_catalog.sql"),
    },
    Migration {
        version: 2,
        description: "ledger collection",
        sql: include_str!("../migrations/0002_ledger.sql"),
    },
];

/// Newest schema version this build knows how to create.
pub const LATEST_VERSION: i64 = 2;

/// Reads the persisted schema version.
pub async fn current_version(conn: &mut SqliteConnection) -> DbResult<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(conn)
        .await?;
    Ok(version)
}

/// Brings the schema up to `target`.
///
/// Idempotent: running it again at the same target does nothing, and each
/// step only creates what is missing.
pub async fn run_migrations(pool: &SqlitePool, target: i64) -> DbResult<()> {
    if target < 0 || target > LATEST_VERSION {
        return Err(DbError::MigrationFailed(format!(
            "unknown schema version {} (latest is {})",
            target, LATEST_VERSION
        )));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))?;

    let persisted = current_version(&mut tx).await?;

    if target < persisted {
        return Err(DbError::VersionConflict {
            persisted,
            requested: target,
        });
    }

    if target == persisted {
        debug!(version = persisted, "Schema up to date");
        return Ok(());
    }

    info!(from = persisted, to = target, "Upgrading schema");

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > persisted && m.version <= target)
    {
        debug!(
            version = migration.version,
            description = migration.description,
            "Applying migration"
        );
        (&mut *tx).execute(migration.sql).await.map_err(|e| {
            DbError::MigrationFailed(format!("version {}: {}", migration.version, e))
        })?;
    }

    // PRAGMA does not take bind parameters
    (&mut *tx)
        .execute(format!("PRAGMA user_version = {}", target).as_str())
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))?;

    info!(version = target, "Schema upgraded");
    Ok(())
}
