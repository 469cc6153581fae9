//! # Backups
//!
//! Point-in-time JSON snapshots of the local store, uploaded as blobs.
//!
//! ```text
//!   Full   → backups/full_backup_2024-06-15T12-00-00-000Z.json
//!            { "catalog": [...], "ledger": [...], "createdAt": ..., "userId": ... }
//!
//!   Sales  → backups/sales_backup_2024-06-15T12-00-00-000Z.json
//!            { "sales": [...], "createdAt": ..., "userId": ... }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use till_core::{Item, Sale};
use till_db::LocalStore;

use crate::error::SyncResult;

/// What a backup contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// Catalog and ledger.
    Full,
    /// Ledger only.
    Sales,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Sales => "sales",
        }
    }
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backup that reached the blob store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub kind: BackupKind,
    pub path: String,
    pub url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Items plus sales written.
    pub records: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FullSnapshot<'a> {
    catalog: &'a [Item],
    ledger: &'a [Sale],
    created_at: String,
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SalesSnapshot<'a> {
    sales: &'a [Sale],
    created_at: String,
    user_id: &'a str,
}

/// Blob path for a backup taken at `at`.
///
/// `:` and `.` in the timestamp become `-` so the name is safe everywhere.
pub fn backup_path(kind: BackupKind, at: DateTime<Utc>) -> String {
    let stamp = iso_timestamp(at).replace([':', '.'], "-");
    format!("backups/{}_backup_{}.json", kind, stamp)
}

fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A serialized snapshot, ready to upload.
#[derive(Debug)]
pub struct Snapshot {
    pub path: String,
    pub contents: Vec<u8>,
    pub records: usize,
}

/// Reads the store and serializes the snapshot for `kind`.
///
/// Catalog and ledger are read in one transaction, so a checkout never
/// lands between them.
pub async fn build_snapshot(
    store: &LocalStore,
    kind: BackupKind,
    user_id: &str,
    at: DateTime<Utc>,
) -> SyncResult<Snapshot> {
    let mut tx = store.begin().await?;
    let mut sales: Vec<Sale> = tx.get_all().await?;
    let catalog: Vec<Item> = match kind {
        BackupKind::Full => tx.get_all().await?,
        BackupKind::Sales => Vec::new(),
    };
    tx.rollback().await?;

    sales.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    let created_at = iso_timestamp(at);

    let (contents, records) = match kind {
        BackupKind::Full => {
            let snapshot = FullSnapshot {
                catalog: &catalog,
                ledger: &sales,
                created_at,
                user_id,
            };
            (serde_json::to_vec_pretty(&snapshot)?, catalog.len() + sales.len())
        }
        BackupKind::Sales => {
            let snapshot = SalesSnapshot {
                sales: &sales,
                created_at,
                user_id,
            };
            (serde_json::to_vec_pretty(&snapshot)?, sales.len())
        }
    };

    Ok(Snapshot {
        path: backup_path(kind, at),
        contents,
        records,
    })
}
