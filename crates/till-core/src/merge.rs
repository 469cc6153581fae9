//! # Last-Writer-Wins Resolution
//!
//! Decides which of two versions of the same record survives when the
//! terminal and the remote store disagree.
//!
//! ```text
//!   local.updated_at      remote.updated_at      result
//!   ───────────────       ─────────────────      ──────────
//!   (absent)              t                      TakeRemote
//!   t1                    t2 >  t1               TakeRemote
//!   t1                    t2 == t1               TakeRemote   (ties favor remote)
//!   t1                    t2 <  t1               KeepLocal
//! ```
//!
//! The comparison is per record. A field edited locally is lost when the
//! remote copy carries a newer timestamp.

use chrono::{DateTime, Utc};

/// A record that carries an id and a version timestamp.
pub trait Versioned {
    fn record_id(&self) -> &str;
    fn version(&self) -> DateTime<Utc>;
}

/// Outcome of comparing a local and a remote version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    TakeRemote,
}

/// Resolves a local version against an incoming remote version.
pub fn resolve(local: Option<DateTime<Utc>>, remote: DateTime<Utc>) -> Resolution {
    match local {
        Some(local) if local > remote => Resolution::KeepLocal,
        _ => Resolution::TakeRemote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, PartialEq)]
    struct Doc(&'static str, i64);

    impl Versioned for Doc {
        fn record_id(&self) -> &str {
            self.0
        }
        fn version(&self) -> DateTime<Utc> {
            Utc.timestamp_millis_opt(self.1).unwrap()
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    /// Folds one more version in the way the store's conditional write does.
    fn pick<'a, T: Versioned>(local: &'a T, remote: &'a T) -> &'a T {
        match resolve(Some(local.version()), remote.version()) {
            Resolution::KeepLocal => local,
            Resolution::TakeRemote => remote,
        }
    }

    #[test]
    fn test_resolve_table() {
        assert_eq!(resolve(None, at(5)), Resolution::TakeRemote);
        assert_eq!(resolve(Some(at(4)), at(5)), Resolution::TakeRemote);
        assert_eq!(resolve(Some(at(5)), at(5)), Resolution::TakeRemote);
        assert_eq!(resolve(Some(at(6)), at(5)), Resolution::KeepLocal);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let versions = [Doc("p1", 30), Doc("p1", 10), Doc("p1", 20)];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let mut winner = &versions[order[0]];
            for &i in &order[1..] {
                winner = pick(winner, &versions[i]);
            }
            assert_eq!(winner, &Doc("p1", 30), "order {:?}", order);
        }
    }
}
