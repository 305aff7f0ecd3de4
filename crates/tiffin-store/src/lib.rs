#![forbid(unsafe_code)]
//! SQLite persistence for the tiffin marketplace.
//!
//! One connection behind an async mutex. Every money movement and every
//! contended state change happens inside a single transaction or a single
//! conditional UPDATE, so handler code never has to re-check invariants.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::fmt::{Display, Formatter};
use std::path::Path;
use tokio::sync::Mutex;

mod deliveries;
mod menu;
mod orders;
mod payments;
mod referrals;
mod reviews;
mod schema;
mod subscriptions;
mod users;

pub use deliveries::ClaimOutcome;
pub use orders::OrderOwner;
pub use payments::{CheckoutPurpose, CheckoutSession, DebitOutcome};
pub use reviews::InsertReviewOutcome;
pub use users::InsertUserOutcome;

pub const CRATE_NAME: &str = "tiffin-store";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self(format!("document column corrupt: {e}"))
    }
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError(e.to_string()))?;
        schema::apply_pragmas(&conn)?;
        schema::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| StoreError(e.to_string()))?;
        schema::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Readiness probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Timestamps are stored RFC3339 with fixed microsecond width so the TEXT
/// column sorts chronologically. Callers building keyset positions from a
/// row's timestamp must go through this to match the stored text.
#[must_use]
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError(format!("timestamp column corrupt: {e}")))
}

/// Keyset position: strictly after (older than) this (created_at, id) pair
/// when paging newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAfter {
    pub created_at: String,
    pub id: String,
}

/// One page of rows plus whether more remain past it.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Callers query limit+1 rows; the extra row only signals continuation.
    pub(crate) fn from_overfetched(mut items: Vec<T>, limit: usize) -> Self {
        let has_more = items.len() > limit;
        items.truncate(limit);
        Self { items, has_more }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_round_trip_and_sort_lexicographically() {
        let early = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
        let a = fmt_ts(early);
        let b = fmt_ts(late);
        assert!(a < b);
        assert_eq!(parse_ts(&a).unwrap(), early);
    }

    #[test]
    fn page_overfetch_detects_continuation() {
        let page = Page::from_overfetched(vec![1, 2, 3], 2);
        assert_eq!(page.items, vec![1, 2]);
        assert!(page.has_more);
        let page = Page::from_overfetched(vec![1, 2], 2);
        assert!(!page.has_more);
    }
}
