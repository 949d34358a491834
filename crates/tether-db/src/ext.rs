use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{ErrorCode, Row, ffi};
use tether_types::{Error, Result};
use tracing::error;
use uuid::Uuid;

/// Fixed-width so that lexical order in SQLite equals chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Current time at the precision the store keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_ts(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw, idx)
}

pub(crate) fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn get_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// UNIQUE or PRIMARY KEY collision. CHECK, NOT NULL and trigger aborts do not count.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
    )
}

/// Largest id list bound into a single `IN (...)` clause. Longer lists are
/// queried in chunks of this size.
pub(crate) const MAX_BOUND_IDS: usize = 500;

/// `?1, ?2, ...` for an `IN (...)` clause of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps raw store failures into the domain error, logging the detail.
pub(crate) trait StoreResultExt<T> {
    fn persist(self) -> Result<T>;
}

impl<T> StoreResultExt<T> for rusqlite::Result<T> {
    fn persist(self) -> Result<T> {
        self.map_err(|e| {
            error!("Store error: {}", e);
            Error::Persistence(e.to_string())
        })
    }
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).persist(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn pairs_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE pairs (
                 lo TEXT NOT NULL,
                 hi TEXT NOT NULL,
                 UNIQUE (lo, hi),
                 CHECK (lo < hi)
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn only_uniqueness_counts_as_a_collision() {
        let conn = pairs_table();
        conn.execute("INSERT INTO pairs VALUES ('a', 'b')", []).unwrap();

        let duplicate = conn.execute("INSERT INTO pairs VALUES ('a', 'b')", []).unwrap_err();
        assert!(is_unique_violation(&duplicate));

        let unordered = conn.execute("INSERT INTO pairs VALUES ('z', 'a')", []).unwrap_err();
        assert!(!is_unique_violation(&unordered));
    }

    #[test]
    fn timestamps_sort_lexically() {
        let earlier = now();
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(format_ts(earlier) < format_ts(later));
        assert_eq!(parse_ts(&format_ts(earlier), 0).unwrap(), earlier);
    }
}
