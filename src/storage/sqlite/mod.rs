//! SQLite implementations of storage interfaces.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::storage::schema::ALL_TABLES;
use crate::storage::{Result, StoreError};

mod audit_store;
mod intake_store;
mod staff_store;
#[cfg(test)]
mod tests;

pub use audit_store::SqliteAuditStore;
pub use intake_store::SqliteIntakeStore;
pub use staff_store::SqliteStaffStore;

/// Open the connection pool described by `config`.
///
/// In-memory databases live and die with their connection, so the pool is
/// pinned to a single connection that is never recycled.
pub async fn connect(config: &StorageConfig) -> Result<SqlitePool> {
    let mut opts = SqliteConnectOptions::new()
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
        .foreign_keys(true);

    let mut pool_opts =
        SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

    if config.is_memory() {
        opts = opts.filename(":memory:");
        pool_opts = pool_opts
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        if let Some(parent) = std::path::Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        opts = opts
            .filename(&config.path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        pool_opts = pool_opts.max_connections(config.max_connections.max(1));
    }

    info!(path = %config.path, "opening sqlite database");
    let pool = pool_opts.connect_with(opts).await?;
    Ok(pool)
}

/// Create all tables and indexes if they do not exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in ALL_TABLES {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

/// Open a write transaction on a pooled connection.
///
/// IMMEDIATE takes the write lock upfront so concurrent writers queue on
/// the busy timeout instead of deadlocking while upgrading a read lock.
/// Dropping the transaction without committing rolls it back, so a
/// cancelled request never returns a connection mid-transaction.
pub(crate) async fn begin_immediate(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Current time at storage precision.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

/// Fixed-width RFC 3339 so lexical order equals time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp(value.to_string()))
}

pub(crate) fn get_uuid(row: &SqliteRow, column: &'static str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Ok(Uuid::parse_str(&raw)?)
}

pub(crate) fn get_opt_uuid(row: &SqliteRow, column: &'static str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.as_deref().map(Uuid::parse_str).transpose()?)
}

pub(crate) fn get_timestamp(row: &SqliteRow, column: &'static str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_timestamp(&raw)
}

pub(crate) fn get_opt_timestamp(
    row: &SqliteRow,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn get_opt_date(row: &SqliteRow, column: &'static str) -> Result<Option<NaiveDate>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map_err(|_| StoreError::Corrupt { column, value })
    })
    .transpose()
}

/// Decode a JSON TEXT column.
pub(crate) fn get_json<T: DeserializeOwned>(row: &SqliteRow, column: &'static str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn get_opt_json<T: DeserializeOwned>(
    row: &SqliteRow,
    column: &'static str,
) -> Result<Option<T>> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.as_deref().map(serde_json::from_str).transpose()?)
}

/// Decode a closed-set TEXT column with the type's own parser.
pub(crate) fn get_enum<T>(
    row: &SqliteRow,
    column: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<T> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or(StoreError::Corrupt { column, value: raw })
}

/// Escape character for [`contains_pattern`].
pub(crate) const LIKE_ESCAPE: char = '!';

/// Case-folded copy of `value` for the `*_lc` search columns.
///
/// SQLite's `LOWER()` only folds ASCII, so search text is folded here and
/// stored next to the original.
pub(crate) fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Folded `LIKE` pattern matching `term` anywhere, with wildcards in
/// `term` escaped by [`LIKE_ESCAPE`].
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in fold_case(term).chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Read a `COUNT(*)` style result.
pub(crate) fn get_count(row: &SqliteRow, index: usize) -> Result<u64> {
    let n: i64 = row.try_get(index)?;
    Ok(n.max(0) as u64)
}
