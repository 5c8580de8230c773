//! SQLite entity store.
//!
//! Connections are configured for a small multi-process store:
//! - `journal_mode = WAL` so readers never wait on the writer
//! - `busy_timeout = 5s` before a contended write reports `SQLITE_BUSY`
//! - `foreign_keys = ON` so articles cannot outlive their reading list

pub mod migrations;
pub mod query;
pub(crate) mod rows;
pub mod schema;
pub mod stats;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::{path::Path, time::Duration};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store database, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails, or
/// if the file was written by a newer schema than this binary knows.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    prepare_schema(&mut conn)?;

    tracing::info!(path = %path.display(), "opened store");
    Ok(conn)
}

/// Open a private in-memory store with the full schema. Used by tests and
/// dry runs.
///
/// # Errors
///
/// Returns an error if migrating the in-memory database fails.
pub fn open_store_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    prepare_schema(&mut conn)?;
    Ok(conn)
}

fn prepare_schema(conn: &mut Connection) -> Result<()> {
    let found = migrations::current_schema_version(conn).context("read schema version")?;
    if found > migrations::LATEST_SCHEMA_VERSION {
        bail!(
            "store schema v{found} is newer than supported v{}; upgrade trellis",
            migrations::LATEST_SCHEMA_VERSION
        );
    }
    migrations::migrate(conn).context("apply store migrations")?;
    Ok(())
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Start a write transaction that takes the database write lock up front,
/// so the reads inside it cannot be invalidated by another writer.
pub(crate) fn begin_write(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, open_store, open_store_in_memory};
    use crate::db::migrations;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(".trellis").join("trellis.sqlite3");
        (dir, path)
    }

    #[test]
    fn open_store_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path).expect("open store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn open_store_runs_migrations() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path).expect("open store");

        let version = migrations::current_schema_version(&conn).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn open_store_refuses_newer_schema() {
        let (_dir, path) = temp_db_path();
        {
            let conn = open_store(&path).expect("open store");
            conn.pragma_update(None, "user_version", 99_i64)
                .expect("bump user_version");
        }
        let err = open_store(&path).expect_err("newer schema must be refused");
        assert!(err.to_string().contains("newer"));
    }

    #[test]
    fn in_memory_store_is_migrated() {
        let conn = open_store_in_memory().expect("open in-memory store");
        let version = migrations::current_schema_version(&conn).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }
}
