//! Connection bootstrap and schema upgrades for the document store.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections ready for document traffic.
//! - Upgrade the `documents` schema step by step.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`.
//! - Pending steps commit together or not at all.
//! - A returned connection always has a `documents` table with the
//!   `collection`, `id` and `data` columns the store reads and writes.

use crate::store::{StoreError, StoreResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const REQUIRED_COLUMNS: [&str; 3] = ["collection", "id", "data"];

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "documents",
        sql: include_str!("0001_documents.sql"),
    },
    SchemaStep {
        version: 2,
        name: "owner_index",
        sql: include_str!("0002_owner_index.sql"),
    },
];

/// Schema version written by the newest step this build knows.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Opens a database file, upgrading its schema when needed.
pub fn open_db(path: impl AsRef<Path>) -> StoreResult<Connection> {
    open_with("file", || Connection::open(path))
}

pub fn open_db_in_memory() -> StoreResult<Connection> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with(
    mode: &'static str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> StoreResult<Connection> {
    let started_at = Instant::now();
    let result = connect().map_err(StoreError::from).and_then(|mut conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let applied = upgrade(&mut conn)?;
        Ok((conn, applied))
    });

    match result {
        Ok((conn, applied)) => {
            info!(
                "event=store_open module=store status=ok mode={mode} steps_applied={applied} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=store_open module=store status=error mode={mode} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

/// Applies every pending step and checks the resulting table shape.
///
/// Returns how many steps ran.
pub fn upgrade(conn: &mut Connection) -> StoreResult<usize> {
    let current: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();
    if current > latest {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    let pending: Vec<&SchemaStep> = STEPS.iter().filter(|step| step.version > current).collect();
    if !pending.is_empty() {
        let tx = conn.transaction()?;
        for step in &pending {
            tx.execute_batch(step.sql)?;
            tx.pragma_update(None, "user_version", step.version)?;
            info!(
                "event=schema_step module=store status=ok version={} step={}",
                step.version, step.name
            );
        }
        tx.commit()?;
    }

    ensure_documents_table(conn)?;
    Ok(pending.len())
}

fn ensure_documents_table(conn: &Connection) -> StoreResult<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('documents');")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !columns.iter().any(|column| column == required))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(StoreError::SchemaMismatch(format!(
        "documents table is missing columns: {}",
        missing.join(", ")
    )))
}
