use crate::schema::{MIG_0001_INIT, SCHEMA_VERSION};
use riskscan_core::StoreError;
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// SQLite-backed job and result store.
///
/// One connection behind a mutex: every statement or transaction runs while
/// holding the lock, so each write is atomic to concurrent job tasks.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(backend)?;
        apply_pragmas(&conn, true).map_err(backend)?;
        migrate(&conn)?;
        debug!(path = %path.display(), "opened results database");
        Ok(Db { conn: Mutex::new(conn) })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        apply_pragmas(&conn, false).map_err(backend)?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn apply_pragmas(conn: &Connection, on_disk: bool) -> rusqlite::Result<()> {
    if on_disk {
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.pragma_update(None, "synchronous", &"NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", &"ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).map_err(backend)?;
    if version == 0 {
        conn.execute_batch(MIG_0001_INIT).map_err(backend)?;
    } else if version > SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!(
            "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
        )));
    }
    Ok(())
}
