//! SQLite storage implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};
use serde::Serialize;

use super::{DagRecord, RecordStore, StoreError, schema};
use crate::Result;

/// How long a writer waits on a locked database file before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed storage for persisted DAGs
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// A stored row, as read back from the `dags` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DagRow {
    pub dag_id: String,
    pub name: String,
    pub metadata: String,
    pub nodes: String,
    pub edges: String,
    pub created_at: String,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an existing database without creating or migrating it
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(())
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Get a DAG row by id
    pub fn get_dag(&self, dag_id: &str) -> std::result::Result<Option<DagRow>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT dag_id, name, metadata, nodes, edges, created_at FROM dags WHERE dag_id = ?1",
                [dag_id],
                |row| {
                    Ok(DagRow {
                        dag_id: row.get(0)?,
                        name: row.get(1)?,
                        metadata: row.get(2)?,
                        nodes: row.get(3)?,
                        edges: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Count all stored DAGs
    pub fn count_dags(&self) -> std::result::Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM dags", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, record: &DagRecord<'_>) -> std::result::Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            r#"
            INSERT INTO dags (dag_id, name, metadata, nodes, edges, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.dag_id,
                record.name,
                record.metadata,
                record.nodes,
                record.edges,
                record.created_at,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::DuplicateKey(record.dag_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        tx.commit()?;
        Ok(())
    }

    fn delete(&self, dag_id: &str) -> std::result::Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM dags WHERE dag_id = ?1", [dag_id])?;
        Ok(deleted > 0)
    }
}
