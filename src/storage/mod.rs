//! Storage Layer - relational side of the dual write
//!
//! System of record is SQLite with a single table:
//! - dags(dag_id, name, metadata, nodes, edges, created_at)
//!
//! The persister talks to it through [`RecordStore`] so tests can swap in
//! failing stores.

pub mod schema;
pub mod sqlite;

use std::sync::Arc;

pub use sqlite::{DagRow, SqliteStore};

/// A row about to be inserted into the `dags` table.
#[derive(Debug, Clone, Copy)]
pub struct DagRecord<'a> {
    pub dag_id: &'a str,
    pub name: &'a str,
    pub metadata: &'a str,
    pub nodes: &'a str,
    pub edges: &'a str,
    pub created_at: &'a str,
}

/// Errors raised by a [`RecordStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    DuplicateKey(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

/// Relational target of the dual write.
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Must fail with [`StoreError::DuplicateKey`]
    /// instead of replacing an existing row.
    fn insert(&self, record: &DagRecord<'_>) -> Result<(), StoreError>;

    /// Remove a record by id. Returns whether a row was deleted.
    fn delete(&self, dag_id: &str) -> Result<bool, StoreError>;
}

impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    fn insert(&self, record: &DagRecord<'_>) -> Result<(), StoreError> {
        (**self).insert(record)
    }

    fn delete(&self, dag_id: &str) -> Result<bool, StoreError> {
        (**self).delete(dag_id)
    }
}
