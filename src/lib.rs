//! # dagmem - DAG document store
//!
//! Accepts DAG documents (named sets of nodes and edges with metadata),
//! assigns each a fresh identifier and writes it to two independent stores.
//!
//! dagmem provides:
//! - A typed document model with a single canonical JSON form
//! - SQLite-backed storage of every submission
//! - A JSON export tree with one atomically written file per submission
//! - A dual-write persister that rolls the row back when the export fails
//! - An HTTP server exposing `POST /save_dag`

pub mod document;
pub mod storage;
pub mod export;
pub mod persist;
pub mod server;
pub mod config;
pub mod stats;

// Re-exports for convenient access
pub use document::{DagEdge, DagMetadata, DagNode, DagObject, ParseError, PersistedDag, ValidationError};
pub use export::{ExportDir, ExportStore};
pub use persist::{PersistError, Persister};
pub use storage::{RecordStore, SqliteStore};

/// Result type alias for dagmem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dagmem operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] storage::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
