//! Dual-write persister
//!
//! Assigns an identifier to a submission and commits it to the relational
//! store and the export directory as one caller-visible operation:
//!
//! 1. insert the row (its own short transaction)
//! 2. write `<dag_id>.json`
//! 3. if the file write fails, delete the row again before reporting
//!
//! There is no shared transaction manager across the two stores, so the
//! rollback is a compensating delete. A crash between steps 1 and 3 can
//! still leave an orphan row.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::document::{CanonicalDag, DagObject, PersistedDag};
use crate::export::ExportStore;
use crate::storage::{DagRecord, RecordStore, StoreError};

/// Failure of a persist call, or of opening the stores at startup.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Generated identifier already exists in the store. Retrying generates
    /// a fresh one.
    #[error("dag id already exists: {0}")]
    DuplicateId(String),

    /// Relational write failed; nothing was written anywhere.
    #[error("failed to write DAG record: {0}")]
    StoreWriteFailed(String),

    /// Export write failed after the row was inserted. `rolled_back` tells
    /// whether the row was removed again.
    #[error("failed to write DAG export: {message}")]
    ExportWriteFailed { message: String, rolled_back: bool },

    /// Store or export directory unusable at startup.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl PersistError {
    /// Stable machine-readable name, used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            PersistError::DuplicateId(_) => "duplicate_id",
            PersistError::StoreWriteFailed(_) => "store_write_failed",
            PersistError::ExportWriteFailed { .. } => "export_write_failed",
            PersistError::ConfigurationError(_) => "configuration_error",
        }
    }
}

type IdGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Writes each submission to both stores under one fresh identifier.
pub struct Persister {
    records: Box<dyn RecordStore>,
    exports: Box<dyn ExportStore>,
    generate_id: IdGenerator,
}

/// Random v4 UUID, rendered hyphenated
pub fn new_dag_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time as RFC 3339 with microseconds
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Persister {
    pub fn new(records: impl RecordStore + 'static, exports: impl ExportStore + 'static) -> Self {
        Self {
            records: Box::new(records),
            exports: Box::new(exports),
            generate_id: Box::new(new_dag_id),
        }
    }

    /// Replace the identifier source (tests use this to force collisions)
    pub fn with_id_generator(mut self, generate_id: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.generate_id = Box::new(generate_id);
        self
    }

    /// Persist a document to both stores and return its new `dag_id`.
    ///
    /// The id is returned only when both writes succeeded.
    pub fn persist(&self, document: &DagObject) -> Result<String, PersistError> {
        let dag_id = (self.generate_id)();
        let persisted = PersistedDag::new(dag_id.clone(), document, now_timestamp);

        let canonical = CanonicalDag::build(&persisted)
            .map_err(|e| PersistError::StoreWriteFailed(format!("failed to serialize document: {e}")))?;

        let record = DagRecord {
            dag_id: &persisted.dag_id,
            name: &persisted.name,
            metadata: canonical.metadata_json(),
            nodes: canonical.nodes_json(),
            edges: canonical.edges_json(),
            created_at: &persisted.created_at,
        };

        if let Err(err) = self.records.insert(&record) {
            tracing::error!("Record write failed for {}: {}", dag_id, err);
            return Err(match err {
                StoreError::DuplicateKey(id) => PersistError::DuplicateId(id),
                other => PersistError::StoreWriteFailed(other.to_string()),
            });
        }

        match self.exports.write(&dag_id, canonical.document()) {
            Ok(path) => {
                tracing::info!("Saved DAG '{}' as {} ({})", persisted.name, dag_id, path.display());
                Ok(dag_id)
            }
            Err(err) => {
                tracing::error!("Export write failed for {}: {}", dag_id, err);
                let rolled_back = self.roll_back(&dag_id);
                Err(PersistError::ExportWriteFailed {
                    message: err.to_string(),
                    rolled_back,
                })
            }
        }
    }

    fn roll_back(&self, dag_id: &str) -> bool {
        match self.records.delete(dag_id) {
            Ok(true) => {
                tracing::warn!("Rolled back record {}", dag_id);
                true
            }
            Ok(false) => {
                tracing::error!("Rollback found no record for {}", dag_id);
                false
            }
            Err(err) => {
                tracing::error!("Rollback of record {} failed, row is orphaned: {}", dag_id, err);
                false
            }
        }
    }
}
