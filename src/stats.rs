//! Read-only summary of both stores, for `dagmem stats`

use crate::config::Settings;
use crate::export::count_exports_in;
use crate::storage::SqliteStore;
use crate::Result;

/// Row and file counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub rows: usize,
    pub exports: usize,
}

impl StoreStats {
    /// Both stores hold the same number of DAGs
    pub fn is_consistent(&self) -> bool {
        self.rows == self.exports
    }
}

/// Count rows and exports without creating the database or the export
/// directory. A store that does not exist yet counts as empty.
pub fn collect(settings: &Settings) -> Result<StoreStats> {
    let rows = if settings.database.is_file() {
        SqliteStore::open_read_only(&settings.database)?.count_dags()?
    } else {
        0
    };
    let exports = count_exports_in(&settings.export_dir)?;
    Ok(StoreStats { rows, exports })
}
