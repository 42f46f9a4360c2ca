//! JSON export tree - file side of the dual write
//!
//! Every persisted DAG lands in `<export_dir>/<dag_id>.json`. Files are
//! written to a hidden temp file in the same directory and renamed into
//! place, so a reader never sees a partially written export.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::Result;

/// File-side target of the dual write.
pub trait ExportStore: Send + Sync {
    /// Write the export for `dag_id`, returning the final path.
    ///
    /// Must not overwrite an existing export and must not leave a file
    /// behind when it fails.
    fn write(&self, dag_id: &str, contents: &[u8]) -> io::Result<PathBuf>;
}

/// Export directory on the local filesystem
#[derive(Debug, Clone)]
pub struct ExportDir {
    root: PathBuf,
}

impl ExportDir {
    /// Open the export directory, creating it if it does not exist.
    ///
    /// Called once at startup. A path that exists but is not a directory is
    /// rejected here rather than on the first write.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("export path is not a directory: {}", root.display()),
            )
            .into());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of the export for `dag_id`
    pub fn path_for(&self, dag_id: &str) -> PathBuf {
        self.root.join(format!("{dag_id}.json"))
    }

    fn temp_path_for(&self, dag_id: &str) -> PathBuf {
        self.root.join(format!(".{dag_id}.json.tmp"))
    }

    /// Count finished exports (temp files excluded)
    pub fn count_exports(&self) -> io::Result<usize> {
        count_exports_in(&self.root)
    }

    fn write_temp(&self, temp_path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(temp_path)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()
    }

    /// Write `contents` to `temp_path`, rename it onto `path` and sync the
    /// directory entry. Nothing is left at either path on failure.
    fn write_via_temp(&self, temp_path: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
        let written = self
            .write_temp(temp_path, contents)
            .and_then(|()| fs::rename(temp_path, path));

        if let Err(err) = written {
            remove_quietly(temp_path);
            return Err(err);
        }

        if let Err(err) = self.sync_root() {
            remove_quietly(path);
            return Err(err);
        }
        Ok(())
    }

    /// Flush the rename itself to disk
    #[cfg(unix)]
    fn sync_root(&self) -> io::Result<()> {
        fs::File::open(&self.root)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_root(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Count `<dag_id>.json` files under `root` without creating anything.
/// A missing directory counts as empty.
pub fn count_exports_in(root: &Path) -> io::Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_hidden = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with('.'));
        if !is_hidden && path.extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove partial export {}: {}", path.display(), err);
        }
    }
}

impl ExportStore for ExportDir {
    fn write(&self, dag_id: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(dag_id);
        if path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("export already exists: {}", path.display()),
            ));
        }

        self.write_via_temp(&self.temp_path_for(dag_id), &path, contents)?;

        tracing::debug!("Wrote export {} ({} bytes)", path.display(), contents.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("dags");

        let export = ExportDir::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(export.root(), root.as_path());
    }

    #[test]
    fn test_open_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dags");
        fs::write(&file, "not a dir").unwrap();

        assert!(ExportDir::open(&file).is_err());
    }

    #[test]
    fn test_write_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let export = ExportDir::open(dir.path()).unwrap();

        let path = export.write("abc", b"{}").unwrap();
        assert_eq!(path, dir.path().join("abc.json"));
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        assert!(!dir.path().join(".abc.json.tmp").exists());
        assert_eq!(export.count_exports().unwrap(), 1);
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let export = ExportDir::open(dir.path()).unwrap();

        export.write("abc", b"first").unwrap();
        let err = export.write("abc", b"second").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(export.path_for("abc")).unwrap(), b"first");
    }

    #[test]
    fn test_write_into_removed_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dags");
        let export = ExportDir::open(&root).unwrap();
        fs::remove_dir(&root).unwrap();

        assert!(export.write("abc", b"{}").is_err());
        assert!(!root.exists());
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let export = ExportDir::open(dir.path()).unwrap();

        // a non-empty directory at the target makes the rename fail after
        // the temp file has been written
        let target = dir.path().join("blocked.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();
        let temp = export.temp_path_for("blocked");

        assert!(export.write_via_temp(&temp, &target, b"{}").is_err());
        assert!(!temp.exists());
        assert!(target.join("keep").exists());
        assert_eq!(export.count_exports().unwrap(), 0);
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let export = ExportDir::open(dir.path()).unwrap();

        export.write("a", b"1").unwrap();
        export.write("b", b"2").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_root_needs_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dags");
        let export = ExportDir::open(&root).unwrap();
        export.sync_root().unwrap();

        fs::remove_dir(&root).unwrap();
        assert!(export.sync_root().is_err());
    }
}
