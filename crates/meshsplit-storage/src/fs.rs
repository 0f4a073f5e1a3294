//! File store
//!
//! Raw file operations with separate read and write roots, so a plan can
//! read from one project tree and materialize into another without
//! aliasing. Absolute paths are used as-is; relative paths resolve against
//! the configured roots.

use std::path::{Path, PathBuf};

/// Storage-level errors, surfaced to the processor with the failing path.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source file {path} does not exist")]
    MissingSource { path: PathBuf },

    #[error("invalid yaml at {path}: {reason}")]
    Yaml { path: PathBuf, reason: String },

    #[error("unexpected document shape at {path}: {reason}")]
    UnexpectedShape { path: PathBuf, reason: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// File store with distinct read and write roots.
#[derive(Debug, Clone)]
pub struct FileStore {
    read_root: PathBuf,
    write_root: PathBuf,
}

impl FileStore {
    pub fn new(read_root: impl Into<PathBuf>, write_root: impl Into<PathBuf>) -> Self {
        Self {
            read_root: read_root.into(),
            write_root: write_root.into(),
        }
    }

    /// Both roots at the same location.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::new(root.clone(), root)
    }

    pub fn read_root(&self) -> &Path {
        &self.read_root
    }

    pub fn write_root(&self) -> &Path {
        &self.write_root
    }

    fn resolve_read(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.read_root.join(path)
        }
    }

    fn resolve_write(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.write_root.join(path)
        }
    }

    /// Read a file, returning `None` when it does not exist.
    pub fn read(&self, path: &Path) -> Result<Option<String>, StoreError> {
        let resolved = self.resolve_read(path);
        match std::fs::read_to_string(&resolved) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(resolved, e)),
        }
    }

    /// Write a file, creating parent directories as needed.
    pub fn write(&self, path: &Path, contents: &str) -> Result<(), StoreError> {
        let resolved = self.resolve_write(path);
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        std::fs::write(&resolved, contents).map_err(|e| StoreError::io(resolved, e))
    }

    /// Copy a file; the source must exist.
    pub fn copy(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        let source = self.resolve_read(from);
        if !source.exists() {
            return Err(StoreError::MissingSource { path: source });
        }
        let target = self.resolve_write(to);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        std::fs::copy(&source, &target).map_err(|e| StoreError::io(target, e))?;
        Ok(())
    }

    /// Move a file across roots. Copy-then-delete, which also works when the
    /// roots sit on different file systems.
    pub fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        self.copy(from, to)?;
        let source = self.resolve_read(from);
        std::fs::remove_file(&source).map_err(|e| StoreError::io(source, e))
    }

    pub fn delete(&self, path: &Path) -> Result<(), StoreError> {
        let resolved = self.resolve_write(path);
        if !resolved.exists() {
            return Err(StoreError::MissingSource { path: resolved });
        }
        std::fs::remove_file(&resolved).map_err(|e| StoreError::io(resolved, e))
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.resolve_read(path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::rooted(dir.path());

        store
            .write(Path::new("models/staging/users.sql"), "select 1")
            .unwrap();
        let read = store.read(Path::new("models/staging/users.sql")).unwrap();
        assert_eq!(read.as_deref(), Some("select 1"));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::rooted(dir.path());
        assert!(store.read(Path::new("absent.yml")).unwrap().is_none());
    }

    #[test]
    fn rename_moves_across_roots() {
        let read_dir = tempfile::tempdir().unwrap();
        let write_dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(read_dir.path(), write_dir.path());

        store
            .write(Path::new("users.sql"), "select 1")
            .unwrap();
        // The write landed under the write root; move it back under a name
        // resolved against the read root to exercise both roots.
        let absolute_source = write_dir.path().join("users.sql");
        store
            .rename(&absolute_source, Path::new("moved/users.sql"))
            .unwrap();

        assert!(!absolute_source.exists());
        assert!(write_dir.path().join("moved/users.sql").exists());
    }

    #[test]
    fn copy_requires_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::rooted(dir.path());
        let err = store.copy(Path::new("absent.sql"), Path::new("copy.sql"));
        assert!(matches!(err, Err(StoreError::MissingSource { .. })));
    }
}
