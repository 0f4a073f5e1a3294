//! Structured document store
//!
//! YAML documents read and written through the file store. Documents are
//! expected to be mappings at the top level; anything else is a structural
//! error carrying the offending path.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::fs::{FileStore, StoreError};

impl FileStore {
    /// Read a YAML document, returning `None` when the file is absent.
    pub fn read_document(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let Some(contents) = self.read(path)? else {
            return Ok(None);
        };
        if contents.trim().is_empty() {
            return Ok(Some(Value::Mapping(Mapping::new())));
        }
        serde_yaml::from_str(&contents).map(Some).map_err(|e| StoreError::Yaml {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read a YAML document and require a mapping at the top level. Absent
    /// files read as an empty mapping.
    pub fn read_mapping(&self, path: &Path) -> Result<Mapping, StoreError> {
        match self.read_document(path)? {
            None => Ok(Mapping::new()),
            Some(Value::Mapping(mapping)) => Ok(mapping),
            Some(_) => Err(StoreError::UnexpectedShape {
                path: path.to_path_buf(),
                reason: "expected a mapping at the top level".to_string(),
            }),
        }
    }

    /// Serialize a document back to its path, creating parent directories.
    pub fn write_document(&self, path: &Path, document: &Value) -> Result<(), StoreError> {
        let contents = serde_yaml::to_string(document).map_err(|e| StoreError::Yaml {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.write(path, &contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mapping_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::rooted(dir.path());
        let path = Path::new("models/_models.yml");

        let doc: Value = serde_yaml::from_str("models: [{name: users}]").unwrap();
        store.write_document(path, &doc).unwrap();

        let read = store.read_mapping(path).unwrap();
        assert_eq!(Value::Mapping(read), doc);
    }

    #[test]
    fn absent_document_is_an_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::rooted(dir.path());
        assert!(store.read_mapping(Path::new("absent.yml")).unwrap().is_empty());
    }

    #[test]
    fn non_mapping_document_is_a_shape_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::rooted(dir.path());
        let path = Path::new("list.yml");
        store.write(path, "- just\n- a\n- list\n").unwrap();

        let err = store.read_mapping(path);
        assert!(matches!(err, Err(StoreError::UnexpectedShape { .. })));
    }
}
