//! Per-entity editors
//!
//! The processor dispatches each change to one of two editors: the raw file
//! editor for code files, and the resource file editor for named entries
//! inside structured metadata documents. Editors are the only writers of
//! project state.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use meshsplit_core::change::{FileChange, Operation, ResourceChange};
use meshsplit_core::record::{Field, NamedList, Record, DEFAULT_KEY_FIELD};

use crate::fs::{FileStore, StoreError};

/// Editor for whole-file operations.
pub struct RawFileEditor<'a> {
    store: &'a FileStore,
}

impl<'a> RawFileEditor<'a> {
    pub fn new(store: &'a FileStore) -> Self {
        Self { store }
    }

    pub fn apply(&self, change: &FileChange) -> Result<(), StoreError> {
        match change.operation {
            Operation::Add => self.add(change),
            Operation::Update => self.update(change),
            Operation::Remove => self.remove(change),
            Operation::Copy => self.copy(change),
            Operation::Move => self.rename(change),
        }
    }

    pub fn add(&self, change: &FileChange) -> Result<(), StoreError> {
        self.store
            .write(&change.path, change.data.as_deref().unwrap_or_default())
    }

    pub fn update(&self, change: &FileChange) -> Result<(), StoreError> {
        if self.store.read(&change.path)?.is_none() {
            return Err(StoreError::MissingSource {
                path: change.path.clone(),
            });
        }
        self.store
            .write(&change.path, change.data.as_deref().unwrap_or_default())
    }

    pub fn remove(&self, change: &FileChange) -> Result<(), StoreError> {
        self.store.delete(&change.path)
    }

    pub fn copy(&self, change: &FileChange) -> Result<(), StoreError> {
        let source = required_source(change)?;
        self.store.copy(source, &change.path)
    }

    pub fn rename(&self, change: &FileChange) -> Result<(), StoreError> {
        let source = required_source(change)?;
        self.store.rename(source, &change.path)
    }
}

fn required_source(change: &FileChange) -> Result<&Path, StoreError> {
    change
        .source
        .as_deref()
        .ok_or_else(|| StoreError::UnexpectedShape {
            path: change.path.clone(),
            reason: format!("{} change without a source path", change.operation),
        })
}

/// Editor for named entries inside structured metadata documents.
///
/// Add and Update are both read-merge-write: the payload safe-merges into
/// the existing entry (or a fresh one), so hand-authored sibling fields
/// survive partial updates. Remove deletes the entry, dropping the
/// top-level key when it empties; the file itself is never deleted here.
pub struct ResourceFileEditor<'a> {
    store: &'a FileStore,
}

impl<'a> ResourceFileEditor<'a> {
    pub fn new(store: &'a FileStore) -> Self {
        Self { store }
    }

    pub fn apply(&self, change: &ResourceChange) -> Result<(), StoreError> {
        match change.operation {
            Operation::Add | Operation::Update => self.upsert(change),
            Operation::Remove => self.remove(change),
            // Constructors reject Copy/Move for metadata entries.
            Operation::Copy | Operation::Move => Err(StoreError::UnexpectedShape {
                path: change.path.clone(),
                reason: format!("{} is not valid for metadata entries", change.operation),
            }),
        }
    }

    fn upsert(&self, change: &ResourceChange) -> Result<(), StoreError> {
        let mut document = self.store.read_mapping(&change.path)?;
        let key = change.entity.pluralized();
        let mut list = NamedList::build(
            document.get(key).and_then(Value::as_sequence),
            DEFAULT_KEY_FIELD,
        );

        let patch = Record::from_mapping(&change.data);
        match &change.parent {
            Some(parent) => merge_nested_entry(&mut list, parent, &change.identifier, &patch),
            None => list.merge_entry(change.identifier.clone(), &patch),
        }

        document.insert(Value::from(key), Value::Sequence(list.flatten()));
        self.store
            .write_document(&change.path, &Value::Mapping(document))
    }

    fn remove(&self, change: &ResourceChange) -> Result<(), StoreError> {
        if self.store.read(&change.path)?.is_none() {
            return Err(StoreError::MissingSource {
                path: change.path.clone(),
            });
        }
        let mut document = self.store.read_mapping(&change.path)?;
        let key = change.entity.pluralized();
        let mut list = NamedList::build(
            document.get(key).and_then(Value::as_sequence),
            DEFAULT_KEY_FIELD,
        );

        match &change.parent {
            Some(parent) => remove_nested_entry(&mut list, parent, &change.identifier),
            None => {
                list.remove(&change.identifier);
            }
        }

        if list.is_empty() {
            document.remove(&Value::from(key));
        } else {
            document.insert(Value::from(key), Value::Sequence(list.flatten()));
        }
        // An emptied document stays on disk as an empty mapping; deleting
        // the file is an explicit change, never a side effect.
        self.store
            .write_document(&change.path, &Value::Mapping(document))
    }
}

/// Merge a nested entry (a table inside a source) under its parent,
/// creating the parent and its `tables` list when absent.
fn merge_nested_entry(list: &mut NamedList, parent: &str, identifier: &str, patch: &Record) {
    if !list.contains(parent) {
        let mut mapping = Mapping::new();
        mapping.insert(Value::from(DEFAULT_KEY_FIELD), Value::from(parent));
        list.insert(parent.to_string(), Record::from_mapping(&mapping));
    }
    if let Some(entry) = list.get_mut(parent) {
        match entry.get_mut("tables") {
            Some(Field::Nested(tables)) => tables.merge_entry(identifier.to_string(), patch),
            _ => {
                let mut tables = NamedList::new(DEFAULT_KEY_FIELD);
                tables.merge_entry(identifier.to_string(), patch);
                entry.set("tables", Field::Nested(tables));
            }
        }
    }
}

/// Remove a nested entry; a parent left with nothing but its name is
/// removed with it.
fn remove_nested_entry(list: &mut NamedList, parent: &str, identifier: &str) {
    let Some(entry) = list.get_mut(parent) else {
        return;
    };
    if let Some(Field::Nested(tables)) = entry.get_mut("tables") {
        tables.remove(identifier);
        if tables.is_empty() {
            entry.remove("tables");
        }
    }
    let bare_parent =
        entry.to_mapping().len() <= 1 && entry.get(DEFAULT_KEY_FIELD).is_some();
    if bare_parent {
        list.remove(parent);
    }
}
