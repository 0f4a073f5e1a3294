//! Hierarchical record store
//!
//! Metadata documents hold lists of named records ("list of models", "list
//! of columns within a model"). `NamedList` gives an order-preserving,
//! name-indexed view over such a list, recursively applied to nested lists
//! of records, with conversion back to the original list form and a
//! safe-merge primitive for partial updates.

use serde_yaml::{Mapping, Sequence, Value};

/// Default index field for record lists.
pub const DEFAULT_KEY_FIELD: &str = "name";

/// Index field used by version lists (`versions: [{v: 1}, {v: 2}]`).
pub const VERSION_KEY_FIELD: &str = "v";

/// Canonical field emission order for flattened records. Present fields are
/// emitted in this order; anything else follows in insertion order.
const CANONICAL_ORDER: &[&str] = &[
    "name",
    "description",
    "latest_version",
    "access",
    "group",
    "config",
    "meta",
    "tests",
    "columns",
    "versions",
];

/// A single field value: either an opaque YAML scalar/collection, or a
/// nested record list that was recognized and indexed.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Scalar(Value),
    Nested(NamedList),
}

/// One record: an insertion-ordered set of fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Field)>,
}

impl Record {
    pub fn from_mapping(mapping: &Mapping) -> Self {
        let mut fields = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let Some(key) = key.as_str() else { continue };
            let field = match value {
                Value::Sequence(seq) => match index_field_for(seq) {
                    Some(key_field) => Field::Nested(NamedList::from_sequence(seq, key_field)),
                    None => Field::Scalar(value.clone()),
                },
                other => Field::Scalar(other.clone()),
            };
            fields.push((key.to_string(), field));
        }
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Field> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, f)| f)
    }

    pub fn set(&mut self, key: impl Into<String>, field: Field) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(existing) => *existing = field,
            None => self.fields.push((key, field)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Field> {
        let index = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge a partial-update payload into this record.
    ///
    /// Mappings and nested record lists merge recursively, sibling keys
    /// untouched. A `null` payload value deletes the key when present
    /// (tombstone) and is a no-op otherwise. Everything else overwrites.
    pub fn safe_merge(&mut self, patch: &Record) {
        for (key, patch_field) in &patch.fields {
            match patch_field {
                Field::Scalar(Value::Null) => {
                    self.remove(key);
                }
                Field::Nested(patch_list) => match self.get_mut(key) {
                    Some(Field::Nested(existing)) => existing.merge(patch_list),
                    _ => {
                        // Merging into an absent target defaults to empty.
                        let mut empty = NamedList::new(&patch_list.key_field);
                        empty.merge(patch_list);
                        self.set(key.clone(), Field::Nested(empty));
                    }
                },
                Field::Scalar(Value::Mapping(patch_map)) => match self.get_mut(key) {
                    Some(Field::Scalar(Value::Mapping(existing))) => {
                        merge_mapping(existing, patch_map);
                    }
                    _ => {
                        let mut merged = Mapping::new();
                        merge_mapping(&mut merged, patch_map);
                        self.set(key.clone(), Field::Scalar(Value::Mapping(merged)));
                    }
                },
                Field::Scalar(value) => {
                    self.set(key.clone(), Field::Scalar(value.clone()));
                }
            }
        }
    }

    /// Flatten back to a mapping, canonical fields first.
    pub fn to_mapping(&self) -> Mapping {
        let mut mapping = Mapping::new();
        for key in CANONICAL_ORDER {
            if let Some(field) = self.get(key) {
                mapping.insert(Value::from(*key), field_to_value(field));
            }
        }
        for (key, field) in &self.fields {
            if CANONICAL_ORDER.contains(&key.as_str()) {
                continue;
            }
            mapping.insert(Value::from(key.as_str()), field_to_value(field));
        }
        mapping
    }
}

/// Order-preserving, name-indexed view over a list of records.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedList {
    key_field: String,
    entries: Vec<(String, Record)>,
}

impl NamedList {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            entries: Vec::new(),
        }
    }

    /// Build from a YAML sequence of mappings. Elements without the index
    /// field are dropped; duplicate keys silently keep the last occurrence.
    pub fn from_sequence(sequence: &Sequence, key_field: &str) -> Self {
        let mut list = Self::new(key_field);
        for element in sequence {
            let record = match element {
                Value::Mapping(mapping) => Record::from_mapping(mapping),
                // Shorthand scalar entries (`versions: [1, 2]`) are lifted
                // into records keyed by the scalar itself.
                Value::Number(_) | Value::String(_) => {
                    let mut mapping = Mapping::new();
                    mapping.insert(Value::from(key_field), element.clone());
                    Record::from_mapping(&mapping)
                }
                _ => continue,
            };
            let Some(key) = record.get(key_field).and_then(scalar_key) else {
                continue;
            };
            if list.contains(&key) {
                tracing::debug!(key = %key, "duplicate entry in record list, keeping the last");
            }
            list.insert(key, record);
        }
        list
    }

    /// Build from an optional sequence, treating absence as empty.
    pub fn build(sequence: Option<&Sequence>, key_field: &str) -> Self {
        match sequence {
            Some(seq) => Self::from_sequence(seq, key_field),
            None => Self::new(key_field),
        }
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, r)| r)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Record> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, r)| r)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace the record under `key` (last one wins).
    pub fn insert(&mut self, key: impl Into<String>, record: Record) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(existing) => *existing = record,
            None => self.entries.push((key, record)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Record> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }

    /// Safe-merge a partial record into the entry under `key`, creating the
    /// entry when absent.
    pub fn merge_entry(&mut self, key: impl Into<String>, patch: &Record) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(existing) => existing.safe_merge(patch),
            None => {
                let mut fresh = Record::default();
                fresh.safe_merge(patch);
                self.entries.push((key, fresh));
            }
        }
    }

    /// Per-entry merge of a whole patch list.
    pub fn merge(&mut self, patch: &NamedList) {
        for (key, record) in &patch.entries {
            self.merge_entry(key.clone(), record);
        }
    }

    /// Convert back to the original list representation, recursively
    /// flattening nested lists.
    pub fn flatten(&self) -> Sequence {
        self.entries
            .iter()
            .map(|(_, record)| Value::Mapping(record.to_mapping()))
            .collect()
    }
}

/// Decide whether a sequence is a record list and which field indexes it.
///
/// Every element must be a mapping carrying the field: `name` takes
/// precedence, `v` covers version lists.
fn index_field_for(sequence: &Sequence) -> Option<&'static str> {
    if sequence.is_empty() {
        return None;
    }
    let mappings: Vec<&Mapping> = sequence
        .iter()
        .filter_map(|element| element.as_mapping())
        .collect();
    if mappings.len() != sequence.len() {
        return None;
    }
    for candidate in [DEFAULT_KEY_FIELD, VERSION_KEY_FIELD] {
        if mappings
            .iter()
            .all(|mapping| mapping.contains_key(&Value::from(candidate)))
        {
            return Some(candidate);
        }
    }
    None
}

fn field_to_value(field: &Field) -> Value {
    match field {
        Field::Scalar(value) => value.clone(),
        Field::Nested(list) => Value::Sequence(list.flatten()),
    }
}

/// String form of an index-field value (version numbers index as "1", "2").
fn scalar_key(field: &Field) -> Option<String> {
    match field {
        Field::Scalar(Value::String(s)) => Some(s.clone()),
        Field::Scalar(Value::Number(n)) => Some(n.to_string()),
        Field::Scalar(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// Recursive mapping merge with the same tombstone semantics as records.
fn merge_mapping(existing: &mut Mapping, patch: &Mapping) {
    for (key, patch_value) in patch {
        match patch_value {
            Value::Null => {
                existing.remove(key);
            }
            Value::Mapping(patch_map) => match existing.get_mut(key) {
                Some(Value::Mapping(existing_map)) => merge_mapping(existing_map, patch_map),
                _ => {
                    let mut merged = Mapping::new();
                    merge_mapping(&mut merged, patch_map);
                    existing.insert(key.clone(), Value::Mapping(merged));
                }
            },
            other => {
                existing.insert(key.clone(), other.clone());
            }
        }
    }
}
