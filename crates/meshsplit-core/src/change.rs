//! The change vocabulary
//!
//! Every edit the planner wants to make is described by a `Change`: either a
//! partial update to a named entry inside a structured metadata document, or
//! a whole-file operation. Changes are value objects; they are created once,
//! collected into an ordered `ChangeSet`, and consumed by the processor.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::error::PlanError;
use crate::resource::ResourceType;

/// Atomic operation over a file or a metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Update,
    Remove,
    Copy,
    Move,
}

impl Operation {
    /// Preposition used in the human-readable description.
    pub fn preposition(&self) -> &'static str {
        match self {
            Self::Add | Self::Move | Self::Copy => "to",
            Self::Update => "in",
            Self::Remove => "from",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "Add",
            Self::Update => "Update",
            Self::Remove => "Remove",
            Self::Copy => "Copy",
            Self::Move => "Move",
        };
        write!(f, "{s}")
    }
}

/// What kind of entity a change targets: a resource kind for metadata
/// entries, or `Code` / `Project` for whole files and project declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Model,
    Analysis,
    Test,
    Snapshot,
    Seed,
    Macro,
    Group,
    Source,
    Exposure,
    Metric,
    SemanticModel,
    Code,
    Project,
}

impl EntityKind {
    /// Pluralized form, used both in descriptions and as the top-level key
    /// of metadata documents. Standard English rules, except analyses.
    pub fn pluralized(&self) -> &'static str {
        match self {
            Self::Model => "models",
            Self::Analysis => "analyses",
            Self::Test => "tests",
            Self::Snapshot => "snapshots",
            Self::Seed => "seeds",
            Self::Macro => "macros",
            Self::Group => "groups",
            Self::Source => "sources",
            Self::Exposure => "exposures",
            Self::Metric => "metrics",
            Self::SemanticModel => "semantic_models",
            Self::Code => "code",
            Self::Project => "projects",
        }
    }
}

impl From<ResourceType> for EntityKind {
    fn from(value: ResourceType) -> Self {
        match value {
            ResourceType::Model => Self::Model,
            ResourceType::Analysis => Self::Analysis,
            ResourceType::Test => Self::Test,
            ResourceType::Snapshot => Self::Snapshot,
            ResourceType::Seed => Self::Seed,
            ResourceType::Macro => Self::Macro,
            ResourceType::Group => Self::Group,
            ResourceType::Source => Self::Source,
            ResourceType::Exposure => Self::Exposure,
            ResourceType::Metric => Self::Metric,
            ResourceType::SemanticModel => Self::SemanticModel,
        }
    }
}

/// A partial update to a named entry inside a structured metadata document.
///
/// `data` carries only the fields being added or changed; merging into the
/// existing entry happens at apply time through the record store, so
/// hand-authored sibling fields survive. `parent` names the enclosing entry
/// when the target is nested (a table inside a source).
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChange {
    pub operation: Operation,
    pub entity: EntityKind,
    pub identifier: String,
    pub path: PathBuf,
    pub data: Mapping,
    pub parent: Option<String>,
}

impl ResourceChange {
    pub fn new(
        operation: Operation,
        entity: EntityKind,
        identifier: impl Into<String>,
        path: impl Into<PathBuf>,
        data: Mapping,
        parent: Option<String>,
    ) -> Result<Self, PlanError> {
        let path = path.into();
        require_absolute(&path)?;
        if matches!(operation, Operation::Copy | Operation::Move) {
            return Err(PlanError::configuration(format!(
                "operation {operation} is not valid for metadata entries"
            )));
        }
        if operation == Operation::Remove && !data.is_empty() {
            return Err(PlanError::configuration(format!(
                "{operation} takes no payload, got {} field(s)",
                data.len()
            )));
        }
        Ok(Self {
            operation,
            entity,
            identifier: identifier.into(),
            path,
            data,
            parent,
        })
    }
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} `{}` {} {}",
            self.operation,
            self.entity.pluralized(),
            self.identifier,
            self.operation.preposition(),
            self.path.display()
        )
    }
}

/// A whole-file operation. `data` is the literal new content (Add/Update);
/// `source` is the originating path (Copy/Move only).
#[derive(Debug, Clone, PartialEq)]
pub struct FileChange {
    pub operation: Operation,
    pub identifier: String,
    pub path: PathBuf,
    pub data: Option<String>,
    pub source: Option<PathBuf>,
}

impl FileChange {
    pub fn new(
        operation: Operation,
        identifier: impl Into<String>,
        path: impl Into<PathBuf>,
        data: Option<String>,
        source: Option<PathBuf>,
    ) -> Result<Self, PlanError> {
        let path = path.into();
        require_absolute(&path)?;
        match operation {
            Operation::Copy | Operation::Move => {
                let src = source.as_deref().ok_or_else(|| {
                    PlanError::configuration(format!("{operation} requires a source path"))
                })?;
                require_absolute(src)?;
            }
            _ if source.is_some() => {
                return Err(PlanError::configuration(format!(
                    "{operation} does not take a source path"
                )));
            }
            _ => {}
        }
        Ok(Self {
            operation,
            identifier: identifier.into(),
            path,
            data,
            source,
        })
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} `{}` {} {}",
            self.operation,
            EntityKind::Code.pluralized(),
            self.identifier,
            self.operation.preposition(),
            self.path.display()
        )
    }
}

/// Either shape of atomic edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Resource(ResourceChange),
    File(FileChange),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(c) => c.fmt(f),
            Self::File(c) => c.fmt(f),
        }
    }
}

impl From<ResourceChange> for Change {
    fn from(value: ResourceChange) -> Self {
        Self::Resource(value)
    }
}

impl From<FileChange> for Change {
    fn from(value: FileChange) -> Self {
        Self::File(value)
    }
}

/// Ordered, insertion-order-preserving collection of changes.
///
/// No deduplication: conflicting changes to the same target are legal and
/// applied in order, so the last write wins at apply time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: impl Into<Change>) {
        self.changes.push(change.into());
    }

    pub fn extend(&mut self, changes: impl IntoIterator<Item = Change>) {
        self.changes.extend(changes);
    }

    pub fn append(&mut self, other: ChangeSet) {
        self.changes.extend(other.changes);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Change> {
        self.changes.get(index)
    }

    pub fn set(&mut self, index: usize, change: impl Into<Change>) {
        self.changes[index] = change.into();
    }

    pub fn remove(&mut self, index: usize) -> Change {
        self.changes.remove(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl std::ops::Index<usize> for ChangeSet {
    type Output = Change;

    fn index(&self, index: usize) -> &Self::Output {
        &self.changes[index]
    }
}

fn require_absolute(path: &Path) -> Result<(), PlanError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(PlanError::configuration(format!(
            "change target must be an absolute path, got `{}`",
            path.display()
        )))
    }
}
