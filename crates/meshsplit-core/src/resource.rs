//! The mesh resource model
//!
//! Resources are immutable inputs to the planner, produced by the registry
//! from an already-compiled manifest. The planner never mutates a resource;
//! it only emits changes referencing one by identifier.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::change::EntityKind;

/// Unique identifier within the whole mesh (manifest `unique_id`).
pub type ResourceId = String;

/// Resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
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
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Analysis => "analysis",
            Self::Test => "test",
            Self::Snapshot => "snapshot",
            Self::Seed => "seed",
            Self::Macro => "macro",
            Self::Group => "group",
            Self::Source => "source",
            Self::Exposure => "exposure",
            Self::Metric => "metric",
            Self::SemanticModel => "semantic_model",
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        EntityKind::from(*self)
    }

    /// Kinds that own a code file which relocates with the resource.
    pub fn has_code_file(&self) -> bool {
        matches!(
            self,
            Self::Model | Self::Test | Self::Snapshot | Self::Seed | Self::Analysis
        )
    }

    /// Kinds that can meaningfully carry a public access level. Used as the
    /// default predicate when cleaning a graph for boundary computation.
    pub fn can_be_public(&self) -> bool {
        !matches!(self, Self::Test | Self::Exposure)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host code language of a resource's code file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelLanguage {
    Sql,
    Python,
}

impl ModelLanguage {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Python => "py",
        }
    }
}

/// Governance access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Private,
    Protected,
    Public,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Protected => "protected",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, identifiable unit of work in the mesh.
///
/// Paths are stored relative to the owning project root; the registry
/// resolves them to absolute paths when planning changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub unique_id: ResourceId,
    pub name: String,
    pub resource_type: ResourceType,
    pub package_name: String,

    /// Relative path to the code file (SQL/Python/YAML definition).
    pub original_file_path: PathBuf,

    /// Relative path to the metadata document carrying this resource's
    /// entry, when one exists.
    pub patch_path: Option<PathBuf>,

    pub language: Option<ModelLanguage>,

    /// Upstream resource identifiers this resource depends on.
    pub depends_on: Vec<ResourceId>,

    pub group: Option<String>,
    pub access: Option<Access>,

    /// Version lineage, when the resource is versioned. Entries mirror the
    /// metadata document (`{v: 1}` mappings or shorthand scalars).
    pub latest_version: Option<Value>,
    pub versions: Vec<Value>,

    /// Materialized relation name, when computed.
    pub relation_name: Option<String>,

    /// For source-table resources: the enclosing source name.
    pub source_name: Option<String>,

    /// For tests: whether this is a generic (schema) test that travels with
    /// its parent's metadata entry.
    pub is_generic_test: bool,

    /// Raw resource configuration from the manifest.
    pub config: Mapping,
}

impl Resource {
    pub fn new(
        unique_id: impl Into<ResourceId>,
        name: impl Into<String>,
        resource_type: ResourceType,
        package_name: impl Into<String>,
        original_file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            name: name.into(),
            resource_type,
            package_name: package_name.into(),
            original_file_path: original_file_path.into(),
            patch_path: None,
            language: None,
            depends_on: Vec::new(),
            group: None,
            access: None,
            latest_version: None,
            versions: Vec::new(),
            relation_name: None,
            source_name: None,
            is_generic_test: false,
            config: Mapping::new(),
        }
    }

    /// Relative path of the metadata document for this resource: the
    /// explicit patch path, or the conventional `_<kind>.yml` fallback
    /// beside the code file.
    pub fn patch_document_path(&self) -> PathBuf {
        if let Some(patch) = &self.patch_path {
            return patch.clone();
        }
        let file_name = format!("_{}.yml", self.resource_type.entity_kind().pluralized());
        match self.original_file_path.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// File extension of the code file (falls back on the language).
    pub fn file_extension(&self) -> String {
        self.original_file_path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| {
                self.language
                    .map(|lang| lang.extension().to_string())
                    .unwrap_or_else(|| "sql".to_string())
            })
    }

    pub fn is_versioned(&self) -> bool {
        !self.versions.is_empty()
    }
}

/// One column from the warehouse catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Catalog entry for a resource: the physically observed columns, in
/// warehouse order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub columns: Vec<CatalogColumn>,
}

impl CatalogEntry {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Join a project root with a resource-relative path.
pub fn absolute_path(project_root: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        project_root.join(relative)
    }
}
