//! dbt manifest.json and catalog.json parsing
//!
//! Parses the subset of the compiled artifacts the planner needs: nodes,
//! sources, macros, groups, and the downstream metadata (catalog columns,
//! versions, groups, access levels).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// dbt manifest.json structure (subset of fields we care about).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: ManifestMetadata,

    /// Model, test, snapshot, seed, and analysis nodes.
    pub nodes: HashMap<String, ManifestNode>,

    /// Source table definitions.
    #[serde(default)]
    pub sources: HashMap<String, ManifestSource>,

    #[serde(default)]
    pub macros: HashMap<String, ManifestMacro>,

    #[serde(default)]
    pub groups: HashMap<String, ManifestGroup>,

    #[serde(default)]
    pub exposures: HashMap<String, ManifestExposure>,

    #[serde(default)]
    pub metrics: HashMap<String, ManifestMetric>,

    #[serde(default)]
    pub semantic_models: HashMap<String, ManifestSemanticModel>,

    #[serde(default)]
    pub parent_map: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub child_map: HashMap<String, Vec<String>>,
}

impl Manifest {
    /// Load manifest from file.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::Io(path.display().to_string(), e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse manifest from JSON string.
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    pub fn project_name(&self) -> &str {
        &self.metadata.project_name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub dbt_schema_version: String,
    #[serde(default)]
    pub dbt_version: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub generated_at: String,
}

/// A node in the manifest (model, test, snapshot, seed, analysis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub unique_id: String,
    pub name: String,
    pub resource_type: String,
    pub package_name: String,

    /// Original file path relative to the project root.
    pub original_file_path: String,

    /// Metadata document carrying this node's entry, when one exists.
    /// Formatted as `project://relative/path.yml`.
    #[serde(default)]
    pub patch_path: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub group: Option<String>,

    #[serde(default)]
    pub access: Option<String>,

    /// Version of this node, when the model is versioned.
    #[serde(default)]
    pub version: Option<serde_json::Value>,

    #[serde(default)]
    pub latest_version: Option<serde_json::Value>,

    #[serde(default)]
    pub relation_name: Option<String>,

    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub depends_on: DependsOn,

    /// Present on generic (schema) tests only.
    #[serde(default)]
    pub test_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub macros: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    pub unique_id: String,
    pub source_name: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub patch_path: Option<String>,
    #[serde(default)]
    pub relation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMacro {
    pub unique_id: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub patch_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestGroup {
    pub unique_id: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub patch_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestExposure {
    pub unique_id: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub depends_on: DependsOn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetric {
    pub unique_id: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub depends_on: DependsOn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSemanticModel {
    pub unique_id: String,
    pub name: String,
    pub package_name: String,
    pub original_file_path: String,
    #[serde(default)]
    pub depends_on: DependsOn,
}

/// dbt catalog.json structure (subset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub nodes: HashMap<String, CatalogTable>,
    #[serde(default)]
    pub sources: HashMap<String, CatalogTable>,
}

impl Catalog {
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::Io(path.display().to_string(), e.to_string()))?;
        Self::parse(&contents)
    }

    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogTable {
    #[serde(default)]
    pub columns: HashMap<String, CatalogTableColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    /// 1-based position within the relation; catalog column maps are
    /// unordered, the index restores warehouse order.
    #[serde(default)]
    pub index: u32,
}

/// Artifact parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read artifact {0}: {1}")]
    Io(String, String),

    #[error("failed to parse artifact JSON: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_manifest() {
        let json = r#"{
            "metadata": {"project_name": "monolith", "dbt_version": "1.7.0"},
            "nodes": {
                "model.monolith.users": {
                    "unique_id": "model.monolith.users",
                    "name": "users",
                    "resource_type": "model",
                    "package_name": "monolith",
                    "original_file_path": "models/users.sql",
                    "patch_path": "monolith://models/_models.yml",
                    "language": "sql",
                    "depends_on": {"nodes": ["source.monolith.raw.users"]}
                }
            },
            "sources": {
                "source.monolith.raw.users": {
                    "unique_id": "source.monolith.raw.users",
                    "source_name": "raw",
                    "name": "users",
                    "package_name": "monolith",
                    "original_file_path": "models/_sources.yml",
                    "relation_name": "\"db\".\"raw\".\"users\""
                }
            }
        }"#;

        let manifest = Manifest::parse(json).unwrap();
        assert_eq!(manifest.project_name(), "monolith");

        let users = &manifest.nodes["model.monolith.users"];
        assert_eq!(users.resource_type, "model");
        assert_eq!(users.depends_on.nodes.len(), 1);

        let source = &manifest.sources["source.monolith.raw.users"];
        assert_eq!(source.source_name, "raw");
    }

    #[test]
    fn parse_catalog_columns() {
        let json = r#"{
            "nodes": {
                "model.monolith.users": {
                    "columns": {
                        "ID": {"name": "ID", "type": "INTEGER", "index": 1},
                        "EMAIL": {"name": "EMAIL", "type": "TEXT", "index": 2}
                    }
                }
            }
        }"#;

        let catalog = Catalog::parse(json).unwrap();
        let table = &catalog.nodes["model.monolith.users"];
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns["ID"].column_type, "INTEGER");
    }
}
