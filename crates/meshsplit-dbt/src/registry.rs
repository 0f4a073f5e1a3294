//! Resource registry
//!
//! Immutable lookup of resources and catalog entries by identifier, built
//! from the compiled artifacts. The registry also owns path resolution:
//! resources carry project-relative paths, the registry anchors them to the
//! project root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use meshsplit_core::{
    resource::absolute_path, CatalogColumn, CatalogEntry, ModelLanguage, PlanError, Resource,
    ResourceId, ResourceType,
};

use crate::manifest::{Catalog, DependsOn, Manifest};

/// Registry of all resources in one project, keyed by unique id.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    project_name: String,
    project_root: PathBuf,
    resources: HashMap<ResourceId, Resource>,
    catalog: HashMap<ResourceId, CatalogEntry>,
}

impl ResourceRegistry {
    pub fn new(project_name: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_name: project_name.into(),
            project_root: project_root.into(),
            resources: HashMap::new(),
            catalog: HashMap::new(),
        }
    }

    /// Build a registry from compiled artifacts.
    pub fn from_artifacts(
        manifest: &Manifest,
        catalog: Option<&Catalog>,
        project_root: &Path,
    ) -> Self {
        let mut registry = Self::new(manifest.project_name(), project_root);

        let versions_by_name = collect_versions(manifest);

        for node in manifest.nodes.values() {
            let Some(resource_type) = parse_resource_type(&node.resource_type) else {
                tracing::warn!(
                    unique_id = %node.unique_id,
                    resource_type = %node.resource_type,
                    "skipping node with unknown resource type"
                );
                continue;
            };
            let mut resource = Resource::new(
                &node.unique_id,
                &node.name,
                resource_type,
                &node.package_name,
                &node.original_file_path,
            );
            resource.patch_path = node.patch_path.as_deref().map(strip_patch_prefix);
            resource.language = node.language.as_deref().and_then(parse_language);
            resource.depends_on = node.depends_on.nodes.clone();
            resource.group = node.group.clone();
            resource.access = node.access.as_deref().and_then(parse_access);
            resource.latest_version = node.latest_version.as_ref().map(json_to_yaml);
            resource.relation_name = node.relation_name.clone();
            resource.is_generic_test =
                resource_type == ResourceType::Test && node.test_metadata.is_some();
            resource.config = json_map_to_yaml(&node.config);
            if resource.latest_version.is_some() {
                resource.versions = versions_by_name
                    .get(&node.name)
                    .cloned()
                    .unwrap_or_default();
            }
            registry.insert(resource);
        }

        for source in manifest.sources.values() {
            let mut resource = Resource::new(
                &source.unique_id,
                &source.name,
                ResourceType::Source,
                &source.package_name,
                &source.original_file_path,
            );
            resource.patch_path = source.patch_path.as_deref().map(strip_patch_prefix);
            resource.source_name = Some(source.source_name.clone());
            resource.relation_name = source.relation_name.clone();
            registry.insert(resource);
        }

        for mac in manifest.macros.values() {
            let mut resource = Resource::new(
                &mac.unique_id,
                &mac.name,
                ResourceType::Macro,
                &mac.package_name,
                &mac.original_file_path,
            );
            resource.patch_path = mac.patch_path.as_deref().map(strip_patch_prefix);
            registry.insert(resource);
        }

        for group in manifest.groups.values() {
            let mut resource = Resource::new(
                &group.unique_id,
                &group.name,
                ResourceType::Group,
                &group.package_name,
                &group.original_file_path,
            );
            resource.patch_path = group.patch_path.as_deref().map(strip_patch_prefix);
            registry.insert(resource);
        }

        for (unique_id, name, package, path, deps, resource_type) in metadata_only(manifest) {
            let mut resource = Resource::new(unique_id, name, resource_type, package, path);
            resource.depends_on = deps.nodes.clone();
            registry.insert(resource);
        }

        if let Some(catalog) = catalog {
            for (unique_id, table) in catalog.nodes.iter().chain(catalog.sources.iter()) {
                let mut columns: Vec<_> = table.columns.values().collect();
                columns.sort_by_key(|column| column.index);
                registry.catalog.insert(
                    unique_id.clone(),
                    CatalogEntry {
                        columns: columns
                            .into_iter()
                            .map(|column| CatalogColumn {
                                name: column.name.clone(),
                                column_type: column.column_type.clone(),
                            })
                            .collect(),
                    },
                );
            }
        }

        registry
    }

    pub fn insert(&mut self, resource: Resource) {
        self.resources.insert(resource.unique_id.clone(), resource);
    }

    pub fn insert_catalog(&mut self, unique_id: impl Into<ResourceId>, entry: CatalogEntry) {
        self.catalog.insert(unique_id.into(), entry);
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn get(&self, unique_id: &str) -> Result<&Resource, PlanError> {
        self.resources
            .get(unique_id)
            .ok_or_else(|| PlanError::MissingResource {
                unique_id: unique_id.to_string(),
            })
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.resources.contains_key(unique_id)
    }

    pub fn catalog_for(&self, unique_id: &str) -> Option<&CatalogEntry> {
        self.catalog.get(unique_id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.resources.keys()
    }

    pub fn of_type(&self, resource_type: ResourceType) -> impl Iterator<Item = &Resource> {
        self.resources
            .values()
            .filter(move |r| r.resource_type == resource_type)
    }

    pub fn resource_type_of(&self, unique_id: &str) -> Option<ResourceType> {
        self.resources.get(unique_id).map(|r| r.resource_type)
    }

    /// Absolute path of a resource's code file.
    pub fn code_path(&self, resource: &Resource) -> PathBuf {
        absolute_path(&self.project_root, &resource.original_file_path)
    }

    /// Absolute path of a resource's metadata document (explicit patch path
    /// or the conventional fallback).
    pub fn patch_path(&self, resource: &Resource) -> PathBuf {
        absolute_path(&self.project_root, &resource.patch_document_path())
    }
}

fn parse_resource_type(value: &str) -> Option<ResourceType> {
    match value {
        "model" => Some(ResourceType::Model),
        "analysis" => Some(ResourceType::Analysis),
        "test" => Some(ResourceType::Test),
        "snapshot" => Some(ResourceType::Snapshot),
        "seed" => Some(ResourceType::Seed),
        "macro" => Some(ResourceType::Macro),
        "group" => Some(ResourceType::Group),
        "source" => Some(ResourceType::Source),
        "exposure" => Some(ResourceType::Exposure),
        "metric" => Some(ResourceType::Metric),
        "semantic_model" => Some(ResourceType::SemanticModel),
        _ => None,
    }
}

fn parse_language(value: &str) -> Option<ModelLanguage> {
    match value {
        "sql" => Some(ModelLanguage::Sql),
        "python" => Some(ModelLanguage::Python),
        _ => None,
    }
}

fn parse_access(value: &str) -> Option<meshsplit_core::Access> {
    match value {
        "private" => Some(meshsplit_core::Access::Private),
        "protected" => Some(meshsplit_core::Access::Protected),
        "public" => Some(meshsplit_core::Access::Public),
        _ => None,
    }
}

/// Patch paths come as `project://relative/path.yml`.
fn strip_patch_prefix(patch_path: &str) -> PathBuf {
    match patch_path.split_once("://") {
        Some((_, rest)) => PathBuf::from(rest),
        None => PathBuf::from(patch_path),
    }
}

/// Version values of all model nodes, grouped by model name.
fn collect_versions(manifest: &Manifest) -> HashMap<String, Vec<serde_yaml::Value>> {
    let mut versions: HashMap<String, Vec<serde_yaml::Value>> = HashMap::new();
    for node in manifest.nodes.values() {
        if node.resource_type != "model" {
            continue;
        }
        if let Some(version) = &node.version {
            versions
                .entry(node.name.clone())
                .or_default()
                .push(json_to_yaml(version));
        }
    }
    versions
}

fn metadata_only(
    manifest: &Manifest,
) -> Vec<(&str, &str, &str, &str, &DependsOn, ResourceType)> {
    let mut entries = Vec::new();
    for e in manifest.exposures.values() {
        entries.push((
            e.unique_id.as_str(),
            e.name.as_str(),
            e.package_name.as_str(),
            e.original_file_path.as_str(),
            &e.depends_on,
            ResourceType::Exposure,
        ));
    }
    for m in manifest.metrics.values() {
        entries.push((
            m.unique_id.as_str(),
            m.name.as_str(),
            m.package_name.as_str(),
            m.original_file_path.as_str(),
            &m.depends_on,
            ResourceType::Metric,
        ));
    }
    for s in manifest.semantic_models.values() {
        entries.push((
            s.unique_id.as_str(),
            s.name.as_str(),
            s.package_name.as_str(),
            s.original_file_path.as_str(),
            &s.depends_on,
            ResourceType::SemanticModel,
        ));
    }
    entries
}

fn json_to_yaml(value: &serde_json::Value) -> serde_yaml::Value {
    match value {
        serde_json::Value::Null => serde_yaml::Value::Null,
        serde_json::Value::Bool(b) => serde_yaml::Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_yaml::Value::from(i)
            } else {
                serde_yaml::Value::from(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => serde_yaml::Value::from(s.as_str()),
        serde_json::Value::Array(items) => {
            serde_yaml::Value::Sequence(items.iter().map(json_to_yaml).collect())
        }
        serde_json::Value::Object(map) => serde_yaml::Value::Mapping(json_map_to_yaml(map)),
    }
}

fn json_map_to_yaml(map: &serde_json::Map<String, serde_json::Value>) -> serde_yaml::Mapping {
    map.iter()
        .map(|(k, v)| (serde_yaml::Value::from(k.as_str()), json_to_yaml(v)))
        .collect()
}
