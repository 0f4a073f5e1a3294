//! Project-dependency detection
//!
//! Finds the informal edges between two already-split projects and plans
//! the changes that formalize them. Two informal patterns are recognized:
//! a downstream project reading an upstream relation through an external
//! source definition ("source hack"), and a downstream project referencing
//! models of an upstream project it has installed as a package.

use std::collections::HashMap;

use serde_yaml::Mapping;

use meshsplit_core::change::{ChangeSet, EntityKind, FileChange, Operation, ResourceChange};
use meshsplit_core::{Access, ModelLanguage, PlanError, Resource, ResourceId, ResourceType};
use meshsplit_dbt::ResourceRegistry;
use meshsplit_storage::FileStore;

use crate::contractor::Contractor;
use crate::grouper::Grouper;
use crate::refs::{qualify_ref, source_to_ref};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectDependencyType {
    /// Downstream reads the upstream relation through a source definition.
    SourceHack,
    /// Downstream references upstream models via an installed package.
    PackageImport,
}

/// One detected informal edge between two projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDependency {
    /// Model in the upstream project that materializes the shared relation.
    pub upstream_resource: ResourceId,
    /// Downstream stand-in for that relation (source table or packaged
    /// model node).
    pub downstream_resource: ResourceId,
    pub dependency_type: ProjectDependencyType,
}

pub struct ProjectLinker<'a> {
    upstream: &'a ResourceRegistry,
    downstream: &'a ResourceRegistry,
    store: &'a FileStore,
}

impl<'a> ProjectLinker<'a> {
    pub fn new(
        upstream: &'a ResourceRegistry,
        downstream: &'a ResourceRegistry,
        store: &'a FileStore,
    ) -> Self {
        Self {
            upstream,
            downstream,
            store,
        }
    }

    /// Detect informal edges by matching materialized relation names, in
    /// deterministic order.
    pub fn discover(&self) -> Vec<ProjectDependency> {
        let mut relations: HashMap<&str, &ResourceId> = HashMap::new();
        for model in self.upstream.of_type(ResourceType::Model) {
            if let Some(relation) = model.relation_name.as_deref() {
                relations.insert(relation, &model.unique_id);
            }
        }

        let mut dependencies = Vec::new();
        for resource in self.downstream.resources() {
            let Some(relation) = resource.relation_name.as_deref() else {
                continue;
            };
            let Some(upstream_id) = relations.get(relation) else {
                continue;
            };
            let dependency_type = match resource.resource_type {
                ResourceType::Source => ProjectDependencyType::SourceHack,
                ResourceType::Model
                    if resource.package_name == self.upstream.project_name() =>
                {
                    ProjectDependencyType::PackageImport
                }
                _ => continue,
            };
            dependencies.push(ProjectDependency {
                upstream_resource: (*upstream_id).clone(),
                downstream_resource: resource.unique_id.clone(),
                dependency_type,
            });
        }
        dependencies.sort_by(|a, b| a.downstream_resource.cmp(&b.downstream_resource));
        dependencies
    }

    /// Plan the changes that formalize one detected edge: a contract and
    /// public access on the upstream model, plus downstream code rewrites
    /// replacing the informal reference with a project-qualified one.
    pub fn resolve(&self, dependency: &ProjectDependency) -> Result<ChangeSet, PlanError> {
        let mut changes = ChangeSet::new();

        let contractor = Contractor::new(self.upstream);
        let grouper = Grouper::new(self.upstream);
        changes.push(contractor.generate_contract(&dependency.upstream_resource)?);
        changes.push(grouper.generate_access(
            &dependency.upstream_resource,
            Access::Public,
            None,
        )?);

        let upstream_model = self.upstream.get(&dependency.upstream_resource)?;
        match dependency.dependency_type {
            ProjectDependencyType::SourceHack => {
                self.resolve_source_hack(dependency, upstream_model, &mut changes)?;
            }
            ProjectDependencyType::PackageImport => {
                self.resolve_package_import(dependency, upstream_model, &mut changes)?;
            }
        }
        Ok(changes)
    }

    fn resolve_source_hack(
        &self,
        dependency: &ProjectDependency,
        upstream_model: &Resource,
        changes: &mut ChangeSet,
    ) -> Result<(), PlanError> {
        let source = self.downstream.get(&dependency.downstream_resource)?;
        let source_name = source.source_name.as_deref().ok_or_else(|| {
            PlanError::configuration(format!(
                "`{}` is not a source table",
                dependency.downstream_resource
            ))
        })?;

        for consumer in self.consumers_of(&dependency.downstream_resource) {
            let path = self.downstream.code_path(consumer);
            let code = self
                .store
                .read(&path)
                .map_err(|e| PlanError::document(&path, e.to_string()))?
                .ok_or_else(|| PlanError::document(&path, "code file not found"))?;
            let language = consumer.language.unwrap_or(ModelLanguage::Sql);
            let rewritten = source_to_ref(
                &code,
                language,
                source_name,
                &source.name,
                self.upstream.project_name(),
                &upstream_model.name,
            )?;
            if rewritten == code {
                continue;
            }
            changes.push(FileChange::new(
                Operation::Update,
                consumer.name.clone(),
                path,
                Some(rewritten),
                None,
            )?);
        }

        // The source definition is dead once every consumer refs directly.
        let defining_document = source
            .patch_path
            .clone()
            .unwrap_or_else(|| source.original_file_path.clone());
        let document = self.downstream.project_root().join(defining_document);
        changes.push(ResourceChange::new(
            Operation::Remove,
            EntityKind::Source,
            source.name.clone(),
            document,
            Mapping::new(),
            Some(source_name.to_string()),
        )?);
        Ok(())
    }

    fn resolve_package_import(
        &self,
        dependency: &ProjectDependency,
        upstream_model: &Resource,
        changes: &mut ChangeSet,
    ) -> Result<(), PlanError> {
        for consumer in self.consumers_of(&dependency.downstream_resource) {
            let path = self.downstream.code_path(consumer);
            let code = self
                .store
                .read(&path)
                .map_err(|e| PlanError::document(&path, e.to_string()))?
                .ok_or_else(|| PlanError::document(&path, "code file not found"))?;
            let language = consumer.language.unwrap_or(ModelLanguage::Sql);
            let rewritten = qualify_ref(
                &code,
                language,
                &upstream_model.name,
                self.upstream.project_name(),
            )?;
            if rewritten == code {
                continue;
            }
            changes.push(FileChange::new(
                Operation::Update,
                consumer.name.clone(),
                path,
                Some(rewritten),
                None,
            )?);
        }
        Ok(())
    }

    /// Downstream code-bearing resources that depend on `unique_id`, sorted
    /// for deterministic output.
    fn consumers_of(&self, unique_id: &str) -> Vec<&Resource> {
        let mut consumers: Vec<&Resource> = self
            .downstream
            .resources()
            .filter(|r| {
                r.resource_type.has_code_file()
                    && r.depends_on.iter().any(|dep| dep == unique_id)
            })
            .collect();
        consumers.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));
        consumers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsplit_core::change::Change;
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};

    fn upstream_registry() -> ResourceRegistry {
        let mut registry = ResourceRegistry::new("core", "/core");
        let mut stg_users = Resource::new(
            "model.core.stg_users",
            "stg_users",
            ResourceType::Model,
            "core",
            "models/stg_users.sql",
        );
        stg_users.relation_name = Some("\"db\".\"sch\".\"stg_users\"".to_string());
        registry.insert(stg_users);
        registry
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn source_hack_is_discovered_and_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "models/users_report.sql",
            "select * from {{ source('core_export', 'stg_users') }}",
        );

        let upstream = upstream_registry();
        let mut downstream = ResourceRegistry::new("analytics", root);

        let mut hacked = Resource::new(
            "source.analytics.core_export.stg_users",
            "stg_users",
            ResourceType::Source,
            "analytics",
            "models/sources.yml",
        );
        hacked.source_name = Some("core_export".to_string());
        hacked.relation_name = Some("\"db\".\"sch\".\"stg_users\"".to_string());
        downstream.insert(hacked);

        let mut report = Resource::new(
            "model.analytics.users_report",
            "users_report",
            ResourceType::Model,
            "analytics",
            "models/users_report.sql",
        );
        report.depends_on = vec!["source.analytics.core_export.stg_users".to_string()];
        downstream.insert(report);

        let store = FileStore::rooted(root);
        let linker = ProjectLinker::new(&upstream, &downstream, &store);

        let dependencies = linker.discover();
        assert_eq!(dependencies.len(), 1);
        assert_eq!(
            dependencies[0].dependency_type,
            ProjectDependencyType::SourceHack
        );

        let changes = linker.resolve(&dependencies[0]).unwrap();

        // Upstream model becomes a public contract.
        let upstream_patches: Vec<_> = changes
            .iter()
            .filter_map(|c| match c {
                Change::Resource(rc) if rc.identifier == "stg_users" && rc.operation == Operation::Update => Some(rc),
                _ => None,
            })
            .collect();
        assert!(upstream_patches
            .iter()
            .any(|c| c.path == PathBuf::from("/core/models/_models.yml")));

        // The consumer now refs the upstream project directly.
        let rewrite = changes
            .iter()
            .find_map(|c| match c {
                Change::File(fc) if fc.operation == Operation::Update => Some(fc),
                _ => None,
            })
            .unwrap();
        assert!(rewrite
            .data
            .as_deref()
            .unwrap()
            .contains("ref('core', 'stg_users')"));

        // The source definition entry is removed.
        let removal = changes
            .iter()
            .find_map(|c| match c {
                Change::Resource(rc) if rc.operation == Operation::Remove => Some(rc),
                _ => None,
            })
            .unwrap();
        assert_eq!(removal.entity, EntityKind::Source);
        assert_eq!(removal.parent.as_deref(), Some("core_export"));
    }

    #[test]
    fn package_import_rewrites_bare_refs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "models/users_report.sql",
            "select * from {{ ref('stg_users') }}",
        );

        let upstream = upstream_registry();
        let mut downstream = ResourceRegistry::new("analytics", root);

        // The packaged node keeps its upstream package name.
        let mut packaged = Resource::new(
            "model.core.stg_users",
            "stg_users",
            ResourceType::Model,
            "core",
            "models/stg_users.sql",
        );
        packaged.relation_name = Some("\"db\".\"sch\".\"stg_users\"".to_string());
        downstream.insert(packaged);

        let mut report = Resource::new(
            "model.analytics.users_report",
            "users_report",
            ResourceType::Model,
            "analytics",
            "models/users_report.sql",
        );
        report.depends_on = vec!["model.core.stg_users".to_string()];
        downstream.insert(report);

        let store = FileStore::rooted(root);
        let linker = ProjectLinker::new(&upstream, &downstream, &store);

        let dependencies = linker.discover();
        assert_eq!(dependencies.len(), 1);
        assert_eq!(
            dependencies[0].dependency_type,
            ProjectDependencyType::PackageImport
        );

        let changes = linker.resolve(&dependencies[0]).unwrap();
        let rewrite = changes
            .iter()
            .find_map(|c| match c {
                Change::File(fc) if fc.operation == Operation::Update => Some(fc),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            rewrite.data.as_deref().unwrap(),
            "select * from {{ ref('core', 'stg_users') }}"
        );
    }

    #[test]
    fn unrelated_relations_are_not_linked() {
        let dir = tempfile::tempdir().unwrap();
        let upstream = upstream_registry();
        let mut downstream = ResourceRegistry::new("analytics", dir.path());

        let mut other = Resource::new(
            "source.analytics.raw.other",
            "other",
            ResourceType::Source,
            "analytics",
            "models/sources.yml",
        );
        other.source_name = Some("raw".to_string());
        other.relation_name = Some("\"db\".\"sch\".\"other\"".to_string());
        downstream.insert(other);

        let store = FileStore::rooted(dir.path());
        let linker = ProjectLinker::new(&upstream, &downstream, &store);
        assert!(linker.discover().is_empty());
    }
}
