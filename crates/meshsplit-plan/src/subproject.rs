//! Subproject materialization
//!
//! Assembles the full ordered change set that carves a subproject out of a
//! parent project: per-resource file moves and metadata-entry moves,
//! contracts and public access for boundary models, reference rewrites on
//! both sides of the new project seam, and the project-level files
//! (manifest, packages, dependency declaration).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use meshsplit_core::change::{
    Change, ChangeSet, EntityKind, FileChange, Operation, ResourceChange,
};
use meshsplit_core::project::ProjectFile;
use meshsplit_core::record::{Field, NamedList, DEFAULT_KEY_FIELD};
use meshsplit_core::{Access, PlanError, Resource, ResourceId, ResourceType};
use meshsplit_dbt::{DependencyGraph, ResourceRegistry};
use meshsplit_storage::FileStore;

use crate::contractor::Contractor;
use crate::grouper::Grouper;
use crate::refs::ReferenceUpdater;

/// Definition of a subproject to carve out: a name, an absolute target
/// directory, and the resources it takes with it.
#[derive(Debug, Clone, Default)]
pub struct Subproject {
    pub name: String,
    pub path: PathBuf,
    pub resources: BTreeSet<ResourceId>,
    pub custom_macros: BTreeSet<ResourceId>,
    pub groups: BTreeSet<ResourceId>,
    /// When set, the parent project declares the subproject as its upstream
    /// dependency instead of the other way around. Used when the selection
    /// is structurally upstream of everything that stays behind.
    pub reversed: bool,
}

impl Subproject {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Every resource the subproject takes, in deterministic order.
    pub fn selected(&self) -> BTreeSet<ResourceId> {
        self.resources
            .iter()
            .chain(self.custom_macros.iter())
            .chain(self.groups.iter())
            .cloned()
            .collect()
    }
}

pub struct SubprojectPlanner<'a> {
    registry: &'a ResourceRegistry,
    graph: &'a DependencyGraph,
    store: &'a FileStore,
}

impl<'a> SubprojectPlanner<'a> {
    pub fn new(
        registry: &'a ResourceRegistry,
        graph: &'a DependencyGraph,
        store: &'a FileStore,
    ) -> Self {
        Self {
            registry,
            graph,
            store,
        }
    }

    /// Plan the full split. Nothing is written; the returned change set is
    /// ordered so that applying it front to back relocates every selected
    /// resource and leaves both projects consistent.
    pub fn initialize(
        &self,
        subproject: &Subproject,
        parent: &ProjectFile,
    ) -> Result<ChangeSet, PlanError> {
        if !subproject.path.is_absolute() {
            return Err(PlanError::configuration(format!(
                "subproject path must be absolute, got `{}`",
                subproject.path.display()
            )));
        }

        let selected = subproject.selected();
        let cleaned = self.graph.clean_subgraph(|id| self.publicable(id));
        let boundary = self.boundary_models(&cleaned, &selected);
        let cross_parents = self.graph.cross_project_parents(&selected);
        let cross_children = self.graph.cross_project_children(&selected);
        tracing::debug!(
            subproject = %subproject.name,
            selected = selected.len(),
            boundary = boundary.len(),
            cross_parents = cross_parents.len(),
            cross_children = cross_children.len(),
            "planning split"
        );

        let contractor = Contractor::new(self.registry);
        let grouper = Grouper::new(self.registry);
        let refs = ReferenceUpdater::new(self.registry, self.store);

        let mut changes = ChangeSet::new();
        for unique_id in &selected {
            let resource = self.registry.get(unique_id)?;
            match resource.resource_type {
                ResourceType::Model
                | ResourceType::Test
                | ResourceType::Snapshot
                | ResourceType::Seed
                | ResourceType::Analysis => {
                    // Generic tests travel with their parent's metadata entry.
                    if resource.is_generic_test {
                        continue;
                    }
                    let destination_doc = subproject.path.join(resource.patch_document_path());
                    let destination_code = subproject.path.join(&resource.original_file_path);

                    if resource.resource_type == ResourceType::Model
                        && boundary.contains(unique_id)
                    {
                        changes.push(contractor.generate_contract_at(unique_id, &destination_doc)?);
                        changes.push(grouper.generate_access_at(
                            unique_id,
                            Access::Public,
                            None,
                            &destination_doc,
                        )?);
                        changes.extend(
                            refs.update_child_refs(unique_id, &cross_children, &subproject.name)?
                                .into_iter()
                                .map(Change::from),
                        );
                    }

                    changes.extend(self.move_metadata_entry(resource, &destination_doc)?);
                    changes.push(FileChange::new(
                        Operation::Move,
                        resource.name.clone(),
                        destination_code.clone(),
                        None,
                        Some(self.registry.code_path(resource)),
                    )?);

                    if resource.depends_on.iter().any(|p| cross_parents.contains(p)) {
                        if let Some(rewrite) = refs.update_parent_refs(
                            unique_id,
                            &cross_parents,
                            self.registry.project_name(),
                            destination_code,
                        )? {
                            changes.push(rewrite);
                        }
                    }
                }
                // Shared building blocks are duplicated, never relocated.
                ResourceType::Macro | ResourceType::Group => {
                    changes.push(FileChange::new(
                        Operation::Copy,
                        resource.name.clone(),
                        subproject.path.join(&resource.original_file_path),
                        None,
                        Some(self.registry.code_path(resource)),
                    )?);
                    if resource.patch_path.is_some() {
                        let destination_doc =
                            subproject.path.join(resource.patch_document_path());
                        changes.extend(self.copy_metadata_entry(resource, &destination_doc)?);
                    }
                }
                ResourceType::Source
                | ResourceType::Exposure
                | ResourceType::Metric
                | ResourceType::SemanticModel => {
                    let destination_doc =
                        subproject.path.join(self.defining_document(resource));
                    changes.extend(self.move_metadata_entry(resource, &destination_doc)?);
                }
            }
        }

        // Upstream models that stay behind are now relied upon across a
        // project boundary, so they also get a contract and public access.
        for parent_id in &cross_parents {
            if self.registry.resource_type_of(parent_id) != Some(ResourceType::Model) {
                continue;
            }
            changes.push(contractor.generate_contract(parent_id)?);
            changes.push(grouper.generate_access(parent_id, Access::Public, None)?);
        }

        let manifest = parent.subproject_mapping(&subproject.name);
        let contents = serde_yaml::to_string(&Value::Mapping(manifest)).map_err(|e| {
            PlanError::configuration(format!("cannot serialize project file: {e}"))
        })?;
        changes.push(FileChange::new(
            Operation::Add,
            subproject.name.clone(),
            subproject.path.join("dbt_project.yml"),
            Some(contents),
            None,
        )?);

        let packages = self.registry.project_root().join("packages.yml");
        if self.read(&packages)?.is_some() {
            changes.push(FileChange::new(
                Operation::Copy,
                subproject.name.clone(),
                subproject.path.join("packages.yml"),
                None,
                Some(packages),
            )?);
        }

        changes.push(self.dependency_declaration(subproject)?);

        Ok(changes)
    }

    /// Models in the selection that must become stable public interfaces:
    /// members of the cleaned graph's interface, plus any selected model
    /// with a dependent left outside the selection.
    fn boundary_models(
        &self,
        cleaned: &DependencyGraph,
        selected: &BTreeSet<ResourceId>,
    ) -> BTreeSet<ResourceId> {
        let interface = cleaned.identify_interface(selected);
        let mut boundary: BTreeSet<ResourceId> = selected
            .iter()
            .filter(|id| interface.contains(*id))
            .cloned()
            .collect();
        for unique_id in selected {
            if cleaned
                .children(unique_id)
                .iter()
                .any(|child| !selected.contains(child))
            {
                boundary.insert(unique_id.clone());
            }
        }
        boundary
    }

    fn publicable(&self, unique_id: &str) -> bool {
        self.registry
            .resource_type_of(unique_id)
            .map(|t| t.can_be_public())
            .unwrap_or(false)
    }

    /// Document a metadata-only resource is defined in, relative to its
    /// project root.
    fn defining_document(&self, resource: &Resource) -> PathBuf {
        resource
            .patch_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&resource.original_file_path))
    }

    fn source_document(&self, resource: &Resource) -> PathBuf {
        if resource.resource_type.has_code_file() {
            self.registry.patch_path(resource)
        } else {
            self.registry
                .project_root()
                .join(self.defining_document(resource))
        }
    }

    fn read(&self, path: &Path) -> Result<Option<String>, PlanError> {
        self.store
            .read(path)
            .map_err(|e| PlanError::document(path, e.to_string()))
    }

    /// Read one entry from a metadata document at planning time. Source
    /// tables are looked up inside their enclosing source entry.
    fn read_entry(
        &self,
        path: &Path,
        kind: EntityKind,
        resource: &Resource,
    ) -> Result<Option<Mapping>, PlanError> {
        let document = self
            .store
            .read_mapping(path)
            .map_err(|e| PlanError::document(path, e.to_string()))?;
        let list = NamedList::build(
            document.get(kind.pluralized()).and_then(Value::as_sequence),
            DEFAULT_KEY_FIELD,
        );
        let record = match resource.source_name.as_deref() {
            Some(parent_name) => match list.get(parent_name).map(|r| r.get("tables")) {
                Some(Some(Field::Nested(tables))) => tables.get(&resource.name).cloned(),
                _ => None,
            },
            None => list.get(&resource.name).cloned(),
        };
        Ok(record.map(|r| r.to_mapping()))
    }

    /// Metadata-entry move: an Add at the destination document plus a Remove
    /// at the source document. The source file itself stays on disk even
    /// when the removal empties it. Resources without a current entry
    /// produce no metadata changes.
    fn move_metadata_entry(
        &self,
        resource: &Resource,
        destination: &Path,
    ) -> Result<Vec<Change>, PlanError> {
        let source_doc = self.source_document(resource);
        let kind = EntityKind::from(resource.resource_type);
        let Some(entry) = self.read_entry(&source_doc, kind, resource)? else {
            return Ok(Vec::new());
        };
        let parent = resource.source_name.clone();
        let add = ResourceChange::new(
            Operation::Add,
            kind,
            resource.name.clone(),
            destination,
            entry,
            parent.clone(),
        )?;
        let remove = ResourceChange::new(
            Operation::Remove,
            kind,
            resource.name.clone(),
            source_doc,
            Mapping::new(),
            parent,
        )?;
        Ok(vec![add.into(), remove.into()])
    }

    fn copy_metadata_entry(
        &self,
        resource: &Resource,
        destination: &Path,
    ) -> Result<Vec<Change>, PlanError> {
        let source_doc = self.source_document(resource);
        let kind = EntityKind::from(resource.resource_type);
        let Some(entry) = self.read_entry(&source_doc, kind, resource)? else {
            return Ok(Vec::new());
        };
        let add = ResourceChange::new(
            Operation::Add,
            kind,
            resource.name.clone(),
            destination,
            entry,
            None,
        )?;
        Ok(vec![add.into()])
    }

    /// One dependency-declaration upsert: the downstream project records the
    /// upstream project by name. The record-store merge keys entries by
    /// name, so re-declaring an already-listed project is a no-op.
    fn dependency_declaration(&self, subproject: &Subproject) -> Result<Change, PlanError> {
        let (declaring_root, upstream) = if subproject.reversed {
            (
                self.registry.project_root().to_path_buf(),
                subproject.name.clone(),
            )
        } else {
            (
                subproject.path.clone(),
                self.registry.project_name().to_string(),
            )
        };
        let path = declaring_root.join("dependencies.yml");
        let operation = if self.read(&path)?.is_some() {
            Operation::Update
        } else {
            Operation::Add
        };
        let mut entry = Mapping::new();
        entry.insert(Value::from("name"), Value::from(upstream.as_str()));
        Ok(ResourceChange::new(
            operation,
            EntityKind::Project,
            upstream,
            path,
            entry,
            None,
        )?
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    /// Parent project with a staging model that stays, a leaf mart model
    /// that moves, and a source the mart reads from.
    fn fixture(root: &Path) -> ResourceRegistry {
        write(
            root,
            "models/marts/orders.sql",
            "select * from {{ ref('stg_orders') }} join {{ source('raw', 'payments') }} using (id)",
        );
        write(root, "models/staging/stg_orders.sql", "select 1 as id");
        write(
            root,
            "models/marts/_models.yml",
            "models:\n- name: orders\n  description: Customer orders\n",
        );
        write(
            root,
            "models/staging/_models.yml",
            "models:\n- name: stg_orders\n",
        );
        write(
            root,
            "models/sources.yml",
            "sources:\n- name: raw\n  tables:\n  - name: payments\n",
        );

        let mut registry = ResourceRegistry::new("monolith", root);

        let mut orders = Resource::new(
            "model.monolith.orders",
            "orders",
            ResourceType::Model,
            "monolith",
            "models/marts/orders.sql",
        );
        orders.patch_path = Some(PathBuf::from("models/marts/_models.yml"));
        orders.depends_on = vec![
            "model.monolith.stg_orders".to_string(),
            "source.monolith.raw.payments".to_string(),
        ];
        registry.insert(orders);

        let mut stg_orders = Resource::new(
            "model.monolith.stg_orders",
            "stg_orders",
            ResourceType::Model,
            "monolith",
            "models/staging/stg_orders.sql",
        );
        stg_orders.patch_path = Some(PathBuf::from("models/staging/_models.yml"));
        registry.insert(stg_orders);

        let mut payments = Resource::new(
            "source.monolith.raw.payments",
            "payments",
            ResourceType::Source,
            "monolith",
            "models/sources.yml",
        );
        payments.source_name = Some("raw".to_string());
        registry.insert(payments);

        registry
    }

    fn find_file<'a>(
        changes: &'a ChangeSet,
        operation: Operation,
        path: &Path,
    ) -> &'a FileChange {
        changes
            .iter()
            .find_map(|change| match change {
                Change::File(c) if c.operation == operation && c.path == path => Some(c),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no {operation} file change at {}", path.display()))
    }

    fn find_resource<'a>(
        changes: &'a ChangeSet,
        operation: Operation,
        identifier: &str,
        path: &Path,
    ) -> &'a ResourceChange {
        changes
            .iter()
            .find_map(|change| match change {
                Change::Resource(c)
                    if c.operation == operation
                        && c.identifier == identifier
                        && c.path == path =>
                {
                    Some(c)
                }
                _ => None,
            })
            .unwrap_or_else(|| {
                panic!("no {operation} entry change for `{identifier}` at {}", path.display())
            })
    }

    fn updates_for<'a>(
        changes: &'a ChangeSet,
        identifier: &str,
        path: &Path,
    ) -> Vec<&'a ResourceChange> {
        changes
            .iter()
            .filter_map(|change| match change {
                Change::Resource(c)
                    if c.operation == Operation::Update
                        && c.identifier == identifier
                        && c.path == path =>
                {
                    Some(c)
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn splitting_a_leaf_model_relocates_code_metadata_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let registry = fixture(root);
        let graph = DependencyGraph::from_registry(&registry);
        let store = FileStore::rooted(root);

        let mut subproject = Subproject::new("finance", root.join("finance"));
        subproject.resources = ["model.monolith.orders", "source.monolith.raw.payments"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let parent = ProjectFile::from_value(
            serde_yaml::from_str("{name: monolith, profile: warehouse}").unwrap(),
        )
        .unwrap();

        let planner = SubprojectPlanner::new(&registry, &graph, &store);
        let changes = planner.initialize(&subproject, &parent).unwrap();

        // (1) the code file moves.
        let relocation = find_file(
            &changes,
            Operation::Move,
            &root.join("finance/models/marts/orders.sql"),
        );
        assert_eq!(
            relocation.source,
            Some(root.join("models/marts/orders.sql"))
        );

        // (2) the metadata entry moves, description intact.
        let added = find_resource(
            &changes,
            Operation::Add,
            "orders",
            &root.join("finance/models/marts/_models.yml"),
        );
        assert_eq!(
            added.data.get("description"),
            Some(&Value::from("Customer orders"))
        );
        find_resource(
            &changes,
            Operation::Remove,
            "orders",
            &root.join("models/marts/_models.yml"),
        );

        // (3) the source table entry moves, nested under its source.
        let source_add = find_resource(
            &changes,
            Operation::Add,
            "payments",
            &root.join("finance/models/sources.yml"),
        );
        assert_eq!(source_add.parent.as_deref(), Some("raw"));
        find_resource(
            &changes,
            Operation::Remove,
            "payments",
            &root.join("models/sources.yml"),
        );

        // (4) the moved model's own code re-points at the staying parent.
        let rewrite = find_file(
            &changes,
            Operation::Update,
            &root.join("finance/models/marts/orders.sql"),
        );
        assert!(rewrite
            .data
            .as_deref()
            .unwrap()
            .contains("ref('monolith', 'stg_orders')"));

        // The leaf is a boundary model: contract plus public access at its
        // destination document.
        let patches = updates_for(
            &changes,
            "orders",
            &root.join("finance/models/marts/_models.yml"),
        );
        assert!(patches
            .iter()
            .any(|c| c.data.get("access") == Some(&Value::from("public"))));
        assert!(patches.iter().any(|c| c.data.get("config").is_some()));

        // The staying upstream model also becomes a public contract.
        let upstream = updates_for(
            &changes,
            "stg_orders",
            &root.join("models/staging/_models.yml"),
        );
        assert!(upstream
            .iter()
            .any(|c| c.data.get("access") == Some(&Value::from("public"))));
        assert!(upstream.iter().any(|c| c.data.get("config").is_some()));

        // Project-level files: new manifest plus a dependency declaration
        // naming the upstream project.
        let manifest = find_file(
            &changes,
            Operation::Add,
            &root.join("finance/dbt_project.yml"),
        );
        assert!(manifest.data.as_deref().unwrap().contains("name: finance"));
        let declaration = find_resource(
            &changes,
            Operation::Add,
            "monolith",
            &root.join("finance/dependencies.yml"),
        );
        assert_eq!(declaration.entity, EntityKind::Project);
    }

    #[test]
    fn boundary_model_with_staying_dependents_rewrites_their_refs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let registry = fixture(root);
        let graph = DependencyGraph::from_registry(&registry);
        let store = FileStore::rooted(root);

        let mut subproject = Subproject::new("staging", root.join("staging"));
        subproject.resources = ["model.monolith.stg_orders"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        subproject.reversed = true;

        let parent =
            ProjectFile::from_value(serde_yaml::from_str("{name: monolith}").unwrap()).unwrap();

        let planner = SubprojectPlanner::new(&registry, &graph, &store);
        let changes = planner.initialize(&subproject, &parent).unwrap();

        // The staying dependent's code is edited in place.
        let rewrite = find_file(
            &changes,
            Operation::Update,
            &root.join("models/marts/orders.sql"),
        );
        assert!(rewrite
            .data
            .as_deref()
            .unwrap()
            .contains("ref('staging', 'stg_orders')"));

        // Reversed direction: the parent project declares the subproject.
        let declaration = find_resource(
            &changes,
            Operation::Add,
            "staging",
            &root.join("dependencies.yml"),
        );
        assert_eq!(declaration.entity, EntityKind::Project);
    }

    #[test]
    fn generic_tests_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut registry = fixture(root);

        let mut generic = Resource::new(
            "test.monolith.not_null_orders_id",
            "not_null_orders_id",
            ResourceType::Test,
            "monolith",
            "models/marts/orders.sql",
        );
        generic.is_generic_test = true;
        generic.depends_on = vec!["model.monolith.orders".to_string()];
        registry.insert(generic);

        let graph = DependencyGraph::from_registry(&registry);
        let store = FileStore::rooted(root);

        let mut subproject = Subproject::new("finance", root.join("finance"));
        subproject.resources = [
            "model.monolith.orders",
            "source.monolith.raw.payments",
            "test.monolith.not_null_orders_id",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let parent =
            ProjectFile::from_value(serde_yaml::from_str("{name: monolith}").unwrap()).unwrap();

        let planner = SubprojectPlanner::new(&registry, &graph, &store);
        let changes = planner.initialize(&subproject, &parent).unwrap();

        assert!(changes
            .iter()
            .all(|change| !change.to_string().contains("not_null_orders_id")));
    }

    #[test]
    fn relative_target_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = fixture(dir.path());
        let graph = DependencyGraph::from_registry(&registry);
        let store = FileStore::rooted(dir.path());

        let subproject = Subproject::new("finance", "finance");
        let parent =
            ProjectFile::from_value(serde_yaml::from_str("{name: monolith}").unwrap()).unwrap();

        let planner = SubprojectPlanner::new(&registry, &graph, &store);
        let err = planner.initialize(&subproject, &parent);
        assert!(matches!(err, Err(PlanError::Configuration { .. })));
    }
}
