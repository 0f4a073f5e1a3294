//! Contract enforcement planning
//!
//! Builds the metadata patch that enforces a schema contract on a model,
//! pairing catalog-derived column types with whatever columns are already
//! documented. The contractor only emits the diff; hand-authored column
//! fields survive through the safe-merge at apply time.

use serde_yaml::{Mapping, Sequence, Value};

use meshsplit_core::change::{EntityKind, Operation, ResourceChange};
use meshsplit_core::{PlanError, Resource};
use meshsplit_dbt::ResourceRegistry;

pub struct Contractor<'a> {
    registry: &'a ResourceRegistry,
}

impl<'a> Contractor<'a> {
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Plan a contract patch for the given model, targeted at its metadata
    /// document in the owning project.
    pub fn generate_contract(&self, unique_id: &str) -> Result<ResourceChange, PlanError> {
        let resource = self.registry.get(unique_id)?;
        let path = self.registry.patch_path(resource);
        self.contract_change(resource, path)
    }

    /// Same patch, but targeted at an explicit document path (used when the
    /// model is relocating and the contract should land at its destination).
    pub fn generate_contract_at(
        &self,
        unique_id: &str,
        path: impl Into<std::path::PathBuf>,
    ) -> Result<ResourceChange, PlanError> {
        let resource = self.registry.get(unique_id)?;
        self.contract_change(resource, path.into())
    }

    fn contract_change(
        &self,
        resource: &Resource,
        path: std::path::PathBuf,
    ) -> Result<ResourceChange, PlanError> {
        let mut data = Mapping::new();
        data.insert(Value::from("name"), Value::from(resource.name.as_str()));
        data.insert(Value::from("config"), contract_config());

        // Without a catalog entry the contract is still enforced; any
        // previously authored columns are left as they are.
        if let Some(entry) = self.registry.catalog_for(&resource.unique_id) {
            if !entry.is_empty() {
                let columns: Sequence = entry
                    .columns
                    .iter()
                    .map(|column| {
                        let mut record = Mapping::new();
                        record.insert(
                            Value::from("name"),
                            Value::from(column.name.to_lowercase()),
                        );
                        record.insert(
                            Value::from("data_type"),
                            Value::from(column.column_type.to_lowercase()),
                        );
                        Value::Mapping(record)
                    })
                    .collect();
                data.insert(Value::from("columns"), Value::Sequence(columns));
            }
        }

        ResourceChange::new(
            Operation::Update,
            EntityKind::from(resource.resource_type),
            resource.name.clone(),
            path,
            data,
            None,
        )
    }
}

fn contract_config() -> Value {
    let mut contract = Mapping::new();
    contract.insert(Value::from("enforced"), Value::Bool(true));
    let mut config = Mapping::new();
    config.insert(Value::from("contract"), Value::Mapping(contract));
    Value::Mapping(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsplit_core::{CatalogColumn, CatalogEntry, ResourceType};
    use pretty_assertions::assert_eq;

    fn registry_with_catalog(columns: &[(&str, &str)]) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new("monolith", "/proj");
        registry.insert(Resource::new(
            "model.monolith.colors",
            "colors",
            ResourceType::Model,
            "monolith",
            "models/colors.sql",
        ));
        if !columns.is_empty() {
            registry.insert_catalog(
                "model.monolith.colors",
                CatalogEntry {
                    columns: columns
                        .iter()
                        .map(|(name, column_type)| CatalogColumn {
                            name: name.to_string(),
                            column_type: column_type.to_string(),
                        })
                        .collect(),
                },
            );
        }
        registry
    }

    #[test]
    fn contract_with_catalog_lowercases_names_and_types() {
        let registry =
            registry_with_catalog(&[("ID", "INTEGER"), ("COLOR", "TEXT"), ("IS_COOL_COLOR", "BOOLEAN")]);
        let contractor = Contractor::new(&registry);

        let change = contractor.generate_contract("model.monolith.colors").unwrap();
        assert_eq!(change.operation, Operation::Update);
        assert_eq!(
            change.path,
            std::path::PathBuf::from("/proj/models/_models.yml")
        );

        let columns = change.data.get("columns").unwrap().as_sequence().unwrap();
        assert_eq!(columns.len(), 3);
        let first = columns[0].as_mapping().unwrap();
        assert_eq!(first.get("name"), Some(&Value::from("id")));
        assert_eq!(first.get("data_type"), Some(&Value::from("integer")));

        let config = change.data.get("config").unwrap().as_mapping().unwrap();
        let contract = config.get("contract").unwrap().as_mapping().unwrap();
        assert_eq!(contract.get("enforced"), Some(&Value::Bool(true)));
    }

    #[test]
    fn contract_without_catalog_still_enforces() {
        let registry = registry_with_catalog(&[]);
        let contractor = Contractor::new(&registry);

        let change = contractor.generate_contract("model.monolith.colors").unwrap();
        assert!(change.data.get("columns").is_none());
        let config = change.data.get("config").unwrap().as_mapping().unwrap();
        assert!(config.get("contract").is_some());
    }

    #[test]
    fn applied_contract_merges_into_documented_columns() {
        use meshsplit_storage::{FileStore, ResourceFileEditor};

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::rooted(dir.path());
        store
            .write(
                std::path::Path::new("models/_models.yml"),
                "models:\n- name: colors\n  columns:\n  - name: id\n    description: primary key\n  - name: color\n",
            )
            .unwrap();

        let mut registry = ResourceRegistry::new("monolith", dir.path());
        registry.insert(Resource::new(
            "model.monolith.colors",
            "colors",
            ResourceType::Model,
            "monolith",
            "models/colors.sql",
        ));
        registry.insert_catalog(
            "model.monolith.colors",
            CatalogEntry {
                columns: vec![
                    CatalogColumn {
                        name: "ID".into(),
                        column_type: "INTEGER".into(),
                    },
                    CatalogColumn {
                        name: "COLOR".into(),
                        column_type: "TEXT".into(),
                    },
                    CatalogColumn {
                        name: "IS_COOL_COLOR".into(),
                        column_type: "BOOLEAN".into(),
                    },
                ],
            },
        );

        let change = Contractor::new(&registry)
            .generate_contract("model.monolith.colors")
            .unwrap();
        ResourceFileEditor::new(&store).apply(&change).unwrap();

        let doc = store
            .read_mapping(&dir.path().join("models/_models.yml"))
            .unwrap();
        let models = doc.get("models").unwrap().as_sequence().unwrap();
        let colors = models[0].as_mapping().unwrap();

        let config = colors.get("config").unwrap().as_mapping().unwrap();
        let contract = config.get("contract").unwrap().as_mapping().unwrap();
        assert_eq!(contract.get("enforced"), Some(&Value::Bool(true)));

        // Documented columns gain types without losing their fields; the
        // catalog-only column is appended.
        let columns = colors.get("columns").unwrap().as_sequence().unwrap();
        assert_eq!(columns.len(), 3);

        let id = columns[0].as_mapping().unwrap();
        assert_eq!(id.get("name"), Some(&Value::from("id")));
        assert_eq!(id.get("description"), Some(&Value::from("primary key")));
        assert_eq!(id.get("data_type"), Some(&Value::from("integer")));

        let color = columns[1].as_mapping().unwrap();
        assert_eq!(color.get("data_type"), Some(&Value::from("text")));

        let appended = columns[2].as_mapping().unwrap();
        assert_eq!(appended.get("name"), Some(&Value::from("is_cool_color")));
        assert_eq!(appended.get("data_type"), Some(&Value::from("boolean")));
    }

    #[test]
    fn missing_model_is_a_typed_error() {
        let registry = ResourceRegistry::new("monolith", "/proj");
        let contractor = Contractor::new(&registry);
        let err = contractor.generate_contract("model.monolith.absent");
        assert!(matches!(err, Err(PlanError::MissingResource { .. })));
    }
}
