//! Version planning
//!
//! Adds or advances a model's version lineage: the metadata patch recording
//! the new version entry, plus the file move (first version) or copy
//! (subsequent versions, previous files stay intact) to the
//! version-suffixed file name.

use serde_yaml::{Mapping, Sequence, Value};

use meshsplit_core::change::{Change, EntityKind, FileChange, Operation, ResourceChange};
use meshsplit_core::{PlanError, Resource};
use meshsplit_dbt::ResourceRegistry;

pub struct Versioner<'a> {
    registry: &'a ResourceRegistry,
}

impl<'a> Versioner<'a> {
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Start a version lineage at v1. The code file is moved to its
    /// version-suffixed name; the original path ceases to exist.
    pub fn add_version(
        &self,
        unique_id: &str,
        defined_in: Option<&str>,
    ) -> Result<Vec<Change>, PlanError> {
        let resource = self.registry.get(unique_id)?;
        if resource.is_versioned() {
            return Err(PlanError::versioning(
                unique_id,
                "resource already has versions; use a version bump instead",
            ));
        }

        let mut version_entry = Mapping::new();
        version_entry.insert(Value::from("v"), Value::from(1));
        if let Some(defined_in) = defined_in {
            version_entry.insert(Value::from("defined_in"), Value::from(defined_in));
        }

        let mut data = Mapping::new();
        data.insert(Value::from("name"), Value::from(resource.name.as_str()));
        data.insert(Value::from("latest_version"), Value::from(1));
        data.insert(
            Value::from("versions"),
            Value::Sequence(Sequence::from(vec![Value::Mapping(version_entry)])),
        );

        let metadata = ResourceChange::new(
            Operation::Update,
            EntityKind::from(resource.resource_type),
            resource.name.clone(),
            self.registry.patch_path(resource),
            data,
            None,
        )?;

        let current = self.registry.code_path(resource);
        let target = self.versioned_path(resource, 1, defined_in);
        let relocate = FileChange::new(
            Operation::Move,
            resource.name.clone(),
            target,
            None,
            Some(current),
        )?;

        Ok(vec![metadata.into(), relocate.into()])
    }

    /// Define the next version. The previous version's file must remain, so
    /// the code file is copied. Under `prerelease` the new version is
    /// defined without becoming the latest. `stem_override` names the copy
    /// target's file stem, taking precedence over `defined_in`.
    pub fn bump_version(
        &self,
        unique_id: &str,
        prerelease: bool,
        defined_in: Option<&str>,
        stem_override: Option<&str>,
    ) -> Result<Vec<Change>, PlanError> {
        let resource = self.registry.get(unique_id)?;
        if !resource.is_versioned() {
            return Err(PlanError::versioning(
                unique_id,
                "resource has no versions yet; add a version first",
            ));
        }

        let mut greatest = i64::MIN;
        for version in &resource.versions {
            greatest = greatest.max(version_number(unique_id, version)?);
        }
        let next = greatest + 1;

        let mut version_entry = Mapping::new();
        version_entry.insert(Value::from("v"), Value::from(next));
        if let Some(defined_in) = defined_in {
            version_entry.insert(Value::from("defined_in"), Value::from(defined_in));
        }

        let mut data = Mapping::new();
        data.insert(Value::from("name"), Value::from(resource.name.as_str()));
        if !prerelease {
            data.insert(Value::from("latest_version"), Value::from(next));
        }
        data.insert(
            Value::from("versions"),
            Value::Sequence(Sequence::from(vec![Value::Mapping(version_entry)])),
        );

        let metadata = ResourceChange::new(
            Operation::Update,
            EntityKind::from(resource.resource_type),
            resource.name.clone(),
            self.registry.patch_path(resource),
            data,
            None,
        )?;

        let current = self.registry.code_path(resource);
        let target = self.versioned_path(resource, next, stem_override.or(defined_in));
        let duplicate = FileChange::new(
            Operation::Copy,
            resource.name.clone(),
            target,
            None,
            Some(current),
        )?;

        Ok(vec![metadata.into(), duplicate.into()])
    }

    fn versioned_path(
        &self,
        resource: &Resource,
        version: i64,
        stem: Option<&str>,
    ) -> std::path::PathBuf {
        let stem = match stem {
            Some(name) => name.to_string(),
            None => format!("{}_v{version}", resource.name),
        };
        let file_name = format!("{stem}.{}", resource.file_extension());
        let current = self.registry.code_path(resource);
        match current.parent() {
            Some(parent) => parent.join(file_name),
            None => std::path::PathBuf::from(file_name),
        }
    }
}

/// Integer value of one version entry (`{v: 2}` mappings or bare scalars).
fn version_number(unique_id: &str, version: &Value) -> Result<i64, PlanError> {
    let value = match version {
        Value::Mapping(mapping) => mapping.get("v").unwrap_or(&Value::Null),
        other => other,
    };
    match value {
        Value::Number(n) if n.as_i64().is_some() => Ok(n.as_i64().unwrap_or_default()),
        Value::String(s) => s.parse::<i64>().map_err(|_| {
            PlanError::versioning(unique_id, format!("version identifier `{s}` is not an integer"))
        }),
        other => Err(PlanError::versioning(
            unique_id,
            format!("version identifier `{other:?}` is not an integer"),
        )),
    }
}
