//! Group and access planning
//!
//! Builds the metadata patches that assign a governance group and an access
//! level to a resource. The grouping-conflict check runs against the
//! resource's already-known group, before anything is written.

use std::path::PathBuf;

use serde_yaml::{Mapping, Value};

use meshsplit_core::change::{EntityKind, Operation, ResourceChange};
use meshsplit_core::{Access, PlanError};
use meshsplit_dbt::ResourceRegistry;

pub struct Grouper<'a> {
    registry: &'a ResourceRegistry,
}

impl<'a> Grouper<'a> {
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Access policy for a selected resource: interface members become
    /// public, everything else stays private.
    pub fn access_for(in_interface: bool) -> Access {
        if in_interface {
            Access::Public
        } else {
            Access::Private
        }
    }

    /// Plan an access (and optional group) patch for a resource, targeted
    /// at its metadata document in the owning project.
    pub fn generate_access(
        &self,
        unique_id: &str,
        access: Access,
        group: Option<&str>,
    ) -> Result<ResourceChange, PlanError> {
        let resource = self.registry.get(unique_id)?;
        let path = self.registry.patch_path(resource);
        self.access_change(unique_id, access, group, path)
    }

    /// Same patch, targeted at an explicit document path.
    pub fn generate_access_at(
        &self,
        unique_id: &str,
        access: Access,
        group: Option<&str>,
        path: impl Into<PathBuf>,
    ) -> Result<ResourceChange, PlanError> {
        self.access_change(unique_id, access, group, path.into())
    }

    fn access_change(
        &self,
        unique_id: &str,
        access: Access,
        group: Option<&str>,
        path: PathBuf,
    ) -> Result<ResourceChange, PlanError> {
        let resource = self.registry.get(unique_id)?;

        if let (Some(requested), Some(existing)) = (group, resource.group.as_deref()) {
            if requested != existing {
                return Err(PlanError::GroupingConflict {
                    unique_id: resource.unique_id.clone(),
                    existing: existing.to_string(),
                    requested: requested.to_string(),
                });
            }
        }

        let mut data = Mapping::new();
        data.insert(Value::from("name"), Value::from(resource.name.as_str()));
        data.insert(Value::from("access"), Value::from(access.as_str()));
        if let Some(group) = group {
            data.insert(Value::from("group"), Value::from(group));
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

    /// Plan a new group entry (name plus owner) at the given document.
    pub fn add_group(
        &self,
        name: &str,
        owner: Mapping,
        path: impl Into<PathBuf>,
    ) -> Result<ResourceChange, PlanError> {
        let mut data = Mapping::new();
        data.insert(Value::from("name"), Value::from(name));
        data.insert(Value::from("owner"), Value::Mapping(owner));
        ResourceChange::new(
            Operation::Add,
            EntityKind::Group,
            name.to_string(),
            path.into(),
            data,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsplit_core::{Resource, ResourceType};
    use pretty_assertions::assert_eq;

    fn registry() -> ResourceRegistry {
        let mut registry = ResourceRegistry::new("monolith", "/proj");
        let mut users = Resource::new(
            "model.monolith.users",
            "users",
            ResourceType::Model,
            "monolith",
            "models/users.sql",
        );
        users.group = Some("identity".to_string());
        registry.insert(users);
        registry
    }

    #[test]
    fn access_patch_carries_level_and_group() {
        let registry = registry();
        let grouper = Grouper::new(&registry);

        let change = grouper
            .generate_access("model.monolith.users", Access::Public, Some("identity"))
            .unwrap();
        assert_eq!(change.data.get("access"), Some(&Value::from("public")));
        assert_eq!(change.data.get("group"), Some(&Value::from("identity")));
    }

    #[test]
    fn conflicting_group_fails_before_planning() {
        let registry = registry();
        let grouper = Grouper::new(&registry);

        let err = grouper.generate_access("model.monolith.users", Access::Public, Some("finance"));
        assert!(matches!(err, Err(PlanError::GroupingConflict { .. })));
    }

    #[test]
    fn access_without_group_skips_the_conflict_check() {
        let registry = registry();
        let grouper = Grouper::new(&registry);

        let change = grouper
            .generate_access("model.monolith.users", Access::Private, None)
            .unwrap();
        assert!(change.data.get("group").is_none());
    }

    #[test]
    fn interface_policy() {
        assert_eq!(Grouper::access_for(true), Access::Public);
        assert_eq!(Grouper::access_for(false), Access::Private);
    }
}
