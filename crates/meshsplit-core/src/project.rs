//! Project-level files
//!
//! A thin, typed view over the project manifest mapping (dbt_project.yml).

use serde_yaml::{Mapping, Value};

use crate::error::PlanError;

/// Top-level keys always stripped when writing a subproject manifest.
/// `version` and `query-comment` are deprecated project-file fields.
const DEPRECATED_FIELDS: &[&str] = &["version", "query-comment"];

/// The parsed project manifest file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFile {
    mapping: Mapping,
}

impl ProjectFile {
    pub fn new(mapping: Mapping) -> Self {
        Self { mapping }
    }

    pub fn from_value(value: Value) -> Result<Self, PlanError> {
        match value {
            Value::Mapping(mapping) => Ok(Self { mapping }),
            other => Err(PlanError::configuration(format!(
                "project file must be a mapping, got {}",
                value_kind(&other)
            ))),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.mapping.get("name").and_then(Value::as_str)
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Project manifest content for a subproject carved out of this one:
    /// the name is replaced, deprecated fields are stripped, and
    /// falsy-valued top-level fields are omitted.
    pub fn subproject_mapping(&self, name: &str) -> Mapping {
        let mut out = Mapping::new();
        out.insert(Value::from("name"), Value::from(name));
        for (key, value) in &self.mapping {
            let Some(key_str) = key.as_str() else { continue };
            if key_str == "name" || DEPRECATED_FIELDS.contains(&key_str) {
                continue;
            }
            if is_falsy(value) {
                continue;
            }
            out.insert(key.clone(), value.clone());
        }
        out
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Sequence(seq) => seq.is_empty(),
        Value::Mapping(mapping) => mapping.is_empty(),
        _ => false,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn subproject_mapping_filters_deprecated_and_falsy() {
        let project = ProjectFile::from_value(yaml(
            r#"
            name: monolith
            version: "1.0.0"
            query-comment: deprecated
            profile: warehouse
            model-paths: [models]
            seed-paths: []
            vars: {}
            require-dbt-version: null
            "#,
        ))
        .unwrap();

        let mapping = project.subproject_mapping("finance");
        assert_eq!(mapping.get("name"), Some(&Value::from("finance")));
        assert_eq!(mapping.get("profile"), Some(&Value::from("warehouse")));
        assert!(mapping.get("version").is_none());
        assert!(mapping.get("query-comment").is_none());
        assert!(mapping.get("seed-paths").is_none());
        assert!(mapping.get("vars").is_none());
        assert!(mapping.get("require-dbt-version").is_none());
    }

    #[test]
    fn non_mapping_project_file_is_rejected() {
        let err = ProjectFile::from_value(yaml("[1, 2]"));
        assert!(matches!(err, Err(PlanError::Configuration { .. })));
    }
}
