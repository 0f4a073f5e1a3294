//! Reference rewriting
//!
//! Rewrites in-code references when resources cross a project boundary:
//! `ref('model')` gains a project qualifier, and `source(...)` calls are
//! replaced by direct cross-project references. Rewriting is pure text
//! substitution; patterns tolerate arbitrary whitespace and either quoting
//! style around string literals.

use std::collections::BTreeSet;
use std::path::PathBuf;

use regex::Regex;

use meshsplit_core::change::{FileChange, Operation};
use meshsplit_core::{ModelLanguage, PlanError, Resource, ResourceId, ResourceType};
use meshsplit_dbt::ResourceRegistry;
use meshsplit_storage::FileStore;

/// Qualify every `ref('<model>')` call in `code` with a project name.
pub fn qualify_ref(
    code: &str,
    language: ModelLanguage,
    model_name: &str,
    project_name: &str,
) -> Result<String, PlanError> {
    let name = regex::escape(model_name);
    let (pattern, replacement) = match language {
        ModelLanguage::Sql => (
            format!(r#"\{{\{{\s*ref\s*\(\s*['"]{name}['"]\s*\)\s*\}}\}}"#),
            format!("{{{{ ref('{project_name}', '{model_name}') }}}}"),
        ),
        ModelLanguage::Python => (
            format!(r#"dbt\.ref\s*\(\s*['"]{name}['"]\s*\)"#),
            format!("dbt.ref('{project_name}', '{model_name}')"),
        ),
    };
    let regex = compile(&pattern)?;
    Ok(regex.replace_all(code, replacement.as_str()).into_owned())
}

/// Replace every `source('<source>', '<table>')` call in `code` with a
/// direct project-qualified reference.
pub fn source_to_ref(
    code: &str,
    language: ModelLanguage,
    source_name: &str,
    table_name: &str,
    project_name: &str,
    model_name: &str,
) -> Result<String, PlanError> {
    let source = regex::escape(source_name);
    let table = regex::escape(table_name);
    let (pattern, replacement) = match language {
        ModelLanguage::Sql => (
            format!(
                r#"\{{\{{\s*source\s*\(\s*['"]{source}['"]\s*,\s*['"]{table}['"]\s*\)\s*\}}\}}"#
            ),
            format!("{{{{ ref('{project_name}', '{model_name}') }}}}"),
        ),
        ModelLanguage::Python => (
            format!(r#"dbt\.source\s*\(\s*['"]{source}['"]\s*,\s*['"]{table}['"]\s*\)"#),
            format!("dbt.ref('{project_name}', '{model_name}')"),
        ),
    };
    let regex = compile(&pattern)?;
    Ok(regex.replace_all(code, replacement.as_str()).into_owned())
}

fn compile(pattern: &str) -> Result<Regex, PlanError> {
    Regex::new(pattern)
        .map_err(|e| PlanError::configuration(format!("invalid rewrite pattern: {e}")))
}

/// Plans file-content edits that re-point references across the new
/// project boundary.
pub struct ReferenceUpdater<'a> {
    registry: &'a ResourceRegistry,
    store: &'a FileStore,
}

impl<'a> ReferenceUpdater<'a> {
    pub fn new(registry: &'a ResourceRegistry, store: &'a FileStore) -> Self {
        Self { registry, store }
    }

    fn read_code(&self, resource: &Resource) -> Result<String, PlanError> {
        let path = self.registry.code_path(resource);
        self.store
            .read(&path)
            .map_err(|e| PlanError::document(&path, e.to_string()))?
            .ok_or_else(|| PlanError::document(&path, "code file not found"))
    }

    /// For every cross-project child of a moved resource, rewrite its
    /// references to the project-qualified form. Children stay where they
    /// are; the edits target their current files.
    pub fn update_child_refs(
        &self,
        unique_id: &str,
        children: &BTreeSet<ResourceId>,
        subproject_name: &str,
    ) -> Result<Vec<FileChange>, PlanError> {
        let moved = self.registry.get(unique_id)?;
        let mut changes = Vec::new();
        for child_id in children {
            let child = self.registry.get(child_id)?;
            if !child.resource_type.has_code_file() {
                continue;
            }
            if !child.depends_on.iter().any(|dep| dep == unique_id) {
                continue;
            }
            let code = self.read_code(child)?;
            let language = child.language.unwrap_or(ModelLanguage::Sql);
            let rewritten = qualify_ref(&code, language, &moved.name, subproject_name)?;
            if rewritten == code {
                continue;
            }
            changes.push(FileChange::new(
                Operation::Update,
                child.name.clone(),
                self.registry.code_path(child),
                Some(rewritten),
                None,
            )?);
        }
        Ok(changes)
    }

    /// Rewrite a moved resource's own code so its cross-project parents are
    /// referenced through the upstream project. Rewrites fold sequentially
    /// in lexicographic parent-name order, so composed edits are
    /// deterministic. The edit targets `target_path` (the file's location
    /// after the move).
    pub fn update_parent_refs(
        &self,
        unique_id: &str,
        parents: &BTreeSet<ResourceId>,
        upstream_project: &str,
        target_path: PathBuf,
    ) -> Result<Option<FileChange>, PlanError> {
        let resource = self.registry.get(unique_id)?;
        if !resource.resource_type.has_code_file() {
            return Ok(None);
        }
        let language = resource.language.unwrap_or(ModelLanguage::Sql);

        let mut parent_names: Vec<String> = Vec::new();
        for parent_id in parents {
            if !resource.depends_on.iter().any(|dep| dep == parent_id) {
                continue;
            }
            let parent = self.registry.get(parent_id)?;
            if matches!(
                parent.resource_type,
                ResourceType::Model | ResourceType::Seed | ResourceType::Snapshot
            ) {
                parent_names.push(parent.name.clone());
            }
        }
        if parent_names.is_empty() {
            return Ok(None);
        }
        parent_names.sort();

        let original = self.read_code(resource)?;
        let mut code = original.clone();
        for parent_name in &parent_names {
            code = qualify_ref(&code, language, parent_name, upstream_project)?;
        }
        if code == original {
            return Ok(None);
        }
        Ok(Some(FileChange::new(
            Operation::Update,
            resource.name.clone(),
            target_path,
            Some(code),
            None,
        )?))
    }

    /// Replace an external-source call in a consumer's code with a direct
    /// reference to the upstream resource that materializes the relation.
    pub fn replace_source_with_ref(
        &self,
        consumer_id: &str,
        source_id: &str,
        upstream_model_id: &str,
        upstream_project: &str,
    ) -> Result<Option<FileChange>, PlanError> {
        let consumer = self.registry.get(consumer_id)?;
        if !consumer.resource_type.has_code_file() {
            return Ok(None);
        }
        let source = self.registry.get(source_id)?;
        let source_name = source.source_name.as_deref().ok_or_else(|| {
            PlanError::configuration(format!("`{source_id}` is not a source table"))
        })?;
        let upstream = self.registry.get(upstream_model_id)?;

        let code = self.read_code(consumer)?;
        let language = consumer.language.unwrap_or(ModelLanguage::Sql);
        let rewritten = source_to_ref(
            &code,
            language,
            source_name,
            &source.name,
            upstream_project,
            &upstream.name,
        )?;
        if rewritten == code {
            return Ok(None);
        }
        Ok(Some(FileChange::new(
            Operation::Update,
            consumer.name.clone(),
            self.registry.code_path(consumer),
            Some(rewritten),
            None,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sql_ref_gains_project_qualifier() {
        let code = "select * from {{ ref('my_table') }}";
        let rewritten =
            qualify_ref(code, ModelLanguage::Sql, "my_table", "upstream_project").unwrap();
        assert_eq!(
            rewritten,
            "select * from {{ ref('upstream_project', 'my_table') }}"
        );
    }

    #[test]
    fn python_ref_gains_project_qualifier() {
        let code = "df = dbt.ref('my_table')";
        let rewritten =
            qualify_ref(code, ModelLanguage::Python, "my_table", "upstream_project").unwrap();
        assert_eq!(rewritten, "df = dbt.ref('upstream_project', 'my_table')");
    }

    #[test]
    fn rewrite_tolerates_whitespace_and_double_quotes() {
        let code = r#"select * from {{  ref ( "my_table" )  }}"#;
        let rewritten = qualify_ref(code, ModelLanguage::Sql, "my_table", "p").unwrap();
        assert_eq!(rewritten, "select * from {{ ref('p', 'my_table') }}");
    }

    #[test]
    fn other_refs_are_untouched() {
        let code = "select * from {{ ref('other_table') }}";
        let rewritten = qualify_ref(code, ModelLanguage::Sql, "my_table", "p").unwrap();
        assert_eq!(rewritten, code);
    }

    #[test]
    fn sql_source_becomes_direct_ref() {
        let code = "select * from {{ source('raw', 'users') }}";
        let rewritten =
            source_to_ref(code, ModelLanguage::Sql, "raw", "users", "upstream", "stg_users")
                .unwrap();
        assert_eq!(rewritten, "select * from {{ ref('upstream', 'stg_users') }}");
    }

    #[test]
    fn python_source_becomes_direct_ref() {
        let code = r#"df = dbt.source("raw", "users")"#;
        let rewritten =
            source_to_ref(code, ModelLanguage::Python, "raw", "users", "upstream", "stg_users")
                .unwrap();
        assert_eq!(rewritten, "df = dbt.ref('upstream', 'stg_users')");
    }

    #[test]
    fn folded_rewrites_compose() {
        let code = "select * from {{ ref('a') }} join {{ ref('b') }} using (id)";
        let once = qualify_ref(code, ModelLanguage::Sql, "a", "up").unwrap();
        let twice = qualify_ref(&once, ModelLanguage::Sql, "b", "up").unwrap();
        assert_eq!(
            twice,
            "select * from {{ ref('up', 'a') }} join {{ ref('up', 'b') }} using (id)"
        );
    }
}
