//! Dependency graph partitioning
//!
//! Forward and reverse dependency edges over resource identifiers, with the
//! boundary queries used to decide which resources must become public when a
//! subproject is split out.

use std::collections::{BTreeSet, HashMap, HashSet};

use meshsplit_core::ResourceId;

use crate::registry::ResourceRegistry;

/// Dependency graph with forward and reverse edges. An edge runs from a
/// parent to each node that depends on it.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// node -> nodes it depends on (parents)
    parents: HashMap<ResourceId, Vec<ResourceId>>,

    /// node -> nodes that depend on it (children)
    children: HashMap<ResourceId, Vec<ResourceId>>,

    nodes: HashSet<ResourceId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from a registry's `depends_on` edges.
    pub fn from_registry(registry: &ResourceRegistry) -> Self {
        let mut graph = Self::new();
        for resource in registry.resources() {
            graph.add_node(&resource.unique_id);
            for parent in &resource.depends_on {
                graph.add_edge(parent, &resource.unique_id);
            }
        }
        graph
    }

    pub fn add_node(&mut self, node: &str) {
        self.nodes.insert(node.to_string());
    }

    /// Add an edge parent -> child (child depends on parent).
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        self.add_node(parent);
        self.add_node(child);
        self.parents
            .entry(child.to_string())
            .or_default()
            .push(parent.to_string());
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate parents (dependencies) of a node.
    pub fn parents(&self, node: &str) -> &[ResourceId] {
        self.parents.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Immediate children (dependents) of a node.
    pub fn children(&self, node: &str) -> &[ResourceId] {
        self.children.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn out_degree(&self, node: &str) -> usize {
        self.children(node).len()
    }

    /// Nodes outside `selected` that receive at least one edge originating
    /// inside `selected`.
    pub fn node_boundary(&self, selected: &BTreeSet<ResourceId>) -> BTreeSet<ResourceId> {
        let mut boundary = BTreeSet::new();
        for node in selected {
            for child in self.children(node) {
                if !selected.contains(child) {
                    boundary.insert(child.clone());
                }
            }
        }
        boundary
    }

    /// The interface of a selected subset: its node boundary unioned with
    /// every node of the graph that has no dependents at all. A resource
    /// with external consumers, or with none (a terminal deliverable), must
    /// be safely callable once ownership changes.
    pub fn identify_interface(&self, selected: &BTreeSet<ResourceId>) -> BTreeSet<ResourceId> {
        let mut interface = self.node_boundary(selected);
        for node in &self.nodes {
            if self.out_degree(node) == 0 {
                interface.insert(node.clone());
            }
        }
        interface
    }

    /// Restrict the graph to nodes passing `keep`, dropping filtered nodes
    /// together with their incident edges. Used to remove resource kinds
    /// that cannot meaningfully be public before boundary computation.
    pub fn clean_subgraph<F>(&self, keep: F) -> DependencyGraph
    where
        F: Fn(&str) -> bool,
    {
        let mut cleaned = Self::new();
        for node in &self.nodes {
            if keep(node) {
                cleaned.add_node(node);
            }
        }
        for (parent, children) in &self.children {
            if !keep(parent) {
                continue;
            }
            for child in children {
                if keep(child) {
                    cleaned.add_edge(parent, child);
                }
            }
        }
        cleaned
    }

    /// Resources outside `selected` that some resource in `selected`
    /// depends on.
    pub fn cross_project_parents(&self, selected: &BTreeSet<ResourceId>) -> BTreeSet<ResourceId> {
        let mut result = BTreeSet::new();
        for node in selected {
            for parent in self.parents(node) {
                if !selected.contains(parent) {
                    result.insert(parent.clone());
                }
            }
        }
        result
    }

    /// Resources outside `selected` that depend on some resource in
    /// `selected`.
    pub fn cross_project_children(&self, selected: &BTreeSet<ResourceId>) -> BTreeSet<ResourceId> {
        self.node_boundary(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(ids: &[&str]) -> BTreeSet<ResourceId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    /// Canonical boundary fixture: four models in a chain with a fork, and
    /// a generic test hanging off `d`. The test is filtered out before
    /// boundary computation, leaving `c` and `d` as terminal deliverables.
    fn fixture() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_edge("model.proj.a", "model.proj.b");
        graph.add_edge("model.proj.b", "model.proj.c");
        graph.add_edge("model.proj.b", "model.proj.d");
        graph.add_edge("model.proj.d", "test.proj.not_null_d");
        graph
    }

    #[test]
    fn interface_of_full_selection_is_the_terminal_models() {
        let graph = fixture();
        let cleaned = graph.clean_subgraph(|node| !node.starts_with("test."));
        let selected = set(&["model.proj.a", "model.proj.b", "model.proj.c", "model.proj.d"]);

        let interface = cleaned.identify_interface(&selected);
        assert_eq!(interface, set(&["model.proj.c", "model.proj.d"]));
    }

    #[test]
    fn boundary_contains_external_consumers() {
        let graph = fixture();
        let cleaned = graph.clean_subgraph(|node| !node.starts_with("test."));
        let selected = set(&["model.proj.a", "model.proj.b"]);

        let boundary = cleaned.node_boundary(&selected);
        assert_eq!(boundary, set(&["model.proj.c", "model.proj.d"]));
    }

    #[test]
    fn cross_project_parent_and_child_sets() {
        let graph = fixture();
        let selected = set(&["model.proj.c", "model.proj.d"]);

        assert_eq!(graph.cross_project_parents(&selected), set(&["model.proj.b"]));
        assert_eq!(
            graph.cross_project_children(&selected),
            set(&["test.proj.not_null_d"])
        );
    }

    #[test]
    fn clean_subgraph_drops_incident_edges() {
        let graph = fixture();
        let cleaned = graph.clean_subgraph(|node| !node.starts_with("test."));

        assert!(!cleaned.contains("test.proj.not_null_d"));
        assert_eq!(cleaned.out_degree("model.proj.d"), 0);
        // Untouched edges survive the restriction.
        assert_eq!(cleaned.children("model.proj.b").len(), 2);
    }
}
