//! Meshsplit dbt integration
//!
//! Ingests dbt-generated artifacts (manifest.json, catalog.json) into the
//! resource registry, and provides the dependency-graph partitioner used to
//! compute subproject boundaries.

pub mod graph;
pub mod manifest;
pub mod registry;

pub use graph::DependencyGraph;
pub use manifest::{Catalog, Manifest, ManifestError};
pub use registry::ResourceRegistry;
