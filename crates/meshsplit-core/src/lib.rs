//! Meshsplit Core
//!
//! Core domain model: the change vocabulary, the hierarchical record store
//! used for metadata documents, the resource model, and the shared error
//! taxonomy. Nothing in this crate touches the file system.

pub mod change;
pub mod error;
pub mod project;
pub mod record;
pub mod resource;

pub use change::{Change, ChangeSet, EntityKind, FileChange, Operation, ResourceChange};
pub use error::PlanError;
pub use project::ProjectFile;
pub use record::{Field, NamedList, Record};
pub use resource::{Access, CatalogColumn, CatalogEntry, ModelLanguage, Resource, ResourceId, ResourceType};
