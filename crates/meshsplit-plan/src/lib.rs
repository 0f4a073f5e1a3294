//! Meshsplit planning
//!
//! The resource mutators (contractor, grouper, reference rewriter,
//! versioner) and the subproject materializer that assembles their output
//! into one ordered change set. Planning is pure: nothing here writes to
//! the file system.

pub mod contractor;
pub mod grouper;
pub mod linker;
pub mod refs;
pub mod subproject;
pub mod version;

pub use contractor::Contractor;
pub use grouper::Grouper;
pub use linker::{ProjectDependency, ProjectDependencyType, ProjectLinker};
pub use refs::ReferenceUpdater;
pub use subproject::{Subproject, SubprojectPlanner};
pub use version::Versioner;
