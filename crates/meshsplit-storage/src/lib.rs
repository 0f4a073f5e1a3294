//! Meshsplit storage
//!
//! The only part of the system that touches the file system: a file store
//! with separate read/write roots, a YAML document store on top of it,
//! per-entity editors, and the change-set processor that replays (or
//! dry-runs) an ordered plan.

pub mod editor;
pub mod fs;
pub mod processor;
pub mod yaml;

pub use editor::{RawFileEditor, ResourceFileEditor};
pub use fs::{FileStore, StoreError};
pub use processor::{ApplyError, ChangeSetProcessor, NullReporter, Reporter};
