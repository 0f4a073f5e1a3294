//! Planning error taxonomy
//!
//! A single closed enum covers everything that can go wrong before any file
//! is touched. Apply-time failures live in the storage crate, where the
//! failing change can be attached.

use std::path::PathBuf;

/// Error raised while planning changes. Nothing has been written to disk
/// when one of these surfaces.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Invalid construction input (relative path, missing required field).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A referenced resource identifier is absent from the registry.
    #[error("resource `{unique_id}` not found in the registry")]
    MissingResource { unique_id: String },

    /// A document did not have the expected shape, or could not be read.
    #[error("unexpected document at {path}: {reason}")]
    Document { path: PathBuf, reason: String },

    /// A resource targeted for grouping already belongs to another group.
    #[error(
        "cannot add `{unique_id}` to group `{requested}`: it already belongs to group `{existing}`"
    )]
    GroupingConflict {
        unique_id: String,
        existing: String,
        requested: String,
    },

    /// Versioning policy violation (already versioned, unversioned, or a
    /// version identifier that is not an integer).
    #[error("versioning error for `{unique_id}`: {reason}")]
    Versioning { unique_id: String, reason: String },
}

impl PlanError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn document(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Document {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn versioning(unique_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Versioning {
            unique_id: unique_id.into(),
            reason: reason.into(),
        }
    }
}
