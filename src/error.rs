//! Error types for grimoire.

use thiserror::Error;

/// Common error type for grimoire operations.
#[derive(Error, Debug)]
pub enum GrimoireError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Script execution error.
    ///
    /// Covers Lua syntax errors, runtime errors raised by data files, and
    /// policy violations escalated to fatal errors under Strict mode.
    #[error("script error: {0}")]
    Script(String),

    /// A cross-entity reference that was never defined anywhere in the load.
    ///
    /// Detected at bind time, after all files have executed. Always fatal,
    /// regardless of strictness: there is no safe placeholder to substitute.
    #[error("unresolved {kind} reference '{key}'")]
    UnresolvedReference {
        /// Entity kind of the missing target.
        kind: &'static str,
        /// The key that failed to resolve.
        key: String,
    },
}

impl From<mlua::Error> for GrimoireError {
    fn from(e: mlua::Error) -> Self {
        GrimoireError::Script(e.to_string())
    }
}

/// Result type alias for grimoire operations.
pub type Result<T> = std::result::Result<T, GrimoireError>;
