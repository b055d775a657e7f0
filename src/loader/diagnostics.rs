//! Load-time diagnostics policy.
//!
//! A violation is a structural problem in a data file that the loader can
//! describe precisely. Under `Strict` policy any violation aborts the load
//! by raising a Lua error from inside the entry point; under `Lax` it is
//! logged and the entry point recovers with a documented fallback.

use std::fmt;
use std::path::PathBuf;

use tracing::warn;

/// How the loader treats content violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Any violation aborts the load.
    Strict,
    /// Violations are logged and recovered from. Unresolved references at
    /// bind time are still fatal.
    Lax,
}

/// A content violation detected while executing data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A `Define*` call reused an existing registry key.
    DuplicateDefinition { kind: &'static str, key: String },
    /// A `Modify*` call or file import named a target that does not exist.
    MissingTarget { kind: &'static str, key: String },
    /// A declaration table carried a field the kind does not define.
    UnknownField { kind: &'static str, field: String },
    /// A field value did not fit its expected shape.
    MalformedValue { field: String, detail: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateDefinition { kind, key } => {
                write!(f, "duplicate {} definition '{}'", kind, key)
            }
            Violation::MissingTarget { kind, key } => {
                write!(f, "no {} named '{}' to modify", kind, key)
            }
            Violation::UnknownField { kind, field } => {
                write!(f, "unknown {} field '{}'", kind, field)
            }
            Violation::MalformedValue { field, detail } => {
                write!(f, "malformed value for '{}': {}", field, detail)
            }
        }
    }
}

/// Violation reporting with the active policy and file inclusion stack.
#[derive(Debug)]
pub struct Diagnostics {
    strictness: Strictness,
    files: Vec<PathBuf>,
}

impl Diagnostics {
    pub fn new(strictness: Strictness) -> Diagnostics {
        Diagnostics {
            strictness,
            files: Vec::new(),
        }
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    pub fn push_file(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    pub fn pop_file(&mut self) {
        self.files.pop();
    }

    /// The file currently executing, if any.
    pub fn current_file(&self) -> Option<&PathBuf> {
        self.files.last()
    }

    fn location(&self) -> String {
        if self.files.is_empty() {
            return "(string chunk)".to_string();
        }
        self.files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Report a violation under the active policy.
    ///
    /// Strict raises a Lua error so the failure unwinds through the script;
    /// Lax logs a warning and lets the caller recover.
    pub fn report(&self, violation: Violation) -> mlua::Result<()> {
        match self.strictness {
            Strictness::Strict => Err(mlua::Error::RuntimeError(format!(
                "{} (in {})",
                violation,
                self.location()
            ))),
            Strictness::Lax => {
                warn!(location = %self.location(), "{}", violation);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_report_is_error() {
        let diag = Diagnostics::new(Strictness::Strict);
        let result = diag.report(Violation::DuplicateDefinition {
            kind: "ability",
            key: "Dodge".to_string(),
        });
        let err = result.unwrap_err().to_string();
        assert!(err.contains("duplicate ability definition 'Dodge'"));
    }

    #[test]
    fn test_lax_report_recovers() {
        let diag = Diagnostics::new(Strictness::Lax);
        let result = diag.report(Violation::UnknownField {
            kind: "class",
            field: "Wings".to_string(),
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_location_tracks_inclusion_stack() {
        let mut diag = Diagnostics::new(Strictness::Strict);
        diag.push_file(PathBuf::from("core.lua"));
        diag.push_file(PathBuf::from("feats.lua"));
        let err = diag
            .report(Violation::MissingTarget {
                kind: "ability",
                key: "X".to_string(),
            })
            .unwrap_err()
            .to_string();
        assert!(err.contains("core.lua -> feats.lua"));

        diag.pop_file();
        assert_eq!(diag.current_file(), Some(&PathBuf::from("core.lua")));
    }
}
