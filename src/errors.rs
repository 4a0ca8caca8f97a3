//! Error types for linearization and cache propagation

use thiserror::Error;

/// Errors surfaced by linearization and the mutation propagators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MroError {
    #[error("Can't linearize anonymous class")]
    AnonymousClass,

    #[error("Recursive inheritance detected in class '{0}'")]
    RecursiveInheritance(String),

    /// The C3 merge could not place a head. Carries the merge result built so
    /// far and the name that blocked; nothing is cached on this path.
    #[error("Inconsistent hierarchy during C3 merge of class '{class}': merging failed on '{blocked}'")]
    C3Inconsistency {
        class: String,
        partial: Vec<String>,
        blocked: String,
    },

    #[error("Invalid mro name: '{0}'")]
    UnknownAlgorithm(String),

    #[error("mro '{0}' is already registered")]
    DuplicateAlgorithm(String),

    /// Only raised when the caller asked for throw semantics; otherwise the
    /// resolver reports an empty result.
    #[error("No next method '{method}' found for {class}")]
    NoNextMethod { class: String, method: String },
}

/// Result type alias for subsystem operations
pub type MroResult<T> = Result<T, MroError>;
