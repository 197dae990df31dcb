//! Crate-wide error hierarchy.
//!
//! Each subsystem in `flatimage` defines its own `thiserror` enum and
//! converts it into [`FlatimageError`] via `#[from]`, the same shape as the
//! teacher's `JailerError -> BoxliteError` conversion. Library code always
//! returns `Result<T, FlatimageError>` (or a subsystem-local alias); only
//! binary `main` functions reach for `anyhow`.

use thiserror::Error;

pub type FlatimageResult<T> = Result<T, FlatimageError>;

#[derive(Debug, Error)]
pub enum FlatimageError {
    /// ELF relocation / bootstrap failures. Fatal, exit code 125.
    #[error("bootstrap: {0}")]
    Bootstrap(String),

    /// Reserved-region read/write failures.
    #[error("reserved region: {0}")]
    ReservedRegion(String),

    /// Layer discovery/validation failures.
    #[error("layer: {0}")]
    Layer(String),

    /// Filesystem controller / mount failures.
    #[error("filesystem: {0}")]
    Filesystem(String),

    /// Sandbox builder (jailer) failures.
    #[error("jailer: {0}")]
    Jailer(String),

    /// Portal (daemon/dispatcher/worker) failures.
    #[error("portal: {0}")]
    Portal(String),

    /// Janitor failures.
    #[error("janitor: {0}")]
    Janitor(String),

    /// Layer commit failures.
    #[error("commit: {0}")]
    Commit(String),

    /// Configuration resolution failures.
    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Is this error one of the "fatal bootstrap" kinds that must exit 125
/// rather than with a generic non-zero status?
impl FlatimageError {
    pub fn is_fatal_bootstrap(&self) -> bool {
        matches!(self, FlatimageError::Bootstrap(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_errors_are_fatal() {
        let err = FlatimageError::Bootstrap("broken image".into());
        assert!(err.is_fatal_bootstrap());
        let err = FlatimageError::Portal("timeout".into());
        assert!(!err.is_fatal_bootstrap());
    }

    #[test]
    fn display_is_prefixed_by_subsystem() {
        let err = FlatimageError::Layer("bad magic".into());
        assert_eq!(err.to_string(), "layer: bad magic");
    }
}
