//! Hierarchical error types for the jailer (sandbox builder) module.
//!
//! Categorized by recovery path, splitting isolation failures from system
//! and config failures:
//! - [`SetupError`]: bwrap/AppArmor preconditions, fatal before any mount.
//! - [`MountError`]: a specific `--bind`/`--overlay-src` directive failed at
//!   runtime, reported via the `--error-fd` pipe.
//! - [`ConfigError`]: a permission/unshare/bind value could not be resolved.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JailerError {
    #[error("setup: {0}")]
    Setup(#[from] SetupError),

    #[error("mount: {0}")]
    Mount(#[from] MountError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Failures that prevent bwrap from being invoked at all.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("bwrap not found in PATH")]
    BwrapNotFound,

    #[error("apparmor setup failed: {0}")]
    AppArmorSetup(String),

    #[error("pkexec helper {0} exited with status {1}")]
    PkexecFailed(String, i32),
}

/// Failures reported over the `--error-fd` pipe once bwrap has started
///: a specific syscall inside the sandbox failed.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("{syscall} failed for {path}: errno {errno}")]
    Syscall {
        syscall: String,
        path: String,
        errno: i32,
    },

    #[error("stacking overlay failed and union-fs fallback is disabled")]
    FallbackExhausted,
}

/// Failures resolving the permission/unshare/bind configuration before a
/// bwrap argv can be assembled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown permission name: {0}")]
    UnknownPermission(String),

    #[error("unknown unshare namespace: {0}")]
    UnknownUnshare(String),

    #[error("bind source does not exist: {0}")]
    BindSourceMissing(String),

    #[error("invalid overlay backend: {0}")]
    InvalidOverlayBackend(String),
}

impl From<JailerError> for flatimage_shared::errors::FlatimageError {
    fn from(err: JailerError) -> Self {
        flatimage_shared::errors::FlatimageError::Jailer(err.to_string())
    }
}

impl MountError {
    pub fn syscall(syscall: impl Into<String>, path: impl Into<String>, errno: i32) -> Self {
        MountError::Syscall {
            syscall: syscall.into(),
            path: path.into(),
            errno,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_hierarchy_converts_into_jailer_error() {
        let setup_err = SetupError::BwrapNotFound;
        let jailer_err: JailerError = setup_err.into();
        assert!(matches!(jailer_err, JailerError::Setup(_)));

        let mount_err = MountError::syscall("mount", "/opt/app/mnt", 1);
        let jailer_err: JailerError = mount_err.into();
        assert!(matches!(jailer_err, JailerError::Mount(_)));
    }

    #[test]
    fn display_includes_syscall_and_errno() {
        let err = MountError::syscall("mount", "/opt/app/mnt", 13);
        assert_eq!(err.to_string(), "mount failed for /opt/app/mnt: errno 13");
    }

    #[test]
    fn converts_into_flatimage_error() {
        let err = JailerError::Setup(SetupError::BwrapNotFound);
        let flat: flatimage_shared::errors::FlatimageError = err.into();
        assert!(flat.to_string().starts_with("jailer:"));
    }
}
