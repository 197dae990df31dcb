//! RAII handle over one FUSE mount.
//!
//! A mount is a spawned subprocess plus a
//! mountpoint, and dropping it sends `SIGTERM` to the process and unmounts
//! (`fusermount -zu`) the mountpoint. `wait_for_ready` polls the mountpoint
//! the way `ns_fuse::wait_fuse` does, since FUSE daemons detach from their
//! parent before the mount is actually live.

use flatimage_shared::constants::MOUNT_TIMEOUT_SECS;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::{Duration, Instant};

/// A live FUSE mount backed by a child process. Dropping it tears the
/// mount down; this must happen before the directory is removed.
pub struct Mount {
    mountpoint: PathBuf,
    process: Option<Child>,
}

impl Mount {
    pub fn new(mountpoint: PathBuf, process: Child) -> Self {
        Mount {
            mountpoint,
            process: Some(process),
        }
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Poll until the mountpoint looks mounted (its device differs from
    /// its parent's) or `MOUNT_TIMEOUT_SECS` elapses.
    pub fn wait_ready(&self) -> FlatimageResult<()> {
        let deadline = Instant::now() + Duration::from_secs(MOUNT_TIMEOUT_SECS);
        loop {
            if is_mounted(&self.mountpoint) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FlatimageError::Filesystem(format!(
                    "timed out waiting for mount at {}",
                    self.mountpoint.display()
                )));
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

fn is_mounted(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    let Some(parent) = path.parent() else {
        return false;
    };
    let (Ok(meta), Ok(parent_meta)) = (std::fs::metadata(path), std::fs::metadata(parent)) else {
        return false;
    };
    meta.dev() != parent_meta.dev()
}

impl Drop for Mount {
    fn drop(&mut self) {
        let _ = std::process::Command::new("fusermount")
            .arg("-zu")
            .arg(&self.mountpoint)
            .status();
        if let Some(mut process) = self.process.take() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(process.id() as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
            let _ = process.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmounted_directory_is_not_mounted() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_mounted(dir.path()));
    }
}
