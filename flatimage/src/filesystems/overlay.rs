//! Overlay backend selection and FUSE-backed overlay spawning.
//!
//! `stacking` is bwrap's native kernel-overlayfs directive
//! (`--overlay-src`/`--overlay`, assembled directly into the sandbox argv
//! by [`crate::jailer::bwrap`] — no separate process), while `overlay-fs`
//! and `union-fs` are host-side FUSE daemons the controller spawns and
//! binds into the sandbox before bwrap starts.

use super::mount::Mount;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub use crate::reserved::OverlayByte as OverlayBackend;

/// Resolve the effective backend from env override > reserved-region byte
/// > default. `stacking` silently downgrades
/// to `union-fs` with a warning when bwrap's kernel overlay is unusable
/// (e.g. unprivileged user namespaces disabled and no AppArmor profile).
pub fn resolve(env_override: Option<&str>, reserved: OverlayBackend, stacking_usable: bool) -> OverlayBackend {
    let chosen = match env_override {
        Some("overlayfs") => OverlayBackend::OverlayFs,
        Some("unionfs") => OverlayBackend::UnionFs,
        Some("stacking") => OverlayBackend::Stacking,
        Some(_) | None => reserved,
    };
    if chosen == OverlayBackend::Stacking && !stacking_usable {
        tracing::warn!("stacking overlay unusable, falling back to union-fs");
        return OverlayBackend::UnionFs;
    }
    chosen
}

pub(super) fn locate(binary: &str) -> FlatimageResult<PathBuf> {
    for dir in std::env::var("PATH").unwrap_or_default().split(':') {
        let candidate = Path::new(dir).join(binary);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(FlatimageError::Filesystem(format!(
        "{binary} not found in PATH"
    )))
}

/// Spawn `fuse-overlayfs`, layering `layers` (bottom-up) under `upper`,
/// with `work` as scratch, mounted at `mountpoint`.
pub fn spawn_overlayfs(
    layers: &[PathBuf],
    upper: &Path,
    work: &Path,
    mountpoint: &Path,
) -> FlatimageResult<Mount> {
    std::fs::create_dir_all(upper)?;
    std::fs::create_dir_all(work)?;
    std::fs::create_dir_all(mountpoint)?;

    let binary = locate("fuse-overlayfs")?;
    let lowerdir = layers
        .iter()
        .rev()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":");

    let child = Command::new(binary)
        .arg("-f")
        .arg("-o")
        .arg(format!("squash_to_uid={}", nix::unistd::getuid()))
        .arg("-o")
        .arg(format!("squash_to_gid={}", nix::unistd::getgid()))
        .arg("-o")
        .arg(format!("lowerdir={lowerdir}"))
        .arg("-o")
        .arg(format!("upperdir={}", upper.display()))
        .arg("-o")
        .arg(format!("workdir={}", work.display()))
        .arg(mountpoint)
        .stdin(Stdio::null())
        .spawn()?;

    let mount = Mount::new(mountpoint.to_path_buf(), child);
    mount.wait_ready()?;
    Ok(mount)
}

/// Spawn `unionfs-fuse`, layering `layers` (bottom-up) over `data` as the
/// writable top, mounted at `mountpoint`.
pub fn spawn_unionfs(layers: &[PathBuf], data: &Path, mountpoint: &Path) -> FlatimageResult<Mount> {
    std::fs::create_dir_all(data)?;
    std::fs::create_dir_all(mountpoint)?;

    let binary = locate("unionfs")?;
    let mut branches = vec![format!("{}=RW", data.display())];
    branches.extend(layers.iter().rev().map(|p| format!("{}=RO", p.display())));
    let branch_arg = branches.join(":");

    let child = Command::new(binary)
        .arg("-f")
        .arg("-o")
        .arg("cow")
        .arg(branch_arg)
        .arg(mountpoint)
        .stdin(Stdio::null())
        .spawn()?;

    let mount = Mount::new(mountpoint.to_path_buf(), child);
    mount.wait_ready()?;
    Ok(mount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins_over_reserved_byte() {
        let chosen = resolve(Some("unionfs"), OverlayBackend::OverlayFs, true);
        assert_eq!(chosen, OverlayBackend::UnionFs);
    }

    #[test]
    fn reserved_byte_used_when_no_override() {
        let chosen = resolve(None, OverlayBackend::OverlayFs, true);
        assert_eq!(chosen, OverlayBackend::OverlayFs);
    }

    #[test]
    fn stacking_downgrades_to_unionfs_when_unusable() {
        let chosen = resolve(Some("stacking"), OverlayBackend::OverlayFs, false);
        assert_eq!(chosen, OverlayBackend::UnionFs);
    }

    #[test]
    fn stacking_kept_when_usable() {
        let chosen = resolve(Some("stacking"), OverlayBackend::OverlayFs, true);
        assert_eq!(chosen, OverlayBackend::Stacking);
    }
}
