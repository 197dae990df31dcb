//! Case-insensitive filesystem overlay (ciopfs).
//!
//! Casefold cannot be combined with the
//! `stacking` (bwrap-native) overlay backend — it only wraps a FUSE
//! mountpoint, and `stacking` never produces one.

use super::mount::Mount;
use super::overlay::OverlayBackend;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::path::Path;
use std::process::{Command, Stdio};

pub fn is_compatible_with(backend: OverlayBackend) -> bool {
    backend != OverlayBackend::Stacking
}

/// Mount `ciopfs` over `lower`, exposing a case-insensitive view at
/// `mountpoint`.
pub fn spawn(lower: &Path, mountpoint: &Path) -> FlatimageResult<Mount> {
    std::fs::create_dir_all(mountpoint)?;
    let binary = super::overlay::locate("ciopfs")?;
    let child = Command::new(binary)
        .arg(lower)
        .arg(mountpoint)
        .stdin(Stdio::null())
        .spawn()
        .map_err(FlatimageError::from)?;
    let mount = Mount::new(mountpoint.to_path_buf(), child);
    mount.wait_ready()?;
    Ok(mount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompatible_only_with_stacking() {
        assert!(!is_compatible_with(OverlayBackend::Stacking));
        assert!(is_compatible_with(OverlayBackend::OverlayFs));
        assert!(is_compatible_with(OverlayBackend::UnionFs));
    }
}
