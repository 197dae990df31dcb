//! Filesystem controller: mounts embedded layers, the overlay, and
//! optionally casefold, tracking every mountpoint so the janitor can clean
//! up if this process dies uncleanly.
//!
//! `Controller`: construction mounts everything and spawns the janitor;
//! `Drop` signals the janitor to stand down and tears down every mount in
//! reverse order, the same order the destructor unwinds its `unique_ptr`
//! members.

pub mod casefold;
pub mod mount;
pub mod overlay;

use crate::layers::LayerSource;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use flatimage_shared::layout::Layout;
use mount::Mount;
use overlay::OverlayBackend;
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub struct Controller {
    layout: Layout,
    mounts: Vec<Mount>,
    janitor_pid: Option<nix::unistd::Pid>,
    layer_dirs: Vec<PathBuf>,
    backend: OverlayBackend,
}

impl Controller {
    /// Mount every embedded/external layer read-only, then the overlay
    /// chosen by `backend` over them, then casefold if requested, then
    /// spawn the janitor with every mountpoint as an argument.
    pub fn new(
        layout: Layout,
        layers: &[LayerSource],
        backend: OverlayBackend,
        casefold: bool,
    ) -> FlatimageResult<Self> {
        let mut mounts = Vec::new();
        let mut layer_dirs = Vec::new();

        for (index, layer) in layers.iter().enumerate() {
            let mountpoint = layout.dir_mount_layer(index);
            std::fs::create_dir_all(&mountpoint)?;
            let dwarfs_bin = which("dwarfs")?;
            let (file, offset) = match layer {
                LayerSource::Embedded { file, offset, .. } => (file.clone(), *offset),
                LayerSource::External { file } => (file.clone(), 0),
            };
            let child = Command::new(dwarfs_bin)
                .arg("-f")
                .arg("-o")
                .arg(format!("offset={offset}"))
                .arg(&file)
                .arg(&mountpoint)
                .stdin(Stdio::null())
                .spawn()
                .map_err(FlatimageError::from)?;
            let m = Mount::new(mountpoint.clone(), child);
            m.wait_ready()?;
            layer_dirs.push(mountpoint);
            mounts.push(m);
        }

        let overlay_mountpoint = layout.dir_mount_overlayfs();
        let overlay_mount = match backend {
            OverlayBackend::Stacking => None,
            OverlayBackend::OverlayFs => Some(overlay::spawn_overlayfs(
                &layer_dirs,
                &layout.dir_upper(),
                &layout.dir_work(),
                &overlay_mountpoint,
            )?),
            OverlayBackend::UnionFs => Some(overlay::spawn_unionfs(
                &layer_dirs,
                &layout.dir_upper(),
                &overlay_mountpoint,
            )?),
        };
        if let Some(m) = overlay_mount {
            mounts.push(m);
        }

        if casefold {
            if !casefold::is_compatible_with(backend) {
                tracing::warn!("casefold cannot be used with the stacking overlay backend");
            } else {
                let lower = layout.dir_mount_overlayfs();
                let upper = layout.dir_mount_casefold();
                mounts.push(casefold::spawn(&lower, &upper)?);
            }
        }

        let mountpoints: Vec<PathBuf> = mounts.iter().map(|m| m.mountpoint().to_path_buf()).collect();
        let janitor_pid = spawn_janitor(&layout, &mountpoints).ok();

        Ok(Controller {
            layout,
            mounts,
            janitor_pid,
            layer_dirs,
            backend,
        })
    }

    /// The final top-level read/write view the sandbox should see as its
    /// root: casefold's mountpoint if active, else the overlay's, else
    /// (stacking) the topmost embedded layer.
    pub fn root(&self) -> PathBuf {
        self.mounts
            .last()
            .map(|m| m.mountpoint().to_path_buf())
            .unwrap_or_else(|| self.layout.dir_mount_layer(0))
    }

    /// Mountpoints of every embedded/external layer, lowest first, in the
    /// order the stacking backend must pass them to `--overlay-src`.
    pub fn layer_dirs(&self) -> &[PathBuf] {
        &self.layer_dirs
    }

    /// The overlay backend this controller actually mounted with.
    pub fn backend(&self) -> OverlayBackend {
        self.backend
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(pid) = self.janitor_pid {
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
            let _ = nix::sys::wait::waitpid(pid, None);
        } else {
            tracing::error!("janitor is not running");
        }
        // `self.mounts` drops here, tearing down every mount in reverse
        // construction order.
    }
}

fn which(binary: &str) -> FlatimageResult<PathBuf> {
    for dir in std::env::var("PATH").unwrap_or_default().split(':') {
        let candidate = PathBuf::from(dir).join(binary);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(FlatimageError::Filesystem(format!("{binary} not found in PATH")))
}

/// Fork+exec `fim_janitor <parent_pid> <log_path> <mountpoint...>` in
/// reverse mount order (last-mounted first), the way the original
/// controller pushes mountpoints for the janitor to tear down innermost
/// first.
fn spawn_janitor(layout: &Layout, mountpoints: &[PathBuf]) -> FlatimageResult<nix::unistd::Pid> {
    let janitor_bin = layout.dir_app_bin().join("fim_janitor");
    let log_path = layout.dir_mount().with_extension("janitor.log");
    let parent_pid = std::process::id().to_string();

    let mut cmd = Command::new(&janitor_bin);
    cmd.arg(&parent_pid).arg(&log_path);
    for mountpoint in mountpoints.iter().rev() {
        cmd.arg(mountpoint);
    }
    cmd.stdin(Stdio::null());
    let child = cmd.spawn().map_err(FlatimageError::from)?;
    Ok(nix::unistd::Pid::from_raw(child.id() as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_falls_back_to_first_layer_when_no_mounts() {
        let layout = Layout::new(
            "/opt/app.flatimage",
            flatimage_shared::layout::BuildId {
                commit: "c".into(),
                timestamp: 1,
            },
            1,
        );
        let controller = Controller {
            layout: layout.clone(),
            mounts: Vec::new(),
            janitor_pid: None,
            layer_dirs: Vec::new(),
            backend: OverlayBackend::Stacking,
        };
        assert_eq!(controller.root(), layout.dir_mount_layer(0));
        std::mem::forget(controller);
    }
}
