//! Instance and config directory layout.
//!
//! Two directory trees: the per-build/per-instance scratch tree under a
//! global temp root, and the persistent config tree that lives next to
//! the ELF on the host filesystem.

use std::path::{Path, PathBuf};

/// Path segment names, grouped together so every call site spells a
/// directory the same way.
pub mod dirs {
    pub const GLOBAL_ROOT: &str = "/tmp/fim";
    pub const APP: &str = "app";
    pub const BIN: &str = "bin";
    pub const SBIN: &str = "sbin";
    pub const INSTANCE: &str = "instance";
    pub const MOUNT: &str = "mount";
    pub const OVERLAYFS_MOUNT: &str = "overlayfs";
    pub const CASEFOLD_MOUNT: &str = "casefold";
    pub const PORTAL: &str = "portal";
    pub const FIFO: &str = "fifo";

    pub const CONFIG_SUFFIX: &str = ".config";
    pub const OVERLAYS: &str = "overlays";
    pub const UPPERDIR: &str = "upperdir";
    pub const WORKDIR: &str = "workdir";
    pub const CASEFOLD: &str = "casefold";
    pub const RECIPES: &str = "recipes";
    pub const TMP: &str = "tmp";
}

/// Identifies one build of the ELF: the `<commit>_<timestamp>` scratch
/// directory is shared by every instance of the same build, so
/// tool extraction and applet symlinks only ever happen once per build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildId {
    pub commit: String,
    pub timestamp: u64,
}

impl BuildId {
    pub fn dirname(&self) -> String {
        format!("{}_{}", self.commit, self.timestamp)
    }
}

/// Resolves every path the bootstrap, filesystem controller, sandbox
/// builder and portal need, given the running ELF's path, its build id,
/// and the current instance's PID.
#[derive(Clone, Debug)]
pub struct Layout {
    global_root: PathBuf,
    elf_path: PathBuf,
    build: BuildId,
    pid: u32,
}

impl Layout {
    pub fn new(elf_path: impl Into<PathBuf>, build: BuildId, pid: u32) -> Self {
        Layout {
            global_root: PathBuf::from(dirs::GLOBAL_ROOT),
            elf_path: elf_path.into(),
            build,
            pid,
        }
    }

    /// Override the scratch root, used by tests and by callers that need
    /// an alternate global root (e.g. a sandboxed CI temp dir).
    pub fn with_global_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.global_root = root.into();
        self
    }

    pub fn elf_path(&self) -> &Path {
        &self.elf_path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    // -- per-build scratch tree -------------------------------------------------

    pub fn dir_global(&self) -> PathBuf {
        self.global_root.clone()
    }

    pub fn dir_app(&self) -> PathBuf {
        self.dir_global().join(dirs::APP).join(self.build.dirname())
    }

    pub fn dir_app_bin(&self) -> PathBuf {
        self.dir_app().join(dirs::BIN)
    }

    pub fn dir_app_sbin(&self) -> PathBuf {
        self.dir_app().join(dirs::SBIN)
    }

    // -- per-instance scratch tree -----------------------------------------------

    pub fn dir_instance(&self) -> PathBuf {
        self.dir_app().join(dirs::INSTANCE).join(self.pid.to_string())
    }

    pub fn dir_mount(&self) -> PathBuf {
        self.dir_instance().join(dirs::MOUNT)
    }

    pub fn dir_mount_layer(&self, index: usize) -> PathBuf {
        self.dir_mount().join(index.to_string())
    }

    pub fn dir_mount_overlayfs(&self) -> PathBuf {
        self.dir_mount().join(dirs::OVERLAYFS_MOUNT)
    }

    pub fn dir_mount_casefold(&self) -> PathBuf {
        self.dir_mount().join(dirs::CASEFOLD_MOUNT)
    }

    pub fn dir_portal(&self) -> PathBuf {
        self.dir_instance().join(dirs::PORTAL)
    }

    pub fn dir_portal_fifo(&self) -> PathBuf {
        self.dir_portal().join(dirs::FIFO)
    }

    pub fn path_daemon_log(&self, mode_lower: &str) -> PathBuf {
        self.dir_portal().join(format!("daemon.{mode_lower}.log"))
    }

    pub fn path_bashrc(&self) -> PathBuf {
        self.dir_instance().join("bashrc")
    }

    pub fn path_passwd(&self) -> PathBuf {
        self.dir_instance().join("passwd")
    }

    pub fn path_boot_binary(&self) -> PathBuf {
        self.dir_instance().join("fim_boot")
    }

    // -- persistent config tree next to the ELF ----------------------------------

    pub fn dir_config(&self) -> PathBuf {
        let file_name = self
            .elf_path
            .file_name()
            .map(|n| format!(".{}{}", n.to_string_lossy(), dirs::CONFIG_SUFFIX))
            .unwrap_or_else(|| ".flatimage.config".to_string());
        self.elf_path
            .parent()
            .map(|p| p.join(&file_name))
            .unwrap_or_else(|| PathBuf::from(file_name))
    }

    pub fn dir_upper(&self) -> PathBuf {
        self.dir_config().join(dirs::OVERLAYS).join(dirs::UPPERDIR)
    }

    pub fn dir_work(&self) -> PathBuf {
        self.dir_config()
            .join(dirs::OVERLAYS)
            .join(dirs::WORKDIR)
            .join(self.pid.to_string())
    }

    pub fn dir_casefold_persistent(&self) -> PathBuf {
        self.dir_config().join(dirs::CASEFOLD)
    }

    pub fn dir_recipes(&self) -> PathBuf {
        self.dir_config().join(dirs::RECIPES)
    }

    pub fn dir_config_tmp(&self) -> PathBuf {
        self.dir_config().join(dirs::TMP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new(
            "/opt/myapp.flatimage",
            BuildId { commit: "abc123".into(), timestamp: 1000 },
            4242,
        )
        .with_global_root("/tmp/fim")
    }

    #[test]
    fn app_dir_is_shared_across_instances() {
        let l1 = Layout::new("/opt/myapp.flatimage", BuildId { commit: "abc123".into(), timestamp: 1000 }, 1)
            .with_global_root("/tmp/fim");
        let l2 = Layout::new("/opt/myapp.flatimage", BuildId { commit: "abc123".into(), timestamp: 1000 }, 2)
            .with_global_root("/tmp/fim");
        assert_eq!(l1.dir_app(), l2.dir_app());
        assert_ne!(l1.dir_instance(), l2.dir_instance());
    }

    #[test]
    fn instance_mount_tree_matches_spec() {
        let l = layout();
        assert_eq!(
            l.dir_mount_layer(0),
            PathBuf::from("/tmp/fim/app/abc123_1000/instance/4242/mount/0")
        );
        assert_eq!(
            l.dir_mount_overlayfs(),
            PathBuf::from("/tmp/fim/app/abc123_1000/instance/4242/mount/overlayfs")
        );
    }

    #[test]
    fn config_dir_is_dotfile_next_to_elf() {
        let l = layout();
        assert_eq!(l.dir_config(), PathBuf::from("/opt/.myapp.flatimage.config"));
        assert_eq!(
            l.dir_upper(),
            PathBuf::from("/opt/.myapp.flatimage.config/overlays/upperdir")
        );
        assert_eq!(
            l.dir_work(),
            PathBuf::from("/opt/.myapp.flatimage.config/overlays/workdir/4242")
        );
    }

    #[test]
    fn upper_dir_persists_workdir_does_not() {
        let a = Layout::new("/opt/app.flatimage", BuildId { commit: "c".into(), timestamp: 1 }, 1)
            .with_global_root("/tmp/fim");
        let b = Layout::new("/opt/app.flatimage", BuildId { commit: "c".into(), timestamp: 1 }, 2)
            .with_global_root("/tmp/fim");
        assert_eq!(a.dir_upper(), b.dir_upper());
        assert_ne!(a.dir_work(), b.dir_work());
    }
}
