//! Bubblewrap (bwrap) command builder.
//!
//! Keeps the same chainable `BwrapCommand` builder shape (`ro_bind`,
//! `dev_bind_if_exists`, `tmpfs`, `setenv`, `.build(exe, args)`) used
//! elsewhere for subprocess argv assembly, generalized to translate: a
//! permission bitfield and an unshare bitfield each become an ordered run
//! of bwrap flags, followed by the user bind database, the overlay
//! directive, and the fixed dev/proc/tmp/runtime-dir binds.

#![allow(dead_code)]

use super::config::{BindEntry, BindKind, OverlayPlan, SandboxOptions};
use flatimage_shared::constants::{perm_bits, unshare_bits};
use std::path::{Path, PathBuf};
use std::process::Command;

pub fn is_available() -> bool {
    Command::new("bwrap")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn version() -> Option<String> {
    Command::new("bwrap")
        .arg("--version")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
}

/// Builder for one bwrap invocation's argument list.
#[derive(Debug, Clone, Default)]
pub struct BwrapCommand {
    args: Vec<String>,
}

impl BwrapCommand {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.args.push("--uid".into());
        self.args.push(uid.to_string());
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.args.push("--gid".into());
        self.args.push(gid.to_string());
        self
    }

    pub fn unshare(mut self, namespace: &str, mandatory: bool) -> Self {
        let flag = if mandatory {
            format!("--unshare-{namespace}")
        } else {
            format!("--unshare-{namespace}-try")
        };
        self.args.push(flag);
        self
    }

    pub fn die_with_parent(mut self) -> Self {
        self.args.push("--die-with-parent".into());
        self
    }

    pub fn new_session(mut self) -> Self {
        self.args.push("--new-session".into());
        self
    }

    pub fn ro_bind(mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        self.args.push("--ro-bind".into());
        self.args.push(src.as_ref().to_string_lossy().into_owned());
        self.args.push(dest.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn ro_bind_if_exists(self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        if src.as_ref().exists() {
            self.ro_bind(src, dest)
        } else {
            self
        }
    }

    pub fn bind(mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        self.args.push("--bind".into());
        self.args.push(src.as_ref().to_string_lossy().into_owned());
        self.args.push(dest.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn bind_if_exists(self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        if src.as_ref().exists() {
            self.bind(src, dest)
        } else {
            self
        }
    }

    /// `--bind-try`: unlike `bind_if_exists`, the existence check happens
    /// inside the launcher at mount time rather than here, so a source that
    /// only appears after the sandbox starts still gets picked up.
    pub fn bind_try(mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        self.args.push("--bind-try".into());
        self.args.push(src.as_ref().to_string_lossy().into_owned());
        self.args.push(dest.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn dev_bind(mut self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        self.args.push("--dev-bind".into());
        self.args.push(src.as_ref().to_string_lossy().into_owned());
        self.args.push(dest.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn dev_bind_if_exists(self, src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        if src.as_ref().exists() {
            self.dev_bind(src, dest)
        } else {
            self
        }
    }

    pub fn with_dev(mut self) -> Self {
        self.args.push("--dev".into());
        self.args.push("/dev".into());
        self
    }

    pub fn with_proc(mut self) -> Self {
        self.args.push("--proc".into());
        self.args.push("/proc".into());
        self
    }

    pub fn tmpfs(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("--tmpfs".into());
        self.args.push(path.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn setenv(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push("--setenv".into());
        self.args.push(key.into());
        self.args.push(value.into());
        self
    }

    pub fn chdir(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("--chdir".into());
        self.args.push(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// A lower layer for the launcher's native kernel overlay; repeatable,
    /// one per layer, lowest priority first.
    pub fn overlay_src(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("--overlay-src".into());
        self.args.push(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Closes the overlay directive opened by `overlay_src`: upper dir,
    /// work dir, mount destination.
    pub fn overlay(mut self, upper: impl AsRef<Path>, work: impl AsRef<Path>, dest: impl AsRef<Path>) -> Self {
        self.args.push("--overlay".into());
        self.args.push(upper.as_ref().to_string_lossy().into_owned());
        self.args.push(work.as_ref().to_string_lossy().into_owned());
        self.args.push(dest.as_ref().to_string_lossy().into_owned());
        self
    }

    /// The launcher writes `{syscall_nr, errno}` to `fd` if a mount
    /// directive fails once it starts executing them.
    pub fn error_fd(mut self, fd: i32) -> Self {
        self.args.push("--error-fd".into());
        self.args.push(fd.to_string());
        self
    }

    pub fn build(self, bwrap_path: impl AsRef<Path>, executable: impl AsRef<Path>, args: &[String]) -> Command {
        let mut cmd = Command::new(bwrap_path.as_ref());
        cmd.args(&self.args);
        cmd.arg("--");
        cmd.arg(executable.as_ref());
        cmd.args(args);
        cmd
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Per-permission-bit directive bodies. Each entry
/// binds the host resources a capability needs; `home` and `media` are
/// plain directory binds, the desktop-integration bits bind well-known
/// sockets under `$XDG_RUNTIME_DIR`, and `gpu` additionally probes for an
/// NVIDIA userspace stack so proprietary driver libraries are visible
/// inside the sandbox without dragging in the whole host `/usr`.
fn apply_permission(mut bwrap: BwrapCommand, bit: u8, home: &Path, runtime_dir: &Path, guest_upper: &Path) -> BwrapCommand {
    match bit {
        perm_bits::HOME => {
            bwrap = bwrap.bind(home, home);
        }
        perm_bits::MEDIA => {
            bwrap = bwrap
                .bind_if_exists("/media", "/media")
                .bind_if_exists("/mnt", "/mnt")
                .bind_if_exists("/run/media", "/run/media");
        }
        perm_bits::AUDIO => {
            let pulse_native = runtime_dir.join("pulse/native");
            bwrap = bwrap
                .bind_if_exists(&pulse_native, &pulse_native)
                .bind_if_exists(runtime_dir.join("pipewire-0"), runtime_dir.join("pipewire-0"))
                .dev_bind_if_exists("/dev/dsp", "/dev/dsp")
                .bind_if_exists("/dev/snd", "/dev/snd")
                .bind_if_exists("/dev/shm", "/dev/shm")
                .bind_try("/proc/asound", "/proc/asound")
                .setenv("PULSE_SERVER", format!("unix:{}", pulse_native.display()));
        }
        perm_bits::WAYLAND => {
            bwrap = bwrap.bind_if_exists(
                runtime_dir.join("wayland-0"),
                runtime_dir.join("wayland-0"),
            );
        }
        perm_bits::XORG => {
            bwrap = bwrap
                .bind_if_exists("/tmp/.X11-unix", "/tmp/.X11-unix")
                .setenv("DISPLAY", std::env::var("DISPLAY").unwrap_or_default());
        }
        perm_bits::DBUS_USER => {
            bwrap = bwrap.bind_if_exists(runtime_dir.join("bus"), runtime_dir.join("bus"));
        }
        perm_bits::DBUS_SYSTEM => {
            bwrap = bwrap.bind_if_exists(
                "/run/dbus/system_bus_socket",
                "/run/dbus/system_bus_socket",
            );
        }
        perm_bits::UDEV => {
            bwrap = bwrap.bind_if_exists("/run/udev", "/run/udev");
        }
        perm_bits::USB => {
            bwrap = bwrap.dev_bind_if_exists("/dev/bus/usb", "/dev/bus/usb");
        }
        perm_bits::INPUT => {
            bwrap = bwrap.dev_bind_if_exists("/dev/input", "/dev/input");
        }
        perm_bits::GPU => {
            bwrap = bwrap
                .dev_bind_if_exists("/dev/dri", "/dev/dri")
                .dev_bind_if_exists("/dev/nvidia0", "/dev/nvidia0")
                .dev_bind_if_exists("/dev/nvidiactl", "/dev/nvidiactl")
                .dev_bind_if_exists("/dev/nvidia-uvm", "/dev/nvidia-uvm");
            for matched in nvidia_library_matches() {
                let Ok(real) = std::fs::canonicalize(&matched) else { continue };
                bwrap = bwrap.ro_bind_if_exists(&real, &real);
                if real != matched {
                    link_into_guest_upper(guest_upper, &matched, &real);
                }
            }
        }
        perm_bits::NETWORK => {
            bwrap = bwrap.bind_if_exists("/etc/resolv.conf", "/etc/resolv.conf");
        }
        _ => {}
    }
    bwrap
}

/// Directories that may hold an NVIDIA userspace driver stack.
const NVIDIA_SCAN_DIRS: &[&str] = &[
    "/usr/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/i386-linux-gnu",
    "/usr/bin",
    "/usr/share",
    "/usr/share/vulkan/icd.d",
    "/usr/lib32",
];

const NVIDIA_KEYWORDS: &[&str] = &["nvidia", "cuda", "nvcuvid", "nvoptix"];
const NVIDIA_EXCLUDE: &[&str] = &["gst", "icudata", "egl-wayland"];

fn is_nvidia_filename(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    NVIDIA_KEYWORDS.iter().any(|k| lower.contains(k)) && !NVIDIA_EXCLUDE.iter().any(|k| lower.contains(k))
}

/// Scan the known driver directories for files whose name matches the
/// NVIDIA/CUDA keyword set, excluding the known false-positive substrings.
fn nvidia_library_matches() -> Vec<PathBuf> {
    let mut matches = Vec::new();
    for dir in NVIDIA_SCAN_DIRS {
        let Ok(entries) = std::fs::read_dir(dir) else { continue };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_nvidia_filename(name) {
                matches.push(entry.path());
            }
        }
    }
    matches
}

/// Create `guest_upper/<matched-relative-to-root>` as a symlink to `real`,
/// so the name the dynamic linker expects resolves even when the matched
/// path itself was found under a versioned/alternate name. Skipped if the
/// link path already exists and is not itself a symlink.
fn link_into_guest_upper(guest_upper: &Path, matched: &Path, real: &Path) {
    let Ok(relative) = matched.strip_prefix("/") else { return };
    let link_path = guest_upper.join(relative);
    if let Some(parent) = link_path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    if let Ok(meta) = std::fs::symlink_metadata(&link_path) {
        if !meta.file_type().is_symlink() {
            return;
        }
        let _ = std::fs::remove_file(&link_path);
    }
    let _ = std::os::unix::fs::symlink(real, &link_path);
}

/// Apply the user-defined bind database.
fn apply_bind(bwrap: BwrapCommand, entry: &BindEntry) -> BwrapCommand {
    match entry.kind {
        BindKind::Ro => bwrap.ro_bind(&entry.src, &entry.dst),
        BindKind::Rw => bwrap.bind(&entry.src, &entry.dst),
        BindKind::Dev => bwrap.dev_bind(&entry.src, &entry.dst),
    }
}

fn apply_overlay(bwrap: BwrapCommand, overlay: &OverlayPlan) -> BwrapCommand {
    match overlay {
        OverlayPlan::Mounted(root) => bwrap.bind(root, "/"),
        OverlayPlan::Stacking { layers, upper, work } => {
            let mut bwrap = bwrap;
            for layer in layers {
                bwrap = bwrap.overlay_src(layer);
            }
            bwrap.overlay(upper, work, "/")
        }
    }
}

/// Assemble the full bwrap argument list for one launch: uid/gid, unshare
/// flags, the overlay directive, fixed dev/proc/tmp/sys binds,
/// `XDG_RUNTIME_DIR`, every set permission bit, and every user bind entry,
/// in that order.
pub fn assemble(
    options: &SandboxOptions,
    overlay: &OverlayPlan,
    home: &Path,
    runtime_dir_host: &Path,
) -> BwrapCommand {
    let (uid, gid) = match options.root_mode {
        super::config::RootMode::Root => (0, 0),
        super::config::RootMode::User => (
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
        ),
    };

    let mut bwrap = BwrapCommand::new().uid(uid).gid(gid).die_with_parent();

    for (bit, name) in unshare_bits::ALL {
        if options.unshare.is_set(*bit) {
            bwrap = bwrap.unshare(name, !unshare_bits::is_permissive(name));
        }
    }

    bwrap = apply_overlay(bwrap, overlay);

    bwrap = bwrap
        .with_dev()
        .with_proc()
        .bind("/tmp", "/tmp")
        .bind("/sys", "/sys")
        .bind_try("/etc/group", "/etc/group")
        .bind(runtime_dir_host, runtime_dir_host)
        .setenv(
            "XDG_RUNTIME_DIR",
            runtime_dir_host.to_string_lossy().into_owned(),
        );

    let guest_upper = overlay.guest_write_root();

    for (bit, _) in perm_bits::ALL {
        if options.permissions.is_set(*bit) {
            bwrap = apply_permission(bwrap, *bit, home, runtime_dir_host, guest_upper);
        }
    }

    for entry in &options.binds {
        bwrap = apply_bind(bwrap, entry);
    }

    bwrap
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::config::{PermissionSet, UnshareSet};

    fn mounted(path: &str) -> OverlayPlan {
        OverlayPlan::Mounted(PathBuf::from(path))
    }

    #[test]
    fn home_permission_binds_home_directory() {
        let mut options = SandboxOptions::default();
        options.permissions.set_by_name("home").unwrap();
        let bwrap = assemble(
            &options,
            &mounted("/tmp/overlay"),
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        let args = bwrap.args();
        assert!(args.windows(3).any(|w| w == ["--bind", "/home/user", "/home/user"]));
    }

    #[test]
    fn unshare_user_is_permissive() {
        let mut options = SandboxOptions::default();
        options.unshare.set(unshare_bits::USER);
        let bwrap = assemble(
            &options,
            &mounted("/tmp/overlay"),
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        assert!(bwrap.args().contains(&"--unshare-user-try".to_string()));
    }

    #[test]
    fn unshare_net_is_mandatory() {
        let mut options = SandboxOptions::default();
        options.unshare.set(unshare_bits::NET);
        let bwrap = assemble(
            &options,
            &mounted("/tmp/overlay"),
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        assert!(bwrap.args().contains(&"--unshare-net".to_string()));
    }

    #[test]
    fn user_bind_entries_are_applied_in_order() {
        let mut options = SandboxOptions::default();
        options.binds.push(BindEntry {
            kind: BindKind::Ro,
            src: "/opt/data".into(),
            dst: "/data".into(),
        });
        let bwrap = assemble(
            &options,
            &mounted("/tmp/overlay"),
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        assert!(bwrap
            .args()
            .windows(3)
            .any(|w| w == ["--ro-bind", "/opt/data", "/data"]));
    }

    #[test]
    fn root_mode_uses_zero_uid_gid() {
        let mut options = SandboxOptions::default();
        options.root_mode = super::super::config::RootMode::Root;
        let bwrap = assemble(
            &options,
            &mounted("/tmp/overlay"),
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        let args = bwrap.args();
        assert_eq!(args[0], "--uid");
        assert_eq!(args[1], "0");
    }

    #[test]
    fn no_permissions_no_unshare_leaves_fixed_binds_only() {
        let options = SandboxOptions::default();
        let bwrap = assemble(
            &options,
            &mounted("/tmp/overlay"),
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        let args = bwrap.args();
        assert!(args.windows(3).any(|w| w == ["--bind", "/tmp/overlay", "/"]));
        assert!(args.windows(3).any(|w| w == ["--bind", "/tmp", "/tmp"]));
        assert!(args.windows(3).any(|w| w == ["--bind", "/sys", "/sys"]));
        assert!(args.windows(3).any(|w| w == ["--bind-try", "/etc/group", "/etc/group"]));
        assert!(!args.iter().any(|a| a == "--tmpfs"));
        assert!(!args.iter().any(|a| a.starts_with("--unshare")));
        let _ = PermissionSet::empty();
        let _ = UnshareSet::default();
    }

    #[test]
    fn stacking_overlay_emits_overlay_src_per_layer_then_overlay() {
        let options = SandboxOptions::default();
        let overlay = OverlayPlan::Stacking {
            layers: vec![PathBuf::from("/mnt/0"), PathBuf::from("/mnt/1")],
            upper: PathBuf::from("/cfg/upper"),
            work: PathBuf::from("/cfg/work"),
        };
        let bwrap = assemble(
            &options,
            &overlay,
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        let args = bwrap.args();
        assert!(args.windows(2).any(|w| w == ["--overlay-src", "/mnt/0"]));
        assert!(args.windows(2).any(|w| w == ["--overlay-src", "/mnt/1"]));
        assert!(args
            .windows(4)
            .any(|w| w == ["--overlay", "/cfg/upper", "/cfg/work", "/"]));
        assert!(!args.windows(3).any(|w| w[0] == "--bind" && w[2] == "/"));
    }

    #[test]
    fn audio_permission_binds_pulse_and_setenv() {
        let mut options = SandboxOptions::default();
        options.permissions.set_by_name("audio").unwrap();
        let bwrap = assemble(
            &options,
            &mounted("/tmp/overlay"),
            Path::new("/home/user"),
            Path::new("/run/user/1000"),
        );
        let args = bwrap.args();
        assert!(args.iter().any(|a| a == "PULSE_SERVER"));
        assert!(args.iter().any(|a| a.starts_with("unix:")));
    }
}
