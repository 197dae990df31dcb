//! Constants shared between the bootstrap, the filesystem controller, the
//! sandbox builder and the portal.
//!
//! These must stay identical wherever the reserved-region layout or the
//! `FIM_*` environment contract is consulted.

/// Environment variables consumed by the core.
pub mod env {
    pub const DEBUG: &str = "FIM_DEBUG";
    pub const ROOT: &str = "FIM_ROOT";
    pub const RO: &str = "FIM_RO";
    pub const CASEFOLD: &str = "FIM_CASEFOLD";
    pub const OVERLAY: &str = "FIM_OVERLAY";
    pub const COMPRESSION_LEVEL: &str = "FIM_COMPRESSION_LEVEL";
    pub const DIRS_LAYER: &str = "FIM_DIRS_LAYER";
    pub const FILES_LAYER: &str = "FIM_FILES_LAYER";
    pub const MAIN_OFFSET: &str = "FIM_MAIN_OFFSET";

    /// Exported by the core before re-exec, for children to self-locate.
    pub const DIR_GLOBAL: &str = "FIM_DIR_GLOBAL";
    pub const DIR_APP: &str = "FIM_DIR_APP";
    pub const DIR_APP_BIN: &str = "FIM_DIR_APP_BIN";
    pub const DIR_APP_SBIN: &str = "FIM_DIR_APP_SBIN";
    pub const DIR_INSTANCE: &str = "FIM_DIR_INSTANCE";
    pub const DIR_MOUNT: &str = "FIM_DIR_MOUNT";
    pub const DIR_RUNTIME: &str = "FIM_DIR_RUNTIME";
    pub const DIR_RUNTIME_HOST: &str = "FIM_DIR_RUNTIME_HOST";
    pub const DIR_CONFIG: &str = "FIM_DIR_CONFIG";

    /// Overlay backend actually resolved by the booter (after the
    /// stacking-unusable downgrade), and the paths `fim-exec` needs to
    /// build the sandbox's own overlay composition when that backend is
    /// `stacking`.
    pub const OVERLAY_RESOLVED: &str = "FIM_OVERLAY_RESOLVED";
    pub const DIR_LAYERS: &str = "FIM_DIR_LAYERS";
    pub const DIR_UPPER: &str = "FIM_DIR_UPPER";
    pub const DIR_WORK: &str = "FIM_DIR_WORK";
    pub const DIR_MOUNT_OVERLAY: &str = "FIM_DIR_MOUNT_OVERLAY";
    pub const FILE_BINARY: &str = "FIM_FILE_BINARY";
    pub const OFFSET: &str = "FIM_OFFSET";
    pub const VERSION: &str = "FIM_VERSION";
    pub const COMMIT: &str = "FIM_COMMIT";
    pub const DIST: &str = "FIM_DIST";
    pub const TIMESTAMP: &str = "FIM_TIMESTAMP";
    pub const PID: &str = "FIM_PID";
}

/// Sizes and offsets of the fixed sub-ranges inside the reserved
/// configuration region. `PERMISSIONS` is first; each constant is
/// the byte size of its record, not its absolute offset — absolute offsets
/// are computed by [`crate::layout::reserved_offsets`] by summing these in
/// declared order so that adding a new record never reshuffles the rest.
pub mod reserved {
    pub const PERMISSIONS_SIZE: u64 = 8;
    pub const NOTIFY_SIZE: u64 = 1;
    pub const DESKTOP_SIZE: u64 = 4 * 1024;
    pub const ICON_SIZE: u64 = 1024 * 1024;
    pub const CASEFOLD_SIZE: u64 = 1;
    pub const OVERLAY_SIZE: u64 = 1;
    pub const BOOT_SIZE: u64 = 16 * 1024;
    pub const ENVIRONMENT_SIZE: u64 = 16 * 1024;
    pub const REMOTE_SIZE: u64 = 1024;
    pub const UNSHARE_SIZE: u64 = 2;

    /// Tail of the icon record reserved for its explicit `size: u64` field.
    pub const ICON_SIZE_FIELD: u64 = 8;
    /// Extension field at the head of the icon record.
    pub const ICON_EXT_FIELD: u64 = 4;
}

/// Bit positions of the permission bitfield, in the order the sandbox
/// builder must translate them.
pub mod perm_bits {
    pub const HOME: u8 = 0;
    pub const MEDIA: u8 = 1;
    pub const AUDIO: u8 = 2;
    pub const WAYLAND: u8 = 3;
    pub const XORG: u8 = 4;
    pub const DBUS_USER: u8 = 5;
    pub const DBUS_SYSTEM: u8 = 6;
    pub const UDEV: u8 = 7;
    pub const USB: u8 = 8;
    pub const INPUT: u8 = 9;
    pub const GPU: u8 = 10;
    pub const NETWORK: u8 = 11;

    pub const ALL: &[(u8, &str)] = &[
        (HOME, "home"),
        (MEDIA, "media"),
        (AUDIO, "audio"),
        (WAYLAND, "wayland"),
        (XORG, "xorg"),
        (DBUS_USER, "dbus-user"),
        (DBUS_SYSTEM, "dbus-system"),
        (UDEV, "udev"),
        (USB, "usb"),
        (INPUT, "input"),
        (GPU, "gpu"),
        (NETWORK, "network"),
    ];

    pub fn name_to_bit(name: &str) -> Option<u8> {
        ALL.iter().find(|(_, n)| *n == name).map(|(b, _)| *b)
    }

    pub fn bit_to_name(bit: u8) -> Option<&'static str> {
        ALL.iter().find(|(b, _)| *b == bit).map(|(_, n)| *n)
    }
}

/// Bit positions of the unshare bitfield.
pub mod unshare_bits {
    pub const USER: u8 = 0;
    pub const IPC: u8 = 1;
    pub const PID: u8 = 2;
    pub const NET: u8 = 3;
    pub const UTS: u8 = 4;
    pub const CGROUP: u8 = 5;

    pub const ALL: &[(u8, &str)] = &[
        (USER, "user"),
        (IPC, "ipc"),
        (PID, "pid"),
        (NET, "net"),
        (UTS, "uts"),
        (CGROUP, "cgroup"),
    ];

    /// Namespaces whose `--unshare-*-try` form is permissive rather than
    /// mandatory.
    pub fn is_permissive(name: &str) -> bool {
        matches!(name, "user" | "cgroup")
    }

    pub fn name_to_bit(name: &str) -> Option<u8> {
        ALL.iter().find(|(_, n)| *n == name).map(|(b, _)| *b)
    }

    pub fn bit_to_name(bit: u8) -> Option<&'static str> {
        ALL.iter().find(|(b, _)| *b == bit).map(|(_, n)| *n)
    }
}

/// First 6 bytes every appended layer must start with. The
/// compression codec itself is a non-goal black box; only its magic is
/// normative here.
pub const LAYER_MAGIC: &[u8; 6] = b"DWARFS";

/// Default FIFO I/O timeout for the portal.
pub const PORTAL_TIMEOUT_SECS: u64 = 5;

/// Mount-readiness timeout for FUSE drivers.
pub const MOUNT_TIMEOUT_SECS: u64 = 60;

/// Janitor poll interval.
pub const JANITOR_POLL_MS: u64 = 100;

/// How long the sandbox builder waits on the error-fd pipe after spawning
/// the launcher before assuming the launch succeeded and handing the
/// child back to the caller.
pub const MOUNT_FAILURE_PROBE_MS: i32 = 250;

/// Default compression level for layer commit, clamped [0, 9].
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 7;
