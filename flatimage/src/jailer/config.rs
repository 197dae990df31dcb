//! Permission/unshare bitfields and user-defined bindings.
//!
//! Serde-derived, preset-constructor shape over the reserved-region
//! permission model: a 12-bit capability bitfield, a 6-bit unshare
//! bitfield, and a list of user-defined bind directives.

use flatimage_shared::constants::{perm_bits, unshare_bits};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The 12-bit permission bitfield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet(pub u64);

impl PermissionSet {
    pub fn empty() -> Self {
        PermissionSet(0)
    }

    pub fn is_set(&self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= 1 << bit;
    }

    pub fn clear(&mut self, bit: u8) {
        self.0 &= !(1 << bit);
    }

    /// Names of every currently-set bit, in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        perm_bits::ALL
            .iter()
            .filter(|(bit, _)| self.is_set(*bit))
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn set_by_name(&mut self, name: &str) -> Option<()> {
        perm_bits::name_to_bit(name).map(|bit| self.set(bit))
    }

    pub fn clear_by_name(&mut self, name: &str) -> Option<()> {
        perm_bits::name_to_bit(name).map(|bit| self.clear(bit))
    }
}

/// The 6-bit unshare bitfield.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnshareSet(pub u16);

impl UnshareSet {
    pub fn is_set(&self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= 1 << bit;
    }

    pub fn clear(&mut self, bit: u8) {
        self.0 &= !(1 << bit);
    }

    pub fn names(&self) -> Vec<&'static str> {
        unshare_bits::ALL
            .iter()
            .filter(|(bit, _)| self.is_set(*bit))
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn set_by_name(&mut self, name: &str) -> Option<()> {
        unshare_bits::name_to_bit(name).map(|bit| self.set(bit))
    }

    pub fn clear_by_name(&mut self, name: &str) -> Option<()> {
        unshare_bits::name_to_bit(name).map(|bit| self.clear(bit))
    }
}

/// One entry of the user-defined bind database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindEntry {
    pub kind: BindKind,
    pub src: PathBuf,
    pub dst: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindKind {
    Ro,
    Rw,
    Dev,
}

/// Whether the sandbox runs as uid/gid 0 (`FIM_ROOT=1`) or as the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RootMode {
    #[default]
    User,
    Root,
}

/// How the sandbox root is assembled: either a single filesystem already
/// composed host-side (the `overlay-fs`/`union-fs` FUSE mount, or a retry
/// mountpoint), or the layer list plus upper/work dirs the sandbox
/// launcher itself composes via its native kernel overlay (`stacking`).
#[derive(Clone, Debug)]
pub enum OverlayPlan {
    Mounted(PathBuf),
    Stacking {
        layers: Vec<PathBuf>,
        upper: PathBuf,
        work: PathBuf,
    },
}

impl OverlayPlan {
    /// Where permission directives that write into the sandbox's root (the
    /// NVIDIA library symlinks) should land: the composed mount for
    /// `Mounted`, the upper dir for `Stacking` since it becomes the
    /// writable top of the kernel overlay once the launcher mounts it.
    pub fn guest_write_root(&self) -> &std::path::Path {
        match self {
            OverlayPlan::Mounted(root) => root,
            OverlayPlan::Stacking { upper, .. } => upper,
        }
    }
}

/// Security/permission configuration resolved for one launch: the
/// permission bitfield, unshare bitfield, user bindings, root mode and
/// casefold flag all come from the reserved region, overridden by
/// environment variables per the documented precedence rules.
#[derive(Clone, Debug, Default)]
pub struct SandboxOptions {
    pub permissions: PermissionSet,
    pub unshare: UnshareSet,
    pub binds: Vec<BindEntry>,
    pub root_mode: RootMode,
    pub casefold: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_round_trip_through_bits() {
        let mut p = PermissionSet::empty();
        p.set_by_name("gpu").unwrap();
        assert_eq!(p.names(), vec!["gpu"]);
        assert!(p.is_set(perm_bits::GPU));
        p.clear_by_name("gpu").unwrap();
        assert!(p.names().is_empty());
    }

    #[test]
    fn unknown_permission_name_is_rejected() {
        let mut p = PermissionSet::empty();
        assert!(p.set_by_name("nonexistent").is_none());
    }

    #[test]
    fn scenario_s2_add_then_remove_gpu() {
        let mut p = PermissionSet::empty();
        p.set_by_name("gpu").unwrap();
        assert_eq!(p.names(), vec!["gpu"]);
        assert_eq!(p.0, 1 << perm_bits::GPU);
        p.clear_by_name("gpu").unwrap();
        assert!(p.names().is_empty());
        assert_eq!(p.0, 0);
    }
}
