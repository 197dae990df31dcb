//! Bootstrap / relocator: copies the running ELF and its
//! appended tools out to a per-build scratch tree so the original file is
//! free to be mounted, then hands back the path to re-`execve`.
//!
//! Self-relocation off a read-only mount before any layer is touched.

use crate::elf;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use flatimage_shared::layout::Layout;
use std::fs::File;
use std::path::PathBuf;

/// Names of the tools appended after the ELF proper, in on-disk order. The
/// original reads this from a compile-time-embedded JSON manifest; these
/// are the concrete tools this implementation's filesystem/jailer code
/// actually shells out to.
pub const TOOL_MANIFEST: &[&str] = &["dwarfs_aio", "fuse-overlayfs", "unionfs", "ciopfs", "bwrap", "busybox"];

pub struct Relocated {
    pub boot_binary: PathBuf,
    pub tail_offset: u64,
}

/// Relocate `elf_path` into the scratch tree named by `layout`, returning
/// the path of the copied booter to `execve` into. No-op-safe: if the
/// running binary already ends exactly at its own ELF tail (no appended
/// payload), relocation is skipped and `elf_path` is returned unchanged.
pub fn relocate(elf_path: &std::path::Path, reserved_offset: u64, layout: &Layout) -> FlatimageResult<Relocated> {
    let tail = elf::tail_offset(elf_path)?;
    let self_len = std::fs::metadata(elf_path)?.len();
    if self_len == tail {
        return Ok(Relocated { boot_binary: elf_path.to_path_buf(), tail_offset: tail });
    }

    std::fs::create_dir_all(layout.dir_app_bin())?;
    std::fs::create_dir_all(layout.dir_app_sbin())?;
    std::fs::create_dir_all(layout.dir_instance())?;
    std::fs::create_dir_all(layout.dir_mount())?;

    let boot_binary = layout.path_boot_binary();
    if !boot_binary.exists() {
        elf::copy_binary(elf_path, &boot_binary, (0, tail))?;
    }

    let mut file = File::open(elf_path)?;
    let mut cursor = tail;
    for tool in TOOL_MANIFEST {
        let (body, next) = elf::read_sized_tool(&mut file, cursor)?;
        elf::write_tool_if_absent(&layout.dir_app_bin().join(tool), &body)?;
        cursor = next;
    }

    elf::create_dwarfs_aliases(&layout.dir_app_bin())?;
    elf::create_applet_symlinks(&layout.dir_app_bin(), &layout.dir_app_sbin())?;

    if cursor != reserved_offset {
        return Err(FlatimageError::Bootstrap(format!(
            "tool blob ends at {cursor} but reserved region starts at {reserved_offset}"
        )));
    }

    Ok(Relocated { boot_binary, tail_offset: tail })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_elf_with_tools(tools: &[&[u8]]) -> Vec<u8> {
        let mut buf = vec![0u8; 64];
        buf[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        buf[4] = 2;
        buf[0x28..0x30].copy_from_slice(&0u64.to_le_bytes());
        buf[0x3a..0x3c].copy_from_slice(&64u16.to_le_bytes());
        buf[0x3c..0x3e].copy_from_slice(&1u16.to_le_bytes());
        for tool in tools {
            buf.extend_from_slice(&(tool.len() as u64).to_le_bytes());
            buf.extend_from_slice(tool);
        }
        buf
    }

    #[test]
    fn skips_relocation_when_no_payload_appended() {
        let mut buf = vec![0u8; 64];
        buf[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        buf[4] = 2;
        buf[0x28..0x30].copy_from_slice(&0u64.to_le_bytes());
        buf[0x3a..0x3c].copy_from_slice(&64u16.to_le_bytes());
        buf[0x3c..0x3e].copy_from_slice(&1u16.to_le_bytes());
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&buf).unwrap();

        let layout = Layout::new(tmp.path(), flatimage_shared::layout::BuildId { commit: "a".into(), timestamp: 1 }, 1)
            .with_global_root(tempfile::tempdir().unwrap().into_path());
        let result = relocate(tmp.path(), 64, &layout).unwrap();
        assert_eq!(result.boot_binary, tmp.path());
    }

    #[test]
    fn rejects_mismatched_reserved_offset() {
        let tools: Vec<&[u8]> = TOOL_MANIFEST.iter().map(|_| b"x".as_slice()).collect();
        let buf = minimal_elf_with_tools(&tools);
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&buf).unwrap();

        let global = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path(), flatimage_shared::layout::BuildId { commit: "a".into(), timestamp: 1 }, 1)
            .with_global_root(global.path());
        let result = relocate(tmp.path(), 999999, &layout);
        assert!(result.is_err());
    }
}
