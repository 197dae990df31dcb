//! ELF tail-offset arithmetic, binary relocation, and the busybox applet
//! symlink table.
//!
//! On first run the booter copies itself and every appended tool out of the
//! packed ELF into the per-build scratch tree, re-execs the copy, and frees
//! the original file so it is safe to mount filesystems backed by it. The
//! appended-tool region format (`u64`-LE size prefix, repeated) mirrors
//! `f_write_from_offset`.

use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Compute the byte offset one past the ELF header proper: the end of the
/// section header table, `e_shoff + e_shnum * e_shentsize`. Everything
/// from this offset onward is flatimage's own payload (tool blob region,
/// reserved region, layer chain), matching
/// `ns_elf::skip_elf_header` in the original source.
pub fn tail_offset(path: &Path) -> FlatimageResult<u64> {
    let mut file = File::open(path)?;
    tail_offset_at(&mut file, 0)
}

/// Same computation, but the ELF header starts at `base` bytes into `file`
/// — used when chaining past an already-copied binary the way
/// `f_write_from_header` advances `offset_beg` for each appended tool.
pub fn tail_offset_at(file: &mut File, base: u64) -> FlatimageResult<u64> {
    file.seek(SeekFrom::Start(base))?;
    let mut ident = [0u8; 64];
    file.read_exact(&mut ident)?;
    if ident[0..4] != ELF_MAGIC {
        return Err(FlatimageError::Bootstrap("not an ELF file".into()));
    }
    let is_64 = ident[4] == 2;
    if !is_64 {
        return Err(FlatimageError::Bootstrap(
            "only 64-bit ELF is supported".into(),
        ));
    }
    let e_shoff = u64::from_le_bytes(ident[0x28..0x30].try_into().unwrap());
    let e_shentsize = u16::from_le_bytes(ident[0x3a..0x3c].try_into().unwrap()) as u64;
    let e_shnum = u16::from_le_bytes(ident[0x3c..0x3e].try_into().unwrap()) as u64;
    Ok(base + e_shoff + e_shentsize * e_shnum)
}

/// Copy `[range.0, range.1)` of `src` into a freshly-created `dst`, setting
/// owner-rwx permissions.
pub fn copy_binary(src: &Path, dst: &Path, range: (u64, u64)) -> FlatimageResult<()> {
    let mut input = File::open(src)?;
    input.seek(SeekFrom::Start(range.0))?;
    let mut buf = vec![0u8; (range.1 - range.0) as usize];
    input.read_exact(&mut buf)?;

    let mut output = File::create(dst)?;
    output.write_all(&buf)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dst, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// One `u64`-LE-size-prefixed tool extracted from the appended-tool region
///: `read_sized_tool` reads the prefix, then the body,
/// advancing `cursor` past both so the caller can chain to the next tool.
pub fn read_sized_tool(file: &mut File, cursor: u64) -> FlatimageResult<(Vec<u8>, u64)> {
    file.seek(SeekFrom::Start(cursor))?;
    let mut size_buf = [0u8; 8];
    file.read_exact(&mut size_buf)?;
    let size = u64::from_le_bytes(size_buf);
    let mut body = vec![0u8; size as usize];
    file.read_exact(&mut body)?;
    Ok((body, cursor + 8 + size))
}

/// Write `body` to `dst` (skipping if it already exists, since every
/// instance of the same build shares one `bin/` tree) with owner-rwx
/// permissions, mirroring `f_write_from_offset`'s dedup-by-existence check.
pub fn write_tool_if_absent(dst: &Path, body: &[u8]) -> FlatimageResult<()> {
    if dst.exists() {
        return Ok(());
    }
    let mut f = File::create(dst)?;
    f.write_all(body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dst, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Symlink `link -> target` in `sbin_dir`, tolerating an already-existing
/// symlink from a concurrent instance of the same build.
pub fn symlink_tool(target: &Path, link: &Path) -> FlatimageResult<()> {
    match std::os::unix::fs::symlink(target, link) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(FlatimageError::from(e)),
    }
}

/// Create every busybox applet symlink in `sbin_dir` pointing at
/// `bin_dir/busybox`. A representative subset of the full busybox applet
/// table is carried
/// here rather than the full list — see DESIGN.md for the rationale —
/// covering the applets a typical packaged CLI application actually
/// invokes (coreutils, text tools, process/signal tools, archive tools).
pub const BUSYBOX_APPLETS: &[&str] = &[
    "[", "[[", "awk", "base32", "base64", "basename", "bunzip2", "bzcat", "bzip2", "cat", "chgrp",
    "chmod", "chown", "cksum", "clear", "cmp", "comm", "cp", "cut", "date", "dd", "df", "diff",
    "dirname", "dmesg", "du", "echo", "egrep", "env", "expand", "expr", "false", "find", "fgrep",
    "flock", "fold", "free", "grep", "gunzip", "gzip", "head", "hexdump", "hostname", "id",
    "install", "kill", "killall", "less", "ln", "ls", "lzcat", "lzma", "md5sum", "mkdir", "mkfifo",
    "mknod", "mktemp", "more", "mount", "mv", "nice", "nl", "nohup", "od", "passwd", "paste",
    "patch", "pgrep", "pidof", "pkill", "printenv", "printf", "ps", "pstree", "pwd", "readlink",
    "realpath", "rev", "rm", "rmdir", "sed", "seq", "sh", "sha1sum", "sha256sum", "sha512sum",
    "shred", "shuf", "sleep", "sort", "split", "stat", "strings", "stty", "sync", "tac", "tail",
    "tar", "taskset", "tee", "test", "time", "timeout", "top", "touch", "tr", "true", "truncate",
    "umount", "uname", "uniq", "unlink", "unxz", "unzip", "uptime", "wc", "wget", "which", "who",
    "whoami", "xargs", "xxd", "xz", "xzcat", "yes", "zcat",
];

pub fn create_applet_symlinks(bin_dir: &Path, sbin_dir: &Path) -> FlatimageResult<()> {
    std::fs::create_dir_all(sbin_dir)?;
    let busybox = bin_dir.join("busybox");
    for applet in BUSYBOX_APPLETS {
        symlink_tool(&busybox, &sbin_dir.join(applet))?;
    }
    Ok(())
}

/// Symlinks `dwarfs`/`mkdwarfs` to the multi-call `dwarfs_aio` binary
///, paralleling the busybox aliases.
pub fn create_dwarfs_aliases(bin_dir: &Path) -> FlatimageResult<()> {
    let aio = bin_dir.join("dwarfs_aio");
    symlink_tool(&aio, &bin_dir.join("dwarfs"))?;
    symlink_tool(&aio, &bin_dir.join("mkdwarfs"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn minimal_elf64(shoff: u64, shentsize: u16, shnum: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 64];
        buf[0..4].copy_from_slice(&ELF_MAGIC);
        buf[4] = 2; // ELFCLASS64
        buf[0x28..0x30].copy_from_slice(&shoff.to_le_bytes());
        buf[0x3a..0x3c].copy_from_slice(&shentsize.to_le_bytes());
        buf[0x3c..0x3e].copy_from_slice(&shnum.to_le_bytes());
        buf
    }

    #[test]
    fn tail_offset_sums_shoff_and_section_table_size() {
        let mut tmp = NamedTempFile::new().unwrap();
        let header = minimal_elf64(64, 64, 3);
        tmp.write_all(&header).unwrap();
        let offset = tail_offset(tmp.path()).unwrap();
        assert_eq!(offset, 64 + 64 * 3);
    }

    #[test]
    fn tail_offset_rejects_non_elf() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 64]).unwrap();
        assert!(tail_offset(tmp.path()).is_err());
    }

    #[test]
    fn sized_tool_round_trips_through_size_prefix() {
        let mut tmp = NamedTempFile::new().unwrap();
        let body = b"#!/bin/sh\necho hi\n";
        tmp.write_all(&(body.len() as u64).to_le_bytes()).unwrap();
        tmp.write_all(body).unwrap();
        let mut file = tmp.reopen().unwrap();
        let (read_body, next) = read_sized_tool(&mut file, 0).unwrap();
        assert_eq!(read_body, body);
        assert_eq!(next, 8 + body.len() as u64);
    }

    #[test]
    fn applet_symlinks_all_point_at_busybox() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("busybox"), b"stub").unwrap();
        let sbin = dir.path().join("sbin");
        create_applet_symlinks(dir.path(), &sbin).unwrap();
        for applet in BUSYBOX_APPLETS {
            let link = sbin.join(applet);
            assert_eq!(
                std::fs::read_link(&link).unwrap(),
                dir.path().join("busybox")
            );
        }
    }
}
