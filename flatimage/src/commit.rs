//! Layer commit: snapshot the writable upper directory into a new layer
//! appended to the ELF.
//!
//! The compression-tool invocation shape and the magic-validated
//! length-prefixed append format this mirrors on read.

use flatimage_shared::constants::{DEFAULT_COMPRESSION_LEVEL, LAYER_MAGIC};
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTarget<'a> {
    /// Append to the running ELF.
    SelfAppend,
    /// Write to a standalone layer file.
    StandaloneFile(&'a Path),
    /// Write to the per-app data directory with an incremented name.
    DataDir(&'a Path),
}

pub struct CommitOptions<'a> {
    pub upper: PathBuf,
    pub elf_path: PathBuf,
    pub target: CommitTarget<'a>,
    pub level: u8,
    pub compressor: &'a str,
}

impl<'a> CommitOptions<'a> {
    pub fn clamped_level(&self) -> u8 {
        self.level.min(9)
    }
}

impl Default for CommitOptions<'static> {
    fn default() -> Self {
        CommitOptions {
            upper: PathBuf::new(),
            elf_path: PathBuf::new(),
            target: CommitTarget::SelfAppend,
            level: DEFAULT_COMPRESSION_LEVEL,
            compressor: "mkdwarfs",
        }
    }
}

/// Walk `upper`, selecting entries eligible for the compression input list:
/// regular files, symlinks, and empty directories. Non-traversable
/// directories are skipped and logged rather than failing the walk.
fn collect_input_list(upper: &Path) -> FlatimageResult<Vec<PathBuf>> {
    let mut list = Vec::new();
    for entry in walkdir::WalkDir::new(upper).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping non-traversable directory entry");
                continue;
            }
        };
        let path = entry.path();
        let file_type = entry.file_type();
        if file_type.is_file() || file_type.is_symlink() {
            list.push(path.to_path_buf());
        } else if file_type.is_dir() {
            let is_empty = fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(false);
            if is_empty {
                list.push(path.to_path_buf());
            }
        }
    }
    Ok(list)
}

fn write_input_list(entries: &[PathBuf], dest: &Path) -> FlatimageResult<()> {
    let mut file = fs::File::create(dest)?;
    for entry in entries {
        writeln!(file, "{}", entry.display())?;
    }
    Ok(())
}

/// Invoke the external compressor to build a layer image from `upper`,
/// validate its magic, and return its path.
fn build_layer_image(opts: &CommitOptions) -> FlatimageResult<PathBuf> {
    let entries = collect_input_list(&opts.upper)?;
    let tmp_dir = tempfile::tempdir()?;
    let list_path = tmp_dir.path().join("input.list");
    write_input_list(&entries, &list_path)?;

    let layer_path = tmp_dir.path().join("commit.layer");
    let level = opts.clamped_level();

    let status = Command::new(opts.compressor)
        .arg("-f")
        .arg("-i")
        .arg(&opts.upper)
        .arg("-o")
        .arg(&layer_path)
        .arg("-l")
        .arg(level.to_string())
        .arg("--input-list")
        .arg(&list_path)
        .status()
        .map_err(FlatimageError::from)?;

    if !status.success() {
        return Err(FlatimageError::Commit(format!(
            "{} exited with status {:?}",
            opts.compressor,
            status.code()
        )));
    }

    let mut magic = [0u8; 6];
    let mut file = fs::File::open(&layer_path)?;
    file.read_exact(&mut magic).map_err(|_| {
        FlatimageError::Commit("produced layer is smaller than the magic header".into())
    })?;
    if &magic != LAYER_MAGIC {
        return Err(FlatimageError::Commit(
            "produced layer does not start with the expected magic".into(),
        ));
    }

    // tempdir drops at end of build_layer_image's caller scope; persist the file.
    let persisted = opts.upper.with_extension("commit.layer.tmp");
    fs::copy(&layer_path, &persisted)?;
    Ok(persisted)
}

/// Append `layer_path`'s contents to `dest` as `<size:u64 LE><bytes>`.
fn append_layer(dest: &Path, layer_path: &Path) -> FlatimageResult<()> {
    let bytes = fs::read(layer_path)?;
    let mut out = fs::OpenOptions::new().append(true).open(dest)?;
    out.write_all(&(bytes.len() as u64).to_le_bytes())?;
    out.write_all(&bytes)?;
    Ok(())
}

/// Remove the files/symlinks that were included in the committed layer from
/// the upper directory, then prune any parent directories left empty.
fn prune_upper(upper: &Path, entries: &[PathBuf]) -> FlatimageResult<()> {
    for entry in entries {
        let meta = fs::symlink_metadata(entry);
        if let Ok(meta) = meta {
            if meta.is_dir() {
                let _ = fs::remove_dir(entry);
            } else {
                let _ = fs::remove_file(entry);
            }
        }
    }
    let mut dirs: Vec<&Path> = entries.iter().map(|p| p.as_path()).collect();
    dirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    for mut dir in dirs {
        while let Some(parent) = dir.parent() {
            if parent == upper || !parent.starts_with(upper) {
                break;
            }
            if fs::read_dir(parent).map(|mut d| d.next().is_none()).unwrap_or(false) {
                let _ = fs::remove_dir(parent);
            }
            dir = parent;
        }
    }
    Ok(())
}

/// Execute a full commit: build the layer, append/write it per `target`,
/// then prune the upper directory of everything that was captured.
pub fn commit(opts: &CommitOptions) -> FlatimageResult<PathBuf> {
    let entries = collect_input_list(&opts.upper)?;
    let layer_path = build_layer_image(opts)?;

    let written_to = match opts.target {
        CommitTarget::SelfAppend => {
            append_layer(&opts.elf_path, &layer_path)?;
            opts.elf_path.clone()
        }
        CommitTarget::StandaloneFile(dest) => {
            fs::copy(&layer_path, dest)?;
            dest.to_path_buf()
        }
        CommitTarget::DataDir(dir) => {
            fs::create_dir_all(dir)?;
            let next = next_incremented_name(dir)?;
            fs::copy(&layer_path, &next)?;
            next
        }
    };

    let _ = fs::remove_file(&layer_path);
    prune_upper(&opts.upper, &entries)?;
    Ok(written_to)
}

/// Build a standalone layer from `upper` without touching it afterward —
/// `fim-layer create`, as opposed to `commit`'s snapshot-then-prune.
pub fn create_layer_file(opts: &CommitOptions) -> FlatimageResult<PathBuf> {
    let layer_path = build_layer_image(opts)?;
    let written_to = match opts.target {
        CommitTarget::SelfAppend => {
            append_layer(&opts.elf_path, &layer_path)?;
            opts.elf_path.clone()
        }
        CommitTarget::StandaloneFile(dest) => {
            fs::copy(&layer_path, dest)?;
            dest.to_path_buf()
        }
        CommitTarget::DataDir(dir) => {
            fs::create_dir_all(dir)?;
            let next = next_incremented_name(dir)?;
            fs::copy(&layer_path, &next)?;
            next
        }
    };
    let _ = fs::remove_file(&layer_path);
    Ok(written_to)
}

/// Append an existing standalone layer file to `elf_path` — `fim-layer add`.
pub fn add_existing_layer(elf_path: &Path, layer_path: &Path) -> FlatimageResult<()> {
    let mut magic = [0u8; 6];
    let mut file = fs::File::open(layer_path)?;
    file.read_exact(&mut magic)
        .map_err(|_| FlatimageError::Commit("layer file is smaller than the magic header".into()))?;
    if &magic != LAYER_MAGIC {
        return Err(FlatimageError::Commit(
            "layer file does not start with the expected magic".into(),
        ));
    }
    append_layer(elf_path, layer_path)
}

fn next_incremented_name(dir: &Path) -> FlatimageResult<PathBuf> {
    let mut max_index = 0u64;
    if let Ok(read) = fs::read_dir(dir) {
        for entry in read.flatten() {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Some(num) = stem.strip_prefix("layer_") {
                    if let Ok(n) = num.parse::<u64>() {
                        max_index = max_index.max(n);
                    }
                }
            }
        }
    }
    Ok(dir.join(format!("layer_{}.dwarfs", max_index + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_clamped_to_nine() {
        let opts = CommitOptions {
            level: 12,
            ..CommitOptions::default()
        };
        assert_eq!(opts.clamped_level(), 9);
    }

    #[test]
    fn next_incremented_name_starts_at_one_for_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let name = next_incremented_name(dir.path()).unwrap();
        assert_eq!(name, dir.path().join("layer_1.dwarfs"));
    }

    #[test]
    fn next_incremented_name_continues_from_existing_max() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("layer_1.dwarfs"), b"x").unwrap();
        fs::write(dir.path().join("layer_3.dwarfs"), b"x").unwrap();
        let name = next_incremented_name(dir.path()).unwrap();
        assert_eq!(name, dir.path().join("layer_4.dwarfs"));
    }

    #[test]
    fn collect_input_list_includes_files_symlinks_and_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::create_dir(dir.path().join("nonempty")).unwrap();
        fs::write(dir.path().join("nonempty/b.txt"), b"hi").unwrap();
        let entries = collect_input_list(dir.path()).unwrap();
        assert!(entries.iter().any(|p| p.ends_with("a.txt")));
        assert!(entries.iter().any(|p| p.ends_with("empty")));
        assert!(!entries.iter().any(|p| p.ends_with("nonempty") && p.is_dir() && fs::read_dir(p).unwrap().next().is_some()));
    }
}
