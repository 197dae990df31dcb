//! Layer discovery and the appended-layer chain.
//!
//! Starting at the reserved region's end, each layer is a
//! `u64`-LE size prefix followed by a magic-tagged dwarfs blob; reading
//! stops at the first size read failure or magic mismatch. External layers named by `FIM_DIRS_LAYER`/`FIM_FILES_LAYER`
//! are appended after the embedded chain.

use flatimage_shared::constants::LAYER_MAGIC;
use flatimage_shared::errors::FlatimageResult;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// One layer in the mounted stack: either embedded in the ELF at a byte
/// range, or an external dwarfs file.
#[derive(Debug, Clone)]
pub enum LayerSource {
    Embedded { file: PathBuf, offset: u64, size: u64 },
    External { file: PathBuf },
}

/// Check the 6-byte magic at the start of a (possibly offset) dwarfs blob.
pub fn is_dwarfs(path: &Path, offset: u64) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    if file.seek(SeekFrom::Start(offset)).is_err() {
        return false;
    }
    let mut magic = [0u8; 6];
    file.read_exact(&mut magic).is_ok() && &magic == LAYER_MAGIC
}

/// Walk the embedded layer chain starting at `chain_start`, stopping at the
/// first unreadable size prefix or magic mismatch. Returns the discovered
/// layers plus the offset one past the last one read.
pub fn discover_embedded(elf_path: &Path, chain_start: u64) -> FlatimageResult<(Vec<LayerSource>, u64)> {
    let mut file = File::open(elf_path)?;
    let mut offset = chain_start;
    let mut layers = Vec::new();

    loop {
        file.seek(SeekFrom::Start(offset))?;
        let mut size_buf = [0u8; 8];
        if file.read_exact(&mut size_buf).is_err() {
            break;
        }
        let size = u64::from_le_bytes(size_buf);
        let body_offset = offset + 8;
        if !is_dwarfs(elf_path, body_offset) {
            break;
        }
        layers.push(LayerSource::Embedded {
            file: elf_path.to_path_buf(),
            offset: body_offset,
            size,
        });
        offset = body_offset + size;
    }

    Ok((layers, offset))
}

/// Expand `FIM_DIRS_LAYER` (colon-separated directories, every file inside
/// treated as one external layer) and `FIM_FILES_LAYER` (colon-separated
/// files) into a flat list, in that order.
pub fn discover_external(dirs_layer: Option<&str>, files_layer: Option<&str>) -> FlatimageResult<Vec<LayerSource>> {
    let mut layers = Vec::new();

    if let Some(dirs) = dirs_layer {
        for dir in dirs.split(':').filter(|s| !s.is_empty()) {
            let dir_path = PathBuf::from(dir);
            let Ok(entries) = std::fs::read_dir(&dir_path) else {
                continue;
            };
            let mut files: Vec<_> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
            files.sort();
            for file in files {
                if file.is_file() && is_dwarfs(&file, 0) {
                    layers.push(LayerSource::External { file });
                }
            }
        }
    }

    if let Some(files) = files_layer {
        for file in files.split(':').filter(|s| !s.is_empty()) {
            let path = PathBuf::from(file);
            if is_dwarfs(&path, 0) {
                layers.push(LayerSource::External { file: path });
            }
        }
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn dwarfs_blob(payload: &[u8]) -> Vec<u8> {
        let mut v = LAYER_MAGIC.to_vec();
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn discovers_two_chained_embedded_layers() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let layer_a = dwarfs_blob(b"aaaa");
        let layer_b = dwarfs_blob(b"bbbbbb");
        tmp.write_all(&(layer_a.len() as u64).to_le_bytes()).unwrap();
        tmp.write_all(&layer_a).unwrap();
        tmp.write_all(&(layer_b.len() as u64).to_le_bytes()).unwrap();
        tmp.write_all(&layer_b).unwrap();

        let (layers, end) = discover_embedded(tmp.path(), 0).unwrap();
        assert_eq!(layers.len(), 2);
        let total = 8 + layer_a.len() as u64 + 8 + layer_b.len() as u64;
        assert_eq!(end, total);
    }

    #[test]
    fn stops_at_bad_magic_without_erroring() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let bad = b"NOTMAGIC".to_vec();
        tmp.write_all(&(bad.len() as u64).to_le_bytes()).unwrap();
        tmp.write_all(&bad).unwrap();

        let (layers, end) = discover_embedded(tmp.path(), 0).unwrap();
        assert!(layers.is_empty());
        assert_eq!(end, 0);
    }

    #[test]
    fn external_dirs_layer_lists_dwarfs_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.dwarfs");
        std::fs::write(&good, dwarfs_blob(b"x")).unwrap();
        let bad = dir.path().join("b.txt");
        std::fs::write(&bad, b"not dwarfs").unwrap();

        let layers = discover_external(Some(dir.path().to_str().unwrap()), None).unwrap();
        assert_eq!(layers.len(), 1);
    }
}
