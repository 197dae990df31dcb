//! `fim-bind` persistence.
//!
//! User-defined bindings have no fixed reserved-region slot — they live
//! only in "the JSON bind DB" with no storage location mandated elsewhere.
//! This implementation persists them as a JSON file in the instance's
//! config directory (`Layout::dir_config`), next to the other per-install
//! state kept outside the packed ELF (see DESIGN.md, "bind DB location").

use crate::jailer::config::BindEntry;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::path::Path;

const FILE_NAME: &str = "binds.json";

fn db_path(config_dir: &Path) -> std::path::PathBuf {
    config_dir.join(FILE_NAME)
}

pub fn load(config_dir: &Path) -> FlatimageResult<Vec<BindEntry>> {
    let path = db_path(config_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read(&path)?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&data).map_err(FlatimageError::from)
}

pub fn save(config_dir: &Path, entries: &[BindEntry]) -> FlatimageResult<()> {
    std::fs::create_dir_all(config_dir)?;
    let data = serde_json::to_vec_pretty(entries)?;
    std::fs::write(db_path(config_dir), data)?;
    Ok(())
}

pub fn add(config_dir: &Path, entry: BindEntry) -> FlatimageResult<()> {
    let mut entries = load(config_dir)?;
    entries.retain(|e| e.dst != entry.dst);
    entries.push(entry);
    save(config_dir, &entries)
}

/// Removes every binding whose destination matches `dst`, returning
/// whether anything was removed.
pub fn del(config_dir: &Path, dst: &Path) -> FlatimageResult<bool> {
    let mut entries = load(config_dir)?;
    let before = entries.len();
    entries.retain(|e| e.dst != dst);
    let removed = entries.len() != before;
    save(config_dir, &entries)?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jailer::config::BindKind;

    fn entry(dst: &str) -> BindEntry {
        BindEntry { kind: BindKind::Ro, src: "/host".into(), dst: dst.into() }
    }

    #[test]
    fn missing_db_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn add_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        add(dir.path(), entry("/guest/a")).unwrap();
        let entries = load(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dst, Path::new("/guest/a"));
    }

    #[test]
    fn add_replaces_existing_entry_with_same_destination() {
        let dir = tempfile::tempdir().unwrap();
        add(dir.path(), entry("/guest/a")).unwrap();
        add(dir.path(), BindEntry { kind: BindKind::Rw, src: "/other".into(), dst: "/guest/a".into() }).unwrap();
        let entries = load(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, BindKind::Rw);
    }

    #[test]
    fn del_reports_whether_anything_was_removed() {
        let dir = tempfile::tempdir().unwrap();
        add(dir.path(), entry("/guest/a")).unwrap();
        assert!(del(dir.path(), Path::new("/guest/a")).unwrap());
        assert!(!del(dir.path(), Path::new("/guest/a")).unwrap());
    }
}
