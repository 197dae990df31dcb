//! `fim-env` key/value store.
//!
//! A flat map of assignments injected into the sandboxed process's
//! environment on boot. The reserved-region "environment" record
//! (`reserved::read_environment`/`write_environment`) already carries a raw
//! byte blob sized for this purpose; this module is the JSON codec and the
//! add/del/set/clear/list operations on top of it.

use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::collections::BTreeMap;

/// Environment assignments, ordered for stable `list` output.
pub type EnvMap = BTreeMap<String, String>;

pub fn decode(blob: &[u8]) -> FlatimageResult<EnvMap> {
    if blob.is_empty() {
        return Ok(EnvMap::new());
    }
    serde_json::from_slice(blob).map_err(FlatimageError::from)
}

pub fn encode(map: &EnvMap) -> FlatimageResult<Vec<u8>> {
    serde_json::to_vec(map).map_err(FlatimageError::from)
}

pub fn set(map: &mut EnvMap, key: &str, value: &str) {
    map.insert(key.to_string(), value.to_string());
}

pub fn del(map: &mut EnvMap, key: &str) -> bool {
    map.remove(key).is_some()
}

pub fn clear(map: &mut EnvMap) {
    map.clear();
}

/// `fim-env list` output: `KEY=VALUE` lines, sorted by key.
pub fn list(map: &EnvMap) -> Vec<String> {
    map.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_decodes_to_empty_map() {
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn round_trips_through_json_encoding() {
        let mut map = EnvMap::new();
        set(&mut map, "LANG", "en_US.UTF-8");
        set(&mut map, "DEBUG", "1");
        let blob = encode(&map).unwrap();
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn list_is_sorted_by_key() {
        let mut map = EnvMap::new();
        set(&mut map, "ZETA", "1");
        set(&mut map, "ALPHA", "2");
        assert_eq!(list(&map), vec!["ALPHA=2".to_string(), "ZETA=1".to_string()]);
    }

    #[test]
    fn del_reports_whether_key_existed() {
        let mut map = EnvMap::new();
        set(&mut map, "FOO", "bar");
        assert!(del(&mut map, "FOO"));
        assert!(!del(&mut map, "FOO"));
    }

    #[test]
    fn clear_empties_the_map() {
        let mut map = EnvMap::new();
        set(&mut map, "FOO", "bar");
        clear(&mut map);
        assert!(map.is_empty());
    }
}
