//! `fim-remote` recipe-repository URL record.
//!
//! A JSON object with a single `url` key, stored in the reserved region's
//! "remote" blob (`reserved::read_remote`/`write_remote`). The record is
//! conceptually a bare UTF-8 string; this implementation keeps a JSON
//! envelope around it so the same blob a future recipe-fetch feature reads
//! stays self-describing (see DESIGN.md, "remote record shape").

use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RemoteRecord {
    #[serde(default)]
    url: String,
}

pub fn decode(blob: &[u8]) -> FlatimageResult<Option<String>> {
    if blob.is_empty() {
        return Ok(None);
    }
    let record: RemoteRecord = serde_json::from_slice(blob).map_err(FlatimageError::from)?;
    if record.url.is_empty() {
        Ok(None)
    } else {
        Ok(Some(record.url))
    }
}

pub fn encode(url: &str) -> FlatimageResult<Vec<u8>> {
    serde_json::to_vec(&RemoteRecord { url: url.to_string() }).map_err(FlatimageError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_decodes_to_none() {
        assert_eq!(decode(&[]).unwrap(), None);
    }

    #[test]
    fn round_trips_through_json_envelope() {
        let blob = encode("https://recipes.example/repo").unwrap();
        assert_eq!(decode(&blob).unwrap(), Some("https://recipes.example/repo".to_string()));
    }
}
