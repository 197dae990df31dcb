//! `fim-boot` default-launch record.
//!
//! A JSON object of `program` and `args`, stored in the reserved region's "boot"
//! blob (`reserved::read_boot`/`write_boot`).

use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootRecord {
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

pub fn decode(blob: &[u8]) -> FlatimageResult<BootRecord> {
    if blob.is_empty() {
        return Ok(BootRecord::default());
    }
    serde_json::from_slice(blob).map_err(FlatimageError::from)
}

pub fn encode(record: &BootRecord) -> FlatimageResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(FlatimageError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_decodes_to_default() {
        assert_eq!(decode(&[]).unwrap(), BootRecord::default());
    }

    #[test]
    fn round_trips_program_and_args() {
        let record = BootRecord { program: "bash".into(), args: vec!["-c".into(), "echo hi".into()] };
        let blob = encode(&record).unwrap();
        assert_eq!(decode(&blob).unwrap(), record);
    }
}
