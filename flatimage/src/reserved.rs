//! Reserved-region codec.
//!
//! The reserved region is a flat byte range at a fixed offset inside the ELF,
//! holding one record per [`ReservedRecord`] variant back-to-back in the
//! order declared in `flatimage_shared::constants::reserved`. Every record
//! has a fixed size so its offset is `sum of the sizes of every record
//! declared before it` — see [`offsets`].

use flatimage_shared::constants::reserved;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// One entry of the reserved region, tagged by which fixed sub-range it
/// occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservedRecord {
    Permissions(u64),
    Notify(bool),
    Desktop(Vec<u8>),
    Icon { size: u64, ext: [u8; 4], bytes: Vec<u8> },
    Casefold(bool),
    Overlay(OverlayByte),
    Boot(Vec<u8>),
    Environment(Vec<u8>),
    Remote(Vec<u8>),
    Unshare(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayByte {
    Stacking,
    OverlayFs,
    UnionFs,
}

impl OverlayByte {
    pub fn from_byte(b: u8) -> FlatimageResult<Self> {
        match b {
            0 => Ok(OverlayByte::Stacking),
            1 => Ok(OverlayByte::OverlayFs),
            2 => Ok(OverlayByte::UnionFs),
            other => Err(FlatimageError::ReservedRegion(format!(
                "invalid overlay byte: {other}"
            ))),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            OverlayByte::Stacking => 0,
            OverlayByte::OverlayFs => 1,
            OverlayByte::UnionFs => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlayByte::Stacking => "stacking",
            OverlayByte::OverlayFs => "overlayfs",
            OverlayByte::UnionFs => "unionfs",
        }
    }
}

/// Absolute byte offsets of each record inside the reserved region,
/// relative to the region's own start (not the file's). Declared in the
/// same order as `flatimage_shared::constants::reserved` so adding a new
/// record at the end never reshuffles the others.
pub mod offsets {
    use flatimage_shared::constants::reserved::*;

    pub const PERMISSIONS: u64 = 0;
    pub const NOTIFY: u64 = PERMISSIONS + PERMISSIONS_SIZE;
    pub const DESKTOP: u64 = NOTIFY + NOTIFY_SIZE;
    pub const ICON: u64 = DESKTOP + DESKTOP_SIZE;
    pub const CASEFOLD: u64 = ICON + ICON_EXT_FIELD + ICON_SIZE_FIELD + ICON_SIZE;
    pub const OVERLAY: u64 = CASEFOLD + CASEFOLD_SIZE;
    pub const BOOT: u64 = OVERLAY + OVERLAY_SIZE;
    pub const ENVIRONMENT: u64 = BOOT + BOOT_SIZE;
    pub const REMOTE: u64 = ENVIRONMENT + ENVIRONMENT_SIZE;
    pub const UNSHARE: u64 = REMOTE + REMOTE_SIZE;
    pub const TOTAL_SIZE: u64 = UNSHARE + UNSHARE_SIZE;
}

/// A window onto the reserved region of one ELF file, anchored at
/// `region_start` (the file offset computed by [`crate::elf::tail_offset`]
/// plus the layer-chain length).
pub struct ReservedRegion<'a> {
    file: &'a mut std::fs::File,
    region_start: u64,
}

impl<'a> ReservedRegion<'a> {
    pub fn new(file: &'a mut std::fs::File, region_start: u64) -> Self {
        ReservedRegion { file, region_start }
    }

    fn seek_to(&mut self, offset: u64) -> FlatimageResult<()> {
        self.file
            .seek(SeekFrom::Start(self.region_start + offset))?;
        Ok(())
    }

    pub fn read_permissions(&mut self) -> FlatimageResult<u64> {
        self.seek_to(offsets::PERMISSIONS)?;
        let mut buf = [0u8; 8];
        self.file.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_permissions(&mut self, value: u64) -> FlatimageResult<()> {
        self.seek_to(offsets::PERMISSIONS)?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn read_unshare(&mut self) -> FlatimageResult<u16> {
        self.seek_to(offsets::UNSHARE)?;
        let mut buf = [0u8; 2];
        self.file.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn write_unshare(&mut self, value: u16) -> FlatimageResult<()> {
        self.seek_to(offsets::UNSHARE)?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn read_casefold(&mut self) -> FlatimageResult<bool> {
        self.seek_to(offsets::CASEFOLD)?;
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }

    pub fn write_casefold(&mut self, value: bool) -> FlatimageResult<()> {
        self.seek_to(offsets::CASEFOLD)?;
        self.file.write_all(&[value as u8])?;
        Ok(())
    }

    pub fn read_overlay(&mut self) -> FlatimageResult<OverlayByte> {
        self.seek_to(offsets::OVERLAY)?;
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf)?;
        OverlayByte::from_byte(buf[0])
    }

    pub fn write_overlay(&mut self, value: OverlayByte) -> FlatimageResult<()> {
        self.seek_to(offsets::OVERLAY)?;
        self.file.write_all(&[value.to_byte()])?;
        Ok(())
    }

    /// Read a fixed-size NUL-trimmed byte blob record (desktop/boot/environment/remote).
    fn read_blob(&mut self, offset: u64, size: u64) -> FlatimageResult<Vec<u8>> {
        self.seek_to(offset)?;
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact(&mut buf)?;
        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            buf.truncate(nul);
        }
        Ok(buf)
    }

    fn write_blob(&mut self, offset: u64, size: u64, data: &[u8]) -> FlatimageResult<()> {
        if data.len() as u64 > size {
            return Err(FlatimageError::ReservedRegion(format!(
                "blob of {} bytes does not fit in {}-byte record",
                data.len(),
                size
            )));
        }
        self.seek_to(offset)?;
        self.file.write_all(data)?;
        let padding = size - data.len() as u64;
        self.file.write_all(&vec![0u8; padding as usize])?;
        Ok(())
    }

    pub fn read_desktop(&mut self) -> FlatimageResult<Vec<u8>> {
        self.read_blob(offsets::DESKTOP, reserved::DESKTOP_SIZE)
    }

    pub fn write_desktop(&mut self, data: &[u8]) -> FlatimageResult<()> {
        self.write_blob(offsets::DESKTOP, reserved::DESKTOP_SIZE, data)
    }

    pub fn read_boot(&mut self) -> FlatimageResult<Vec<u8>> {
        self.read_blob(offsets::BOOT, reserved::BOOT_SIZE)
    }

    pub fn write_boot(&mut self, data: &[u8]) -> FlatimageResult<()> {
        self.write_blob(offsets::BOOT, reserved::BOOT_SIZE, data)
    }

    pub fn read_environment(&mut self) -> FlatimageResult<Vec<u8>> {
        self.read_blob(offsets::ENVIRONMENT, reserved::ENVIRONMENT_SIZE)
    }

    pub fn write_environment(&mut self, data: &[u8]) -> FlatimageResult<()> {
        self.write_blob(offsets::ENVIRONMENT, reserved::ENVIRONMENT_SIZE, data)
    }

    pub fn read_notify(&mut self) -> FlatimageResult<bool> {
        self.seek_to(offsets::NOTIFY)?;
        let mut buf = [0u8; 1];
        self.file.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }

    pub fn write_notify(&mut self, value: bool) -> FlatimageResult<()> {
        self.seek_to(offsets::NOTIFY)?;
        self.file.write_all(&[value as u8])?;
        Ok(())
    }

    pub fn read_remote(&mut self) -> FlatimageResult<Vec<u8>> {
        self.read_blob(offsets::REMOTE, reserved::REMOTE_SIZE)
    }

    pub fn write_remote(&mut self, data: &[u8]) -> FlatimageResult<()> {
        self.write_blob(offsets::REMOTE, reserved::REMOTE_SIZE, data)
    }

    /// Read the icon record: a 4-byte NUL-trimmed extension ("png"/"svg"),
    /// an explicit `u64` size, then that many bytes of image data.
    pub fn read_icon(&mut self) -> FlatimageResult<(String, Vec<u8>)> {
        self.seek_to(offsets::ICON)?;
        let mut ext_buf = [0u8; reserved::ICON_EXT_FIELD as usize];
        self.file.read_exact(&mut ext_buf)?;
        let ext_len = ext_buf.iter().position(|&b| b == 0).unwrap_or(ext_buf.len());
        let ext = String::from_utf8_lossy(&ext_buf[..ext_len]).into_owned();

        let mut size_buf = [0u8; 8];
        self.file.read_exact(&mut size_buf)?;
        let size = u64::from_le_bytes(size_buf);

        let max = reserved::ICON_SIZE;
        if size > max {
            return Err(FlatimageError::ReservedRegion(format!(
                "icon size {size} exceeds the {max}-byte record"
            )));
        }
        let mut bytes = vec![0u8; size as usize];
        self.file.read_exact(&mut bytes)?;
        Ok((ext, bytes))
    }

    pub fn write_icon(&mut self, ext: &str, data: &[u8]) -> FlatimageResult<()> {
        if ext.len() as u64 > reserved::ICON_EXT_FIELD {
            return Err(FlatimageError::ReservedRegion(format!(
                "extension '{ext}' does not fit the {}-byte field",
                reserved::ICON_EXT_FIELD
            )));
        }
        if data.len() as u64 > reserved::ICON_SIZE {
            return Err(FlatimageError::ReservedRegion(format!(
                "icon of {} bytes does not fit in {}-byte record",
                data.len(),
                reserved::ICON_SIZE
            )));
        }
        self.seek_to(offsets::ICON)?;
        let mut ext_buf = vec![0u8; reserved::ICON_EXT_FIELD as usize];
        ext_buf[..ext.len()].copy_from_slice(ext.as_bytes());
        self.file.write_all(&ext_buf)?;
        self.file.write_all(&(data.len() as u64).to_le_bytes())?;
        self.file.write_all(data)?;
        let padding = reserved::ICON_SIZE - data.len() as u64;
        self.file.write_all(&vec![0u8; padding as usize])?;
        Ok(())
    }
}

/// Open `elf_path` and return a [`ReservedRegion`] anchored at `region_start`.
pub fn open(elf_path: &Path, region_start: u64) -> FlatimageResult<std::fs::File> {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(elf_path)
        .map_err(FlatimageError::from)
        .and_then(|f| {
            if region_start == 0 {
                Err(FlatimageError::ReservedRegion(
                    "region_start must be non-zero".into(),
                ))
            } else {
                Ok(f)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn scratch_file() -> std::fs::File {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; offsets::TOTAL_SIZE as usize + 64])
            .unwrap();
        tmp.into_file()
    }

    #[test]
    fn permissions_round_trip() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 32);
        region.write_permissions(0b1010).unwrap();
        assert_eq!(region.read_permissions().unwrap(), 0b1010);
    }

    #[test]
    fn overlay_byte_rejects_out_of_range_value() {
        assert!(OverlayByte::from_byte(9).is_err());
        assert_eq!(OverlayByte::from_byte(0).unwrap(), OverlayByte::Stacking);
    }

    #[test]
    fn desktop_blob_round_trips_and_trims_nul_padding() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 0);
        region.write_desktop(b"[Desktop Entry]\n").unwrap();
        assert_eq!(region.read_desktop().unwrap(), b"[Desktop Entry]\n");
    }

    #[test]
    fn blob_larger_than_record_is_rejected() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 0);
        let oversized = vec![1u8; reserved::DESKTOP_SIZE as usize + 1];
        assert!(region.write_desktop(&oversized).is_err());
    }

    #[test]
    fn casefold_and_overlay_are_independent_single_bytes() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 0);
        region.write_casefold(true).unwrap();
        region.write_overlay(OverlayByte::UnionFs).unwrap();
        assert!(region.read_casefold().unwrap());
        assert_eq!(region.read_overlay().unwrap(), OverlayByte::UnionFs);
    }

    #[test]
    fn notify_round_trips_independent_of_casefold() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 0);
        region.write_notify(true).unwrap();
        region.write_casefold(false).unwrap();
        assert!(region.read_notify().unwrap());
        assert!(!region.read_casefold().unwrap());
    }

    #[test]
    fn icon_round_trips_extension_and_bytes() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 0);
        region.write_icon("png", b"\x89PNG fake").unwrap();
        let (ext, bytes) = region.read_icon().unwrap();
        assert_eq!(ext, "png");
        assert_eq!(bytes, b"\x89PNG fake");
    }

    #[test]
    fn icon_rejects_oversized_extension() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 0);
        assert!(region.write_icon("toolong", b"x").is_err());
    }

    #[test]
    fn remote_blob_round_trips_and_trims_nul_padding() {
        let mut file = scratch_file();
        let mut region = ReservedRegion::new(&mut file, 0);
        region.write_remote(b"https://recipes.example/repo").unwrap();
        assert_eq!(region.read_remote().unwrap(), b"https://recipes.example/repo");
    }
}
