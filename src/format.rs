// SPDX-License-Identifier: MIT
//! On-disk container format
//!
//! Defines the marker sequences and the fixed-width entry record used by the
//! header table.

use sha2::{Digest, Sha256};

use crate::error::{ContainerError, Result};

/// Marker preceding the header table: "BHS"
pub const HEADERS_MAGIC: &[u8; 3] = b"BHS";

/// Marker preceding the blob region: "BFS"
pub const STORAGE_MAGIC: &[u8; 3] = b"BFS";

/// Length of either marker
pub const MAGIC_LEN: usize = 3;

/// Encoded entry record size in bytes
pub const HEADER_SIZE: usize = 64;

/// Width of the zero-padded filename field
pub const FILENAME_LEN: usize = 16;

/// Checksum size in bytes (SHA-256)
pub const CHECKSUM_LEN: usize = 32;

/// SHA-256 digest of one blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    /// Compute the digest of `data`
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; CHECKSUM_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Check that a logical filename fits the fixed-width field.
///
/// Names must be non-empty, must not contain NUL (it is the padding byte) and
/// must be at most [`FILENAME_LEN`] bytes. Long names are rejected rather than
/// truncated.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ContainerError::InvalidFilename("empty filename".to_string()));
    }
    if name.contains('\0') {
        return Err(ContainerError::InvalidFilename(format!(
            "{:?} contains a NUL byte",
            name
        )));
    }
    if name.len() > FILENAME_LEN {
        return Err(ContainerError::FilenameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    Ok(())
}

/// Strictly decode a zero-padded filename field.
///
/// Unlike [`EntryRecord::from_bytes`], which always yields a printable name,
/// this fails when the field does not hold a name that [`validate_filename`]
/// accepts and that encodes back to the same bytes.
pub fn decode_filename(field: &[u8]) -> Result<String> {
    let name_len = field
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    let name = std::str::from_utf8(&field[..name_len]).map_err(|e| {
        ContainerError::InvalidFilename(format!("filename field is not UTF-8: {}", e))
    })?;
    validate_filename(name)?;
    Ok(name.to_string())
}

/// Descriptor of one persisted blob (64 bytes on disk, little-endian)
///
/// ```text
/// [0:16)  filename, zero-padded
/// [16:24) size (u64)
/// [24:32) offset (u64), absolute position in the image
/// [32:64) SHA-256 checksum
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub filename: String,
    pub size: u64,
    pub offset: u64,
    pub checksum: Checksum,
}

impl EntryRecord {
    /// Describe `data` stored at `offset`
    pub fn for_blob(filename: impl Into<String>, offset: u64, data: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            size: data.len() as u64,
            offset,
            checksum: Checksum::of(data),
        }
    }

    /// Decode a record from its fixed-width form.
    ///
    /// Trailing zero bytes of the filename field are padding and are trimmed.
    /// No other validation happens here; offsets and sizes are untrusted until
    /// the entry table checks them against the image.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let name_field = &bytes[0..FILENAME_LEN];
        let name_len = name_field
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        let filename = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[16..24]);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&bytes[24..32]);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[32..64]);

        Self {
            filename,
            size: u64::from_le_bytes(size),
            offset: u64::from_le_bytes(offset),
            checksum: Checksum(checksum),
        }
    }

    /// Decode a record from a slice that must be exactly [`HEADER_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let fixed: &[u8; HEADER_SIZE] = bytes.try_into().map_err(|_| {
            ContainerError::CorruptHeaderRegion(format!(
                "Header must be {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(fixed))
    }

    /// Encode to the fixed-width form
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE]> {
        let name = self.filename.as_bytes();
        if name.len() > FILENAME_LEN {
            return Err(ContainerError::FilenameTooLong {
                name: self.filename.clone(),
                len: name.len(),
            });
        }

        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..name.len()].copy_from_slice(name);
        bytes[16..24].copy_from_slice(&self.size.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.offset.to_le_bytes());
        bytes[32..64].copy_from_slice(&self.checksum.0);

        Ok(bytes)
    }

    /// Append the encoded record to `buffer`
    #[inline]
    pub fn write_to_buffer(&self, buffer: &mut Vec<u8>) -> Result<()> {
        let bytes = self.to_bytes()?;
        buffer.extend_from_slice(&bytes);
        Ok(())
    }

    /// Absolute end position of the blob, `None` on overflow
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    /// Whether `checksum` matches this record
    #[inline]
    pub fn valid_checksum(&self, checksum: &Checksum) -> bool {
        self.checksum == *checksum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntryRecord {
        EntryRecord::for_blob("a.txt", 1024, b"hello")
    }

    #[test]
    fn test_encode_layout() {
        let record = sample();
        let bytes = record.to_bytes().unwrap();

        assert_eq!(&bytes[0..5], b"a.txt");
        assert!(bytes[5..16].iter().all(|&b| b == 0));
        assert_eq!(&bytes[16..24], &5u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &1024u64.to_le_bytes());
        assert_eq!(&bytes[32..64], Checksum::of(b"hello").as_bytes());
    }

    #[test]
    fn test_decode_trims_padding() {
        let bytes = sample().to_bytes().unwrap();
        let decoded = EntryRecord::from_bytes(&bytes);
        assert_eq!(decoded.filename, "a.txt");
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_full_width_filename() {
        let record = EntryRecord::for_blob("0123456789abcdef", 0, b"x");
        let decoded = EntryRecord::from_bytes(&record.to_bytes().unwrap());
        assert_eq!(decoded.filename, "0123456789abcdef");
    }

    #[test]
    fn test_encode_rejects_long_filename() {
        let record = EntryRecord::for_blob("0123456789abcdefg", 0, b"x");
        let err = record.to_bytes().unwrap_err();
        assert!(matches!(err, ContainerError::FilenameTooLong { len: 17, .. }));
    }

    #[test]
    fn test_from_slice_wrong_length() {
        let err = EntryRecord::from_slice(&[0u8; 63]).unwrap_err();
        assert!(matches!(err, ContainerError::CorruptHeaderRegion(_)));
    }

    #[test]
    fn test_end_overflow() {
        let mut record = sample();
        record.offset = u64::MAX;
        assert_eq!(record.end(), None);
        assert_eq!(sample().end(), Some(1029));
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("a.txt").is_ok());
        assert!(validate_filename("0123456789abcdef").is_ok());
        assert!(matches!(
            validate_filename(""),
            Err(ContainerError::InvalidFilename(_))
        ));
        assert!(matches!(
            validate_filename("a\0b"),
            Err(ContainerError::InvalidFilename(_))
        ));
        assert!(matches!(
            validate_filename("this-name-is-too-long.txt"),
            Err(ContainerError::FilenameTooLong { .. })
        ));
    }

    #[test]
    fn test_decode_filename() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(decode_filename(&bytes[..FILENAME_LEN]).unwrap(), "a.txt");

        assert!(matches!(
            decode_filename(&[0xFF; FILENAME_LEN]),
            Err(ContainerError::InvalidFilename(_))
        ));
        assert!(matches!(
            decode_filename(b"a\0b\0\0\0\0\0\0\0\0\0\0\0\0\0"),
            Err(ContainerError::InvalidFilename(_))
        ));
        assert!(matches!(
            decode_filename(&[0u8; FILENAME_LEN]),
            Err(ContainerError::InvalidFilename(_))
        ));

        // the lossy decode still yields something to show
        let mut raw = bytes;
        raw[..FILENAME_LEN].copy_from_slice(&[0xFF; FILENAME_LEN]);
        assert!(EntryRecord::from_bytes(&raw).filename.len() > FILENAME_LEN);
    }

    #[test]
    fn test_checksum_hex() {
        // sha256("hello")
        assert_eq!(
            Checksum::of(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
