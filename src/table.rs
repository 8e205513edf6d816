// SPDX-License-Identifier: MIT
//! Entry table reconstructed from the header region

use crate::error::{ContainerError, Result};
use crate::format::{decode_filename, Checksum, EntryRecord, FILENAME_LEN, HEADER_SIZE};

/// Ordered header records describing the persisted blobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryTable {
    records: Vec<EntryRecord>,
    /// Index and reason for every record whose filename field does not decode
    bad_names: Vec<(usize, String)>,
}

impl EntryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<EntryRecord>) -> Self {
        Self {
            records,
            bad_names: Vec::new(),
        }
    }

    /// Decode every record of a header region.
    ///
    /// The region length must be an exact multiple of [`HEADER_SIZE`]. A
    /// filename field that is not a valid name does not fail the decode; it is
    /// remembered and reported by [`EntryTable::filename_error`].
    pub fn decode(region: &[u8]) -> Result<Self> {
        if region.len() % HEADER_SIZE != 0 {
            return Err(ContainerError::CorruptHeaderRegion(format!(
                "region is {} bytes, not a multiple of {}",
                region.len(),
                HEADER_SIZE
            )));
        }

        let records = region
            .chunks_exact(HEADER_SIZE)
            .map(EntryRecord::from_slice)
            .collect::<Result<Vec<_>>>()?;

        let bad_names = region
            .chunks_exact(HEADER_SIZE)
            .enumerate()
            .filter_map(|(index, chunk)| {
                decode_filename(&chunk[..FILENAME_LEN])
                    .err()
                    .map(|e| (index, e.to_string()))
            })
            .collect();

        Ok(Self { records, bad_names })
    }

    /// Why the filename of record `index` could not be decoded, if it could not
    pub fn filename_error(&self, index: usize) -> Option<&str> {
        self.bad_names
            .iter()
            .find(|(bad, _)| *bad == index)
            .map(|(_, reason)| reason.as_str())
    }

    /// Check every record against the image it was read from.
    ///
    /// Blobs must tile `[storage_offset, image_len)` in record order: the first
    /// starts at `storage_offset`, each next one starts where the previous one
    /// ends and the last one ends at the end of the image. A container is
    /// always the tail of its host, and a table cut short by a stray storage
    /// marker never lines up with its own blob region.
    pub fn validate_bounds(&self, storage_offset: usize, image_len: usize) -> Result<()> {
        let image_len = image_len as u64;
        let mut expected = storage_offset as u64;

        for (index, record) in self.records.iter().enumerate() {
            if record.offset != expected {
                return Err(ContainerError::CorruptHeaderRegion(format!(
                    "entry {} ({:?}) starts at {}, expected {}",
                    index, record.filename, record.offset, expected
                )));
            }

            expected = record
                .end()
                .filter(|&end| end <= image_len)
                .ok_or_else(|| {
                    ContainerError::CorruptHeaderRegion(format!(
                        "entry {} ({:?}) at {} (+{}) runs past image of {} bytes",
                        index, record.filename, record.offset, record.size, image_len
                    ))
                })?;
        }

        if expected != image_len {
            return Err(ContainerError::CorruptHeaderRegion(format!(
                "blob region ends at {} but image is {} bytes",
                expected, image_len
            )));
        }

        Ok(())
    }

    /// Whether any record carries `checksum`
    pub fn exists(&self, checksum: &Checksum) -> bool {
        self.records.iter().any(|r| r.valid_checksum(checksum))
    }

    /// Whether any record is named `name`
    pub fn contains_filename(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.filename == name)
    }

    pub fn get(&self, name: &str) -> Option<&EntryRecord> {
        self.records.iter().find(|r| r.filename == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntryRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[EntryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a EntryTable {
    type Item = &'a EntryRecord;
    type IntoIter = std::slice::Iter<'a, EntryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(records: &[EntryRecord]) -> Vec<u8> {
        let mut buffer = Vec::new();
        for record in records {
            record.write_to_buffer(&mut buffer).unwrap();
        }
        buffer
    }

    #[test]
    fn test_decode_empty() {
        let table = EntryTable::decode(&[]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_decode_preserves_order() {
        let records = vec![
            EntryRecord::for_blob("one", 100, b"1"),
            EntryRecord::for_blob("two", 101, b"22"),
        ];
        let table = EntryTable::decode(&region(&records)).unwrap();
        assert_eq!(table.records(), records.as_slice());
    }

    #[test]
    fn test_decode_flags_bad_filenames() {
        let mut bytes = region(&[
            EntryRecord::for_blob("good", 100, b"1"),
            EntryRecord::for_blob("bad", 101, b"2"),
            EntryRecord::for_blob("nul", 102, b"3"),
        ]);
        bytes[HEADER_SIZE..HEADER_SIZE + FILENAME_LEN].fill(0xFF);
        bytes[2 * HEADER_SIZE + 1] = 0;

        let table = EntryTable::decode(&bytes).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.filename_error(0), None);
        assert!(table.filename_error(1).is_some());
        assert!(table.filename_error(2).is_some());
    }

    #[test]
    fn test_decode_rejects_partial_record() {
        let mut bytes = region(&[EntryRecord::for_blob("one", 100, b"1")]);
        bytes.extend_from_slice(&[0u8; 10]);
        let err = EntryTable::decode(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::CorruptHeaderRegion(_)));
    }

    #[test]
    fn test_validate_bounds_tail_anchored() {
        let table = EntryTable::from_records(vec![
            EntryRecord::for_blob("one", 100, b"1"),
            EntryRecord::for_blob("two", 101, b"22"),
        ]);
        assert!(table.validate_bounds(100, 103).is_ok());
        // trailing bytes nobody describes
        assert!(table.validate_bounds(100, 104).is_err());
        // blob starting before the blob region
        assert!(table.validate_bounds(101, 103).is_err());
        // blob running past the image
        assert!(table.validate_bounds(100, 102).is_err());
    }

    #[test]
    fn test_validate_bounds_rejects_gaps_and_reordering() {
        let gap = EntryTable::from_records(vec![
            EntryRecord::for_blob("one", 100, b"1"),
            EntryRecord::for_blob("two", 102, b"2"),
        ]);
        assert!(gap.validate_bounds(100, 103).is_err());

        let swapped = EntryTable::from_records(vec![
            EntryRecord::for_blob("two", 101, b"22"),
            EntryRecord::for_blob("one", 100, b"1"),
        ]);
        assert!(swapped.validate_bounds(100, 103).is_err());

        let empty_blobs = EntryTable::from_records(vec![
            EntryRecord::for_blob("one", 100, b""),
            EntryRecord::for_blob("two", 100, b"2"),
            EntryRecord::for_blob("three", 101, b""),
        ]);
        assert!(empty_blobs.validate_bounds(100, 101).is_ok());
    }

    #[test]
    fn test_validate_bounds_empty_table() {
        let table = EntryTable::new();
        assert!(table.validate_bounds(50, 50).is_ok());
        assert!(table.validate_bounds(50, 51).is_err());
    }

    #[test]
    fn test_validate_bounds_overflow() {
        let mut record = EntryRecord::for_blob("big", u64::MAX - 1, b"");
        record.size = 10;
        let table = EntryTable::from_records(vec![record]);
        assert!(matches!(
            table.validate_bounds(0, 100),
            Err(ContainerError::CorruptHeaderRegion(_))
        ));
    }

    #[test]
    fn test_lookups() {
        let table = EntryTable::from_records(vec![EntryRecord::for_blob("one", 0, b"1")]);
        assert!(table.exists(&Checksum::of(b"1")));
        assert!(!table.exists(&Checksum::of(b"2")));
        assert!(table.contains_filename("one"));
        assert!(!table.contains_filename("two"));
        assert_eq!(table.get("one").map(|r| r.size), Some(1));
    }
}
