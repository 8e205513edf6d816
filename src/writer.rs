// SPDX-License-Identifier: MIT
//! Container writer: serializes a host prefix plus blobs into a new image

use crate::error::{ContainerError, Result};
use crate::format::{
    validate_filename, EntryRecord, HEADERS_MAGIC, HEADER_SIZE, MAGIC_LEN, STORAGE_MAGIC,
};
use crate::locator::Regions;
use crate::table::EntryTable;

/// A fully serialized image together with its new layout
#[derive(Debug)]
pub struct WrittenImage {
    pub image: Vec<u8>,
    pub regions: Regions,
    pub table: EntryTable,
}

/// Builder for a rewritten host image
///
/// Blobs are emitted in the order they are added; their headers follow the
/// same order.
pub struct ContainerWriter<'a> {
    prefix: &'a [u8],
    blobs: Vec<(String, &'a [u8])>,
}

impl<'a> ContainerWriter<'a> {
    /// Start an image that keeps `prefix` (the native executable) untouched
    pub fn new(prefix: &'a [u8]) -> Self {
        Self {
            prefix,
            blobs: Vec::new(),
        }
    }

    /// Add a blob
    pub fn add(&mut self, filename: impl Into<String>, data: &'a [u8]) -> Result<()> {
        let filename = filename.into();
        validate_filename(&filename)?;

        if self.blobs.iter().any(|(existing, _)| *existing == filename) {
            return Err(ContainerError::InvalidFilename(format!(
                "{:?} added twice",
                filename
            )));
        }

        self.blobs.push((filename, data));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Finalize the image
    ///
    /// Layout: prefix, header marker, one record per blob, storage marker,
    /// blob bytes in record order.
    pub fn finalize(self) -> Result<WrittenImage> {
        let overflow = || ContainerError::CorruptHeaderRegion("image size overflow".into());

        let headers_offset = self
            .prefix
            .len()
            .checked_add(MAGIC_LEN)
            .ok_or_else(overflow)?;
        let storage_offset = self
            .blobs
            .len()
            .checked_mul(HEADER_SIZE)
            .and_then(|size| size.checked_add(headers_offset + MAGIC_LEN))
            .ok_or_else(overflow)?;
        let total_size = self
            .blobs
            .iter()
            .try_fold(storage_offset, |total, (_, data)| total.checked_add(data.len()))
            .ok_or_else(overflow)?;

        // Pre-allocate exact size to avoid reallocations
        let mut image = Vec::with_capacity(total_size);
        image.extend_from_slice(self.prefix);
        image.extend_from_slice(HEADERS_MAGIC);

        let mut records = Vec::with_capacity(self.blobs.len());
        let mut offset = storage_offset as u64;
        for (filename, data) in &self.blobs {
            let record = EntryRecord::for_blob(filename.as_str(), offset, data);
            record.write_to_buffer(&mut image)?;
            offset += record.size;
            records.push(record);
        }

        image.extend_from_slice(STORAGE_MAGIC);
        for (_, data) in &self.blobs {
            image.extend_from_slice(data);
        }

        debug_assert_eq!(image.len(), total_size);
        Ok(WrittenImage {
            image,
            regions: Regions {
                headers_offset,
                storage_offset,
            },
            table: EntryTable::from_records(records),
        })
    }
}
