// SPDX-License-Identifier: MIT
//! In-memory blob store: verified views into the image plus staged blobs

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::warn;

use crate::error::{ContainerError, Result};
use crate::format::{validate_filename, Checksum, EntryRecord};
use crate::table::EntryTable;

/// A persisted blob whose checksum has been verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedBlob {
    pub filename: String,
    pub range: Range<usize>,
    pub checksum: Checksum,
}

/// A staged blob waiting for the next save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlob {
    pub data: Vec<u8>,
    pub checksum: Checksum,
}

/// A persisted entry that is listed in the table but not exposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// The blob bytes do not match the recorded checksum
    ChecksumMismatch {
        filename: String,
        expected: Checksum,
        actual: Checksum,
    },
    /// The filename field does not hold a valid name; `filename` is a lossy
    /// rendering of it
    InvalidFilename { filename: String, reason: String },
}

impl IntegrityFailure {
    pub fn filename(&self) -> &str {
        match self {
            Self::ChecksumMismatch { filename, .. } | Self::InvalidFilename { filename, .. } => {
                filename
            }
        }
    }
}

impl std::fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChecksumMismatch {
                filename,
                expected,
                actual,
            } => write!(f, "{}: expected {}, got {}", filename, expected, actual),
            Self::InvalidFilename { filename, reason } => write!(f, "{:?}: {}", filename, reason),
        }
    }
}

impl From<&IntegrityFailure> for ContainerError {
    fn from(failure: &IntegrityFailure) -> Self {
        match failure {
            IntegrityFailure::ChecksumMismatch {
                filename,
                expected,
                actual,
            } => ContainerError::ChecksumMismatch {
                filename: filename.clone(),
                expected: *expected,
                actual: *actual,
            },
            IntegrityFailure::InvalidFilename { .. } => {
                ContainerError::InvalidFilename(failure.to_string())
            }
        }
    }
}

/// Blob store for one container
#[derive(Debug, Default)]
pub struct BlobStore {
    /// Verified persisted blobs, in table order
    loaded: Vec<LoadedBlob>,
    pending: BTreeMap<String, PendingBlob>,
    failures: Vec<IntegrityFailure>,
}

impl BlobStore {
    /// Run the load pass over `table`.
    ///
    /// Entries failing checksum verification or carrying an undecodable
    /// filename are recorded as integrity failures and not exposed; the rest
    /// of the table still loads.
    pub fn load(image: &[u8], table: &EntryTable) -> Result<Self> {
        let mut store = Self::default();

        for (index, record) in table.iter().enumerate() {
            let range = blob_range(record, image.len())?;

            if let Some(reason) = table.filename_error(index) {
                warn!(filename = ?record.filename, reason, "Invalid filename, entry not exposed");
                store.failures.push(IntegrityFailure::InvalidFilename {
                    filename: record.filename.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let actual = Checksum::of(&image[range.clone()]);

            if record.valid_checksum(&actual) {
                store.insert_loaded(LoadedBlob {
                    filename: record.filename.clone(),
                    range,
                    checksum: actual,
                });
            } else {
                warn!(
                    filename = %record.filename,
                    expected = %record.checksum,
                    actual = %actual,
                    "Checksum mismatch, entry not exposed"
                );
                store.failures.push(IntegrityFailure::ChecksumMismatch {
                    filename: record.filename.clone(),
                    expected: record.checksum,
                    actual,
                });
            }
        }

        Ok(store)
    }

    /// Build a store for a table that was just written, skipping verification
    pub fn from_written(table: &EntryTable) -> Self {
        let loaded = table
            .iter()
            .map(|record| LoadedBlob {
                filename: record.filename.clone(),
                range: record.offset as usize..(record.offset + record.size) as usize,
                checksum: record.checksum,
            })
            .collect();

        Self {
            loaded,
            ..Self::default()
        }
    }

    /// Stage `data` under `filename`.
    ///
    /// Returns `Ok(false)` when identical content is already known, either in
    /// `table` or among the pending blobs; nothing is stored in that case.
    pub fn stage(
        &mut self,
        table: &EntryTable,
        filename: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<bool> {
        let filename = filename.into();
        validate_filename(&filename)?;

        let checksum = Checksum::of(&data);
        if table.exists(&checksum) || self.pending_exists(&checksum) {
            return Ok(false);
        }

        self.pending.insert(filename, PendingBlob { data, checksum });
        Ok(true)
    }

    /// Bytes for `filename`, staged content taking precedence
    pub fn get<'a>(&'a self, image: &'a [u8], filename: &str) -> Option<&'a [u8]> {
        if let Some(pending) = self.pending.get(filename) {
            return Some(pending.data.as_slice());
        }
        self.loaded(filename).and_then(|blob| image.get(blob.range.clone()))
    }

    pub fn loaded(&self, filename: &str) -> Option<&LoadedBlob> {
        self.loaded.iter().find(|blob| blob.filename == filename)
    }

    pub fn loaded_blobs(&self) -> &[LoadedBlob] {
        &self.loaded
    }

    pub fn pending(&self) -> &BTreeMap<String, PendingBlob> {
        &self.pending
    }

    pub fn is_pending(&self, filename: &str) -> bool {
        self.pending.contains_key(filename)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_exists(&self, checksum: &Checksum) -> bool {
        self.pending.values().any(|blob| blob.checksum == *checksum)
    }

    pub fn failures(&self) -> &[IntegrityFailure] {
        &self.failures
    }

    fn insert_loaded(&mut self, blob: LoadedBlob) {
        // a later record with the same name shadows an earlier one
        self.loaded.retain(|existing| existing.filename != blob.filename);
        self.loaded.push(blob);
    }
}

/// Bounds-checked byte range of a record inside an image of `image_len` bytes
pub fn blob_range(record: &EntryRecord, image_len: usize) -> Result<Range<usize>> {
    let out_of_bounds = || {
        ContainerError::CorruptHeaderRegion(format!(
            "entry {:?} at {} (+{}) exceeds image of {} bytes",
            record.filename, record.offset, record.size, image_len
        ))
    };

    let end = record.end().ok_or_else(out_of_bounds)?;
    if end > image_len as u64 {
        return Err(out_of_bounds());
    }
    Ok(record.offset as usize..end as usize)
}
