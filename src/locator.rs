// SPDX-License-Identifier: MIT
//! Locates the header table and blob region inside a host image
//!
//! The host is arbitrary native code, so marker bytes may also show up in it
//! by accident (string tables, immediates). Every header marker occurrence is
//! therefore only a candidate; it is accepted when a storage marker follows at
//! a whole number of records and the decoded blobs tile the region between
//! that marker and the end of the image.

use tracing::debug;

use crate::error::{ContainerError, Result};
use crate::format::{HEADERS_MAGIC, HEADER_SIZE, MAGIC_LEN, STORAGE_MAGIC};
use crate::table::EntryTable;

/// Byte positions of the two regions within an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regions {
    /// First byte after the header marker
    pub headers_offset: usize,
    /// First byte after the storage marker
    pub storage_offset: usize,
}

impl Regions {
    /// Header table bytes
    pub fn headers<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.headers_offset..self.storage_offset - MAGIC_LEN]
    }

    /// Blob region bytes
    pub fn storage<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.storage_offset..]
    }

    /// Number of records in the header table
    pub fn header_count(&self) -> usize {
        (self.storage_offset - MAGIC_LEN - self.headers_offset) / HEADER_SIZE
    }

    /// Length of the untouched host prefix
    pub fn prefix_len(&self) -> usize {
        self.headers_offset - MAGIC_LEN
    }
}

/// A container found inside an image
#[derive(Debug, Clone)]
pub struct Layout {
    pub regions: Regions,
    pub table: EntryTable,
}

/// Find an existing container in `image`.
///
/// Returns `Ok(None)` when no header marker occurs at all (a fresh host).
/// When markers occur but none forms a valid container, the error of the
/// candidate closest to the tail is returned.
pub fn locate(image: &[u8]) -> Result<Option<Layout>> {
    let mut last_error = None;

    for position in find_all(image, HEADERS_MAGIC) {
        match try_candidate(image, position + MAGIC_LEN) {
            Ok(layout) => {
                debug!(
                    headers_offset = layout.regions.headers_offset,
                    storage_offset = layout.regions.storage_offset,
                    entries = layout.table.len(),
                    "Located container"
                );
                return Ok(Some(layout));
            }
            Err(e) => {
                debug!(position, error = %e, "Skipping header marker candidate");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => {
            debug!(image_len = image.len(), "No header marker, fresh image");
            Ok(None)
        }
    }
}

/// Append empty markers to a fresh image and return the new regions
pub fn install_markers(image: &mut Vec<u8>) -> Regions {
    image.reserve(MAGIC_LEN * 2);
    image.extend_from_slice(HEADERS_MAGIC);
    let headers_offset = image.len();
    image.extend_from_slice(STORAGE_MAGIC);
    let storage_offset = image.len();

    Regions {
        headers_offset,
        storage_offset,
    }
}

fn try_candidate(image: &[u8], headers_offset: usize) -> Result<Layout> {
    let mut first_error = None;
    let mut position = headers_offset;

    while position + MAGIC_LEN <= image.len() {
        if &image[position..position + MAGIC_LEN] == STORAGE_MAGIC {
            let storage_offset = position + MAGIC_LEN;
            let decoded = EntryTable::decode(&image[headers_offset..position]).and_then(|table| {
                table.validate_bounds(storage_offset, image.len())?;
                Ok(table)
            });

            match decoded {
                Ok(table) => {
                    return Ok(Layout {
                        regions: Regions {
                            headers_offset,
                            storage_offset,
                        },
                        table,
                    })
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        position += HEADER_SIZE;
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    match find_all(&image[headers_offset..], STORAGE_MAGIC).next() {
        Some(relative) => Err(ContainerError::CorruptHeaderRegion(format!(
            "header region is {} bytes, not a multiple of {}",
            relative, HEADER_SIZE
        ))),
        None => Err(ContainerError::MagicNotFound { marker: "storage" }),
    }
}

fn find_all<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(move |(_, window)| *window == needle)
        .map(|(position, _)| position)
}
