// SPDX-License-Identifier: MIT
//! Error types for container operations

use crate::format::{Checksum, FILENAME_LEN};

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur while locating, reading or rewriting a container
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("{marker} marker not found")]
    MagicNotFound { marker: &'static str },

    #[error("Corrupt header region: {0}")]
    CorruptHeaderRegion(String),

    #[error("Checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: Checksum,
        actual: Checksum,
    },

    #[error("Filename {name:?} is {len} bytes, at most {} allowed", FILENAME_LEN)]
    FilenameTooLong { name: String, len: usize },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
