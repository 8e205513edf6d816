// SPDX-License-Identifier: MIT
//! # binfs
//!
//! Files appended to an executable's own image and read back from it at
//! runtime, without any external files.
//!
//! ## Format Overview
//!
//! A container is appended after the native code of the host. It consists of
//! two short markers, a table of fixed-size entry records and a raw blob
//! region. Everything before the header marker is left untouched.
//!
//! ```text
//! [native executable bytes]
//! "BHS"                          header marker (3 bytes)
//! <N * 64-byte entry record>     header table
//! "BFS"                          storage marker (3 bytes)
//! <blob 0><blob 1>...            blob bytes, in header order
//!
//! Entry record (64 bytes, little-endian):
//! - filename: zero-padded, at most 16 bytes
//! - size: u64
//! - offset: u64, absolute position of the blob in the image
//! - checksum: SHA-256 of the blob (32 bytes)
//! ```
//!
//! ## Key Features
//!
//! - **Self-contained**: assets travel inside the binary
//! - **Checksummed**: every blob is verified before it is exposed; a corrupt
//!   blob is skipped without affecting the others
//! - **Content-addressed staging**: identical bytes are stored once
//! - **Safe rewrites**: a new image is written next to the target and renamed
//!   over it, so a failed save never leaves a half-written host
//!
//! ## Usage
//!
//! ```rust
//! use binfs::{Config, Container, MemoryImage};
//!
//! let host = b"native executable".to_vec();
//! let sink = MemoryImage::new(host.clone());
//!
//! let mut container = Container::with_sink(sink.clone(), host, &Config::default())?;
//! container.stage("a.txt", "hello")?;
//! container.save()?;
//!
//! let reloaded = Container::with_sink(sink.clone(), sink.contents(), &Config::default())?;
//! assert_eq!(reloaded.list_files(), vec!["a.txt".to_string()]);
//! assert_eq!(reloaded.read_file("a.txt"), Some(&b"hello"[..]));
//! # Ok::<(), binfs::ContainerError>(())
//! ```
//!
//! A program reading its own assets uses [`Container::current`]. Rewriting a
//! running executable only takes effect on its next launch, and platforms
//! that lock running binaries reject the rename with an I/O error.

pub mod config;
pub mod container;
pub mod error;
pub mod format;
pub mod locator;
pub mod sink;
pub mod store;
pub mod table;
pub mod writer;

// Re-export main types
pub use config::Config;
pub use container::Container;
pub use error::{ContainerError, Result};
pub use format::{Checksum, EntryRecord, FILENAME_LEN, HEADERS_MAGIC, HEADER_SIZE, STORAGE_MAGIC};
pub use sink::{FileImage, ImageSink, MemoryImage};
pub use store::IntegrityFailure;
pub use writer::ContainerWriter;
