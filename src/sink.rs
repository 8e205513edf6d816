// SPDX-License-Identifier: MIT
//! Where a rewritten image goes
//!
//! The container core only produces bytes. Replacing the host file (and
//! finding it in the first place) happens behind [`ImageSink`].

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::Config;

/// Destination for a rewritten image
pub trait ImageSink: std::fmt::Debug {
    /// Replace the stored image with `image`.
    ///
    /// Must not leave a partially written image behind on failure.
    fn replace(&self, image: &[u8]) -> io::Result<()>;
}

/// An image stored in a file on disk
///
/// Writes go to a temporary file in the same directory, which is then
/// renamed over the target. The target's permissions are carried over so an
/// executable stays executable. On platforms that refuse to replace a running
/// binary the rename fails and the error is returned; elsewhere the new image
/// takes effect on the next launch.
#[derive(Debug, Clone)]
pub struct FileImage {
    path: PathBuf,
    durable_writes: bool,
    temp_suffix: String,
}

impl FileImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, &Config::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            path: path.into(),
            durable_writes: config.durable_writes,
            temp_suffix: config.temp_suffix.clone(),
        }
    }

    /// Path of the running executable
    pub fn current_exe_path() -> io::Result<PathBuf> {
        std::env::current_exe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole image
    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(&self.temp_suffix);
        self.path.with_file_name(name)
    }

    fn write_temp(&self, temp_path: &Path, image: &[u8]) -> io::Result<()> {
        let mut file = File::create(temp_path)?;
        file.write_all(image)?;
        file.flush()?;

        if self.durable_writes {
            file.sync_all()?;
        }

        match fs::metadata(&self.path) {
            Ok(metadata) => fs::set_permissions(temp_path, metadata.permissions())?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        Ok(())
    }
}

impl ImageSink for FileImage {
    fn replace(&self, image: &[u8]) -> io::Result<()> {
        let temp_path = self.temp_path();
        debug!(path = ?self.path, temp = ?temp_path, bytes = image.len(), "Writing image");

        let result = self
            .write_temp(&temp_path, image)
            .and_then(|()| fs::rename(&temp_path, &self.path));

        if let Err(e) = result {
            // Best effort cleanup - the target is untouched at this point
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if self.durable_writes {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
                    warn!("Failed to sync parent directory after rename: {}", e);
                }
            }
        }

        Ok(())
    }
}

/// An image held in memory, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
    contents: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<usize>>,
    fail_writes: bool,
}

impl MemoryImage {
    pub fn new(contents: Vec<u8>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(contents)),
            ..Self::default()
        }
    }

    /// A sink whose writes always fail
    pub fn failing(contents: Vec<u8>) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(contents)
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.contents.lock().clone()
    }

    /// Number of successful replacements
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl ImageSink for MemoryImage {
    fn replace(&self, image: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "write refused"));
        }
        *self.contents.lock() = image.to_vec();
        *self.writes.lock() += 1;
        Ok(())
    }
}
