// SPDX-License-Identifier: MIT
//! Container: a host image with its embedded files

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::format::{Checksum, EntryRecord};
use crate::locator::{self, Regions};
use crate::sink::{FileImage, ImageSink};
use crate::store::{BlobStore, IntegrityFailure};
use crate::table::EntryTable;
use crate::writer::ContainerWriter;

/// A host image and the files embedded in it
///
/// The container owns the full image for its lifetime. Persisted blobs are
/// served as slices of that image; staged blobs are kept until [`save`]
/// rewrites the image through its sink.
///
/// [`save`]: Container::save
#[derive(Debug)]
pub struct Container {
    image: Vec<u8>,
    regions: Regions,
    table: EntryTable,
    store: BlobStore,
    sink: Box<dyn ImageSink>,
}

impl Container {
    /// Load the container embedded in `image`, which was read from `path`
    pub fn load(path: impl Into<PathBuf>, image: Vec<u8>) -> Result<Self> {
        Self::load_with_config(path, image, &Config::default())
    }

    pub fn load_with_config(
        path: impl Into<PathBuf>,
        image: Vec<u8>,
        config: &Config,
    ) -> Result<Self> {
        Self::with_sink(FileImage::with_config(path, config), image, config)
    }

    /// Read `path` and load the container in it
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(path, &Config::default())
    }

    pub fn open_with_config(path: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let sink = FileImage::with_config(path, config);
        let image = sink.read()?;
        Self::with_sink(sink, image, config)
    }

    /// Load the container of the running executable.
    ///
    /// Native code routinely contains the marker bytes (this crate's own
    /// constants among them), so an image without a recognizable container
    /// is treated as a first load and gets fresh markers.
    pub fn current() -> Result<Self> {
        let config = Config {
            init_on_unrecognized: true,
            ..Config::from_env()
        };
        Self::current_with_config(&config)
    }

    pub fn current_with_config(config: &Config) -> Result<Self> {
        Self::open_with_config(FileImage::current_exe_path()?, config)
    }

    /// Load from `image`, sending future saves to `sink`
    pub fn with_sink(
        sink: impl ImageSink + 'static,
        mut image: Vec<u8>,
        config: &Config,
    ) -> Result<Self> {
        let (regions, table) = match locator::locate(&image) {
            Ok(Some(layout)) => (layout.regions, layout.table),
            Ok(None) => (locator::install_markers(&mut image), EntryTable::new()),
            Err(e) if config.init_on_unrecognized => {
                warn!(error = %e, "Container not recognized, installing fresh markers");
                (locator::install_markers(&mut image), EntryTable::new())
            }
            Err(e) => return Err(e),
        };

        let store = BlobStore::load(&image, &table)?;
        debug!(
            entries = table.len(),
            loaded = store.loaded_blobs().len(),
            failures = store.failures().len(),
            "Container loaded"
        );

        Ok(Self {
            image,
            regions,
            table,
            store,
            sink: Box::new(sink),
        })
    }

    /// Stage `data` under `filename` for the next save.
    ///
    /// Content already present (persisted or staged) is not stored again and
    /// `Ok(false)` is returned. Filenames longer than 16 bytes are rejected.
    pub fn stage(&mut self, filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<bool> {
        self.store.stage(&self.table, filename, data.into())
    }

    /// Rewrite the image with every readable persisted blob plus the staged
    /// ones. Does nothing when nothing is staged.
    ///
    /// The in-memory state only changes once the sink accepted the new image.
    pub fn save(&mut self) -> Result<()> {
        if !self.store.has_pending() {
            debug!("Nothing staged, save skipped");
            return Ok(());
        }

        let mut writer = ContainerWriter::new(&self.image[..self.regions.prefix_len()]);
        for blob in self.store.loaded_blobs() {
            if !self.store.is_pending(&blob.filename) {
                writer.add(blob.filename.as_str(), &self.image[blob.range.clone()])?;
            }
        }
        for (filename, blob) in self.store.pending() {
            writer.add(filename.as_str(), &blob.data)?;
        }

        let written = writer.finalize()?;
        self.sink.replace(&written.image)?;

        info!(
            entries = written.table.len(),
            dropped = self.store.failures().len(),
            bytes = written.image.len(),
            "Container saved"
        );

        self.store = BlobStore::from_written(&written.table);
        self.image = written.image;
        self.regions = written.regions;
        self.table = written.table;
        Ok(())
    }

    /// Names of all readable files: persisted in table order, then staged
    pub fn list_files(&self) -> Vec<String> {
        let persisted = self
            .store
            .loaded_blobs()
            .iter()
            .map(|blob| blob.filename.clone());
        let staged = self
            .store
            .pending()
            .keys()
            .filter(|name| self.store.loaded(name).is_none())
            .cloned();

        persisted.chain(staged).collect()
    }

    /// Bytes of `filename`, if it is staged or persisted with a valid checksum
    pub fn read_file(&self, filename: &str) -> Option<&[u8]> {
        self.store.get(&self.image, filename)
    }

    /// Whether content with `checksum` is already persisted or staged
    pub fn exists(&self, checksum: &Checksum) -> bool {
        self.table.exists(checksum) || self.store.pending_exists(checksum)
    }

    /// Whether `filename` names a persisted entry or a staged blob
    pub fn filename_exists(&self, filename: &str) -> bool {
        self.table.contains_filename(filename) || self.store.is_pending(filename)
    }

    /// Fail with the first checksum mismatch found while loading
    pub fn verify(&self) -> Result<()> {
        match self.store.failures().first() {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    /// Persisted entries whose bytes failed verification
    pub fn integrity_failures(&self) -> &[IntegrityFailure] {
        self.store.failures()
    }

    /// All persisted entry records, including unreadable ones
    pub fn entries(&self) -> &[EntryRecord] {
        self.table.records()
    }

    pub fn has_pending(&self) -> bool {
        self.store.has_pending()
    }

    pub fn headers_offset(&self) -> usize {
        self.regions.headers_offset
    }

    pub fn storage_offset(&self) -> usize {
        self.regions.storage_offset
    }

    pub fn header_count(&self) -> usize {
        self.regions.header_count()
    }

    pub fn headers_data(&self) -> &[u8] {
        self.regions.headers(&self.image)
    }

    pub fn storage_data(&self) -> &[u8] {
        self.regions.storage(&self.image)
    }

    /// Current in-memory image
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn size(&self) -> usize {
        self.image.len()
    }
}
