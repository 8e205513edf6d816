// SPDX-License-Identifier: MIT
use std::path::MAIN_SEPARATOR;

#[derive(Debug, Clone)]
pub struct Config {
    /// fsync the temporary image before it replaces the target
    pub durable_writes: bool,
    /// Install fresh markers when an existing container cannot be recognized
    pub init_on_unrecognized: bool,
    /// Suffix of the temporary image written next to the target
    pub temp_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            durable_writes: true,
            init_on_unrecognized: false,
            temp_suffix: ".binfs-tmp".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            durable_writes: std::env::var("BINFS_DURABLE_WRITES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.durable_writes),
            init_on_unrecognized: std::env::var("BINFS_INIT_ON_UNRECOGNIZED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.init_on_unrecognized),
            temp_suffix: std::env::var("BINFS_TEMP_SUFFIX").unwrap_or(defaults.temp_suffix),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.temp_suffix.is_empty() {
            return Err("BINFS_TEMP_SUFFIX cannot be empty".to_string());
        }

        if self.temp_suffix.contains('/') || self.temp_suffix.contains(MAIN_SEPARATOR) {
            return Err("BINFS_TEMP_SUFFIX must not contain a path separator".to_string());
        }

        Ok(())
    }
}
