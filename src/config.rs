//! Configuration for shardvault
//!
//! This module provides configuration options for a shard store on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration options for a shard store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct StoreConfig {
    // Layout
    /// Base directory for storage
    pub base_dir: PathBuf,
    /// Subdirectory holding shard and replica content
    pub data_dir: String,
    /// File name of the persisted directory
    pub directory_file: String,
    /// Extension of content files
    pub content_extension: String,
    /// File name of the advisory writer lock, if locking is enabled
    pub lock_file: Option<String>,

    // Reliability settings
    /// Whether to sync writes to disk immediately
    pub sync_writes: bool,
    /// Whether reconciliation compares replica bytes against the primary
    /// (when disabled only presence and length are checked)
    pub verify_replica_content: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            data_dir: "data".to_string(),
            directory_file: "mapping.json".to_string(),
            content_extension: "txt".to_string(),
            lock_file: Some("LOCK".to_string()),

            sync_writes: false,
            verify_replica_content: true,
        }
    }
}

impl StoreConfig {
    /// Create a new store configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base directory for storage
    pub fn with_base_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.base_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the content subdirectory
    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the directory file name
    pub fn with_directory_file(mut self, name: impl Into<String>) -> Self {
        self.directory_file = name.into();
        self
    }

    /// Set the content file extension
    pub fn with_content_extension(mut self, ext: impl Into<String>) -> Self {
        self.content_extension = ext.into();
        self
    }

    /// Set the lock file name, or disable file locking with `None`
    pub fn with_lock_file(mut self, name: Option<String>) -> Self {
        self.lock_file = name;
        self
    }

    /// Set whether to sync writes to disk immediately
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Set whether reconciliation compares replica bytes
    pub fn with_verify_replica_content(mut self, verify: bool) -> Self {
        self.verify_replica_content = verify;
        self
    }

    /// Directory holding content files
    pub fn data_path(&self) -> PathBuf {
        self.base_dir.join(&self.data_dir)
    }

    /// Path of the persisted directory
    pub fn directory_path(&self) -> PathBuf {
        self.base_dir.join(&self.directory_file)
    }

    /// Path of the lock file, if locking is enabled
    pub fn lock_path(&self) -> Option<PathBuf> {
        self.lock_file.as_ref().map(|name| self.base_dir.join(name))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        check_file_name("data directory", &self.data_dir)?;
        check_file_name("directory file", &self.directory_file)?;

        if let Some(lock) = &self.lock_file {
            check_file_name("lock file", lock)?;
        }

        if self.content_extension.is_empty() {
            return Err(Error::config("Content extension must not be empty"));
        }

        if self.content_extension.contains(['.', '/', '\\']) {
            return Err(Error::config(format!(
                "Content extension must be a bare extension, got {:?}",
                self.content_extension
            )));
        }

        if self.content_extension == "tmp" {
            return Err(Error::config("Content extension \"tmp\" is reserved for staging files"));
        }

        Ok(())
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), text)?;
        Ok(())
    }
}

fn check_file_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::config(format!("Invalid {} name: {:?}", what, name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.data_dir, "data");
        assert_eq!(config.directory_file, "mapping.json");
    }

    #[test]
    fn test_builder_and_paths() {
        let config = StoreConfig::new()
            .with_base_dir("/var/shards")
            .with_data_dir("blobs")
            .with_content_extension("bin")
            .with_lock_file(None)
            .with_sync_writes(true);

        assert_eq!(config.data_path(), PathBuf::from("/var/shards/blobs"));
        assert_eq!(config.directory_path(), PathBuf::from("/var/shards/mapping.json"));
        assert_eq!(config.lock_path(), None);
        assert!(config.sync_writes);
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(StoreConfig::new().with_data_dir("").validate().is_err());
        assert!(StoreConfig::new().with_data_dir("a/b").validate().is_err());
        assert!(StoreConfig::new().with_directory_file("..").validate().is_err());
        assert!(StoreConfig::new().with_content_extension("").validate().is_err());
        assert!(StoreConfig::new().with_content_extension("tar.gz").validate().is_err());
        assert!(StoreConfig::new().with_content_extension("tmp").validate().is_err());
        assert!(StoreConfig::new()
            .with_lock_file(Some("x/LOCK".to_string()))
            .validate()
            .is_err());
    }

    #[test]
    fn test_file_round_trip() -> Result<()> {
        let temp_dir = tempdir()?;
        let path = temp_dir.path().join("config.json");

        let config = StoreConfig::new()
            .with_base_dir(temp_dir.path())
            .with_verify_replica_content(false);
        config.save_to_file(&path)?;

        let loaded = StoreConfig::from_file(&path)?;
        assert_eq!(loaded, config);

        // Missing fields fall back to defaults
        fs::write(&path, r#"{"data_dir": "chunks"}"#)?;
        let partial = StoreConfig::from_file(&path)?;
        assert_eq!(partial.data_dir, "chunks");
        assert_eq!(partial.directory_file, "mapping.json");

        Ok(())
    }
}
