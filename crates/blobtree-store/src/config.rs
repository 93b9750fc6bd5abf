use std::path::{Path, PathBuf};

use blobtree_types::TreeLayout;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Default maximum number of children per directory.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Default number of path segments per item.
pub const DEFAULT_DEPTH: u32 = 4;

/// Maximum number of times the next folder is attempted in a row before
/// allocation gives up with [`StoreError::AllocationContention`].
pub const DEFAULT_MAX_FOLDER_RETRIES: u32 = 50;

/// Configuration for a [`FileSystemContentStore`](crate::FileSystemContentStore).
///
/// `block_size` and `depth` are fixed once the root holds content: changing
/// them remaps every identifier to a different path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory all content is stored under.
    pub root: PathBuf,
    /// Maximum number of children of any directory in the tree (B).
    pub block_size: u32,
    /// Number of path segments of one item (D).
    pub depth: u32,
    /// Retry budget for finding a fresh leaf directory under contention.
    pub max_folder_retries: u32,
    /// `fsync` written content before create/update return.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("content"),
            block_size: DEFAULT_BLOCK_SIZE,
            depth: DEFAULT_DEPTH,
            max_folder_retries: DEFAULT_MAX_FOLDER_RETRIES,
            sync_writes: false,
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Replace the tree shape.
    pub fn with_layout(mut self, block_size: u32, depth: u32) -> Self {
        self.block_size = block_size;
        self.depth = depth;
        self
    }

    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        toml::from_str(s).map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }

    /// Load a TOML configuration file.
    pub fn from_toml_file(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the configuration and return the tree layout it describes.
    pub fn validate(&self) -> StoreResult<TreeLayout> {
        let layout = TreeLayout::new(self.block_size, self.depth)?;
        if self.max_folder_retries == 0 {
            return Err(StoreError::InvalidConfig(
                "max_folder_retries must be at least 1".into(),
            ));
        }
        if self.root.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig("root must not be empty".into()));
        }
        if self.root.is_file() {
            return Err(StoreError::InvalidConfig(format!(
                "root {} is a regular file",
                self.root.display()
            )));
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.block_size, 1024);
        assert_eq!(c.depth, 4);
        assert_eq!(c.max_folder_retries, 50);
        assert!(!c.sync_writes);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn toml_with_partial_keys() {
        let c = StoreConfig::from_toml_str(
            r#"
            root = "/var/lib/blobs"
            block_size = 10
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/var/lib/blobs"));
        assert_eq!(c.block_size, 10);
        assert_eq!(c.depth, DEFAULT_DEPTH);
        assert_eq!(c.max_folder_retries, DEFAULT_MAX_FOLDER_RETRIES);
    }

    #[test]
    fn toml_type_error_is_invalid_config() {
        let err = StoreConfig::from_toml_str("block_size = \"ten\"").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn toml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        let config = StoreConfig::new(dir.path().join("data")).with_layout(16, 3);
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = StoreConfig::from_toml_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_invalid_config() {
        let err =
            StoreConfig::from_toml_file(Path::new("/nonexistent/blobtree.toml")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(StoreConfig::new("x").with_layout(1, 3).validate().is_err());
        assert!(StoreConfig::new("x").with_layout(8, 1).validate().is_err());
        assert!(StoreConfig::new("x")
            .with_layout(8, 4_000_000_000)
            .validate()
            .is_err());

        let mut c = StoreConfig::new("x");
        c.max_folder_retries = 0;
        assert!(matches!(c.validate(), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_file_root() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let c = StoreConfig::new(file.path());
        assert!(matches!(c.validate(), Err(StoreError::InvalidConfig(_))));
    }
}
