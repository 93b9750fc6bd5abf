use std::io;
use std::path::PathBuf;

use blobtree_types::{ContentId, TypeError};
use num_bigint::BigUint;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Malformed identifier string or out-of-range digit.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// The requested item does not exist.
    #[error("content with id {id} was not found (path: {})", .path.display())]
    NotFound { id: ContentId, path: PathBuf },

    /// Another update of the same item is in flight.
    #[error("cannot update content with id {0}: an update is already in progress")]
    ConflictingUpdate(ContentId),

    /// The slot picked for a new item is already occupied on disk.
    #[error("content already stored at reserved location {}", .0.display())]
    AllocationConflict(PathBuf),

    /// Every attempt to open a fresh leaf directory lost a race.
    #[error("no available folder found after {attempts} attempts")]
    AllocationContention { attempts: u32 },

    /// All B^D identifiers have been handed out.
    #[error("maximum number of content items reached ({capacity}), cannot store any more content")]
    CapacityExhausted { capacity: BigUint },

    /// I/O failure while writing content, renaming, or creating directories.
    #[error("error while writing {}: {source}", .path.display())]
    StorageWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O failure while reading content or scanning the tree.
    #[error("error while reading {}: {source}", .path.display())]
    StorageReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O failure while removing an item.
    #[error("error while deleting {}: {source}", .path.display())]
    StorageDeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Returns `true` for errors a caller may retry after its own backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConflictingUpdate(_) | Self::AllocationContention { .. }
        )
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StorageWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StorageReadFailed {
            path: path.into(),
            source,
        }
    }
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidIdentifier { value, reason } => {
                Self::InvalidIdentifier { value, reason }
            }
            layout @ TypeError::InvalidLayout { .. } => Self::InvalidConfig(layout.to_string()),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(StoreError::ConflictingUpdate(ContentId::from(1)).is_retryable());
        assert!(StoreError::AllocationContention { attempts: 50 }.is_retryable());
        assert!(!StoreError::AllocationConflict(PathBuf::from("0/0")).is_retryable());
        assert!(!StoreError::CapacityExhausted {
            capacity: BigUint::from(4u32)
        }
        .is_retryable());
    }

    #[test]
    fn type_errors_map_to_store_errors() {
        let err: StoreError = blobtree_types::ContentId::parse("x").unwrap_err().into();
        assert!(matches!(err, StoreError::InvalidIdentifier { .. }));

        let err: StoreError = blobtree_types::TreeLayout::new(1, 2).unwrap_err().into();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn not_found_message_names_path() {
        let err = StoreError::NotFound {
            id: ContentId::from(7),
            path: PathBuf::from("/data/0/7"),
        };
        let msg = err.to_string();
        assert!(msg.contains("7"));
        assert!(msg.contains("/data/0/7"));
    }
}
