use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use blobtree_types::{ContentId, PathCodec};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::folder::FolderAllocator;

/// A slot claimed for a new item: the empty file exists on disk.
#[derive(Debug)]
pub(crate) struct Reservation {
    pub id: ContentId,
    pub path: PathBuf,
}

/// Where the next identifier is carved from.
///
/// This is a process-local hint, never a source of truth: it is rebuilt by
/// scanning the tree whenever it is empty or its leaf is full.
#[derive(Debug, Default)]
struct Cursor {
    /// Leaf directory currently being filled, relative to the root.
    leaf: Option<PathBuf>,
    /// Index the next item in `leaf` will get.
    next_index: u32,
}

/// Hands out identifiers for new items, one slot at a time.
#[derive(Debug)]
pub(crate) struct IdentifierAllocator {
    root: PathBuf,
    codec: PathCodec,
    folders: FolderAllocator,
    max_folder_retries: u32,
    cursor: Mutex<Cursor>,
}

impl IdentifierAllocator {
    pub(crate) fn new(root: PathBuf, codec: PathCodec, max_folder_retries: u32) -> Self {
        Self {
            folders: FolderAllocator::new(root.clone(), codec),
            root,
            codec,
            max_folder_retries,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// Claim the next free slot by creating its (empty) file.
    ///
    /// Only the choice of slot and the creation of its file happen under the
    /// lock; writing the content is left to the caller.
    pub(crate) fn reserve_next(&self) -> StoreResult<Reservation> {
        // The cursor is only a cache, so a panic elsewhere cannot leave it
        // in a state that would hand out a slot twice: file creation below
        // is exclusive.
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        let block_size = self.codec.layout().block_size();
        let cached = cursor
            .leaf
            .clone()
            .filter(|_| cursor.next_index < block_size);
        let leaf = match cached {
            Some(leaf) => leaf,
            None => {
                let leaf = self
                    .folders
                    .first_available_leaf_directory(self.max_folder_retries)?;
                cursor.leaf = Some(leaf.clone());
                cursor.next_index = 0;
                leaf
            }
        };

        let index = cursor.next_index;
        cursor.next_index += 1;

        let relative = leaf.join(index.to_string());
        let path = self.root.join(&relative);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AllocationConflict(path));
            }
            Err(e) => return Err(StoreError::write(path, e)),
        }

        let id = self.codec.identifier_for_path(&relative)?;
        debug!(%id, path = %path.display(), "reserved content slot");
        Ok(Reservation { id, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobtree_types::TreeLayout;
    use std::path::Path;

    fn allocator(root: &Path, b: u32, d: u32) -> IdentifierAllocator {
        IdentifierAllocator::new(
            root.to_path_buf(),
            PathCodec::new(TreeLayout::new(b, d).unwrap()),
            50,
        )
    }

    #[test]
    fn first_ids_fill_first_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let a = allocator(dir.path(), 10, 2);
        for expected in 0u64..10 {
            let r = a.reserve_next().unwrap();
            assert_eq!(r.id, ContentId::from(expected));
            assert_eq!(r.path, dir.path().join("0").join(expected.to_string()));
            assert!(r.path.is_file());
        }
    }

    #[test]
    fn full_leaf_rolls_over_to_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let a = allocator(dir.path(), 10, 2);
        for _ in 0..10 {
            a.reserve_next().unwrap();
        }
        let r = a.reserve_next().unwrap();
        assert_eq!(r.id, ContentId::from(10));
        assert_eq!(r.path, dir.path().join("1").join("0"));
    }

    #[test]
    fn restart_opens_a_fresh_leaf() {
        let dir = tempfile::tempdir().unwrap();
        {
            let a = allocator(dir.path(), 10, 2);
            for _ in 0..3 {
                a.reserve_next().unwrap();
            }
        }
        // A new process never reuses the partially filled leaf.
        let a = allocator(dir.path(), 10, 2);
        let r = a.reserve_next().unwrap();
        assert_eq!(r.id, ContentId::from(10));
    }

    #[test]
    fn stray_file_is_allocation_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let a = allocator(dir.path(), 10, 2);
        a.reserve_next().unwrap();
        std::fs::write(dir.path().join("0").join("1"), b"stray").unwrap();

        let err = a.reserve_next().unwrap_err();
        assert!(matches!(err, StoreError::AllocationConflict(_)));
        assert!(!err.is_retryable());

        // The burned slot is skipped on the next call.
        assert_eq!(a.reserve_next().unwrap().id, ContentId::from(2));
    }

    #[test]
    fn capacity_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let a = allocator(dir.path(), 2, 2);
        for expected in 0u64..4 {
            assert_eq!(a.reserve_next().unwrap().id, ContentId::from(expected));
        }
        let err = a.reserve_next().unwrap_err();
        assert!(matches!(err, StoreError::CapacityExhausted { .. }));
    }
}
