use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use blobtree_types::{PathCodec, TreeLayout};
use tracing::{debug, error, warn};

use crate::error::{StoreError, StoreResult};

/// Outcome of one pass over the tree.
enum Attempt {
    /// A leaf directory with room for new items, relative to the root.
    Opened(PathBuf),
    /// The candidate directory already existed: another allocator won.
    LostRace(PathBuf),
}

/// Finds or creates the next leaf directory with room for new items.
///
/// The tree is append-only: a leaf is only handed out once it has been
/// freshly created, and a new sibling is only opened after the previous
/// one was handed out. Each directory therefore fills up to B children
/// before the next one appears, and the depth never changes.
///
/// No lock is shared with other processes. Races are settled by the
/// atomicity of `mkdir`: whoever creates the candidate directory owns it,
/// everyone else rescans from the root.
#[derive(Debug)]
pub(crate) struct FolderAllocator {
    root: PathBuf,
    codec: PathCodec,
}

impl FolderAllocator {
    pub(crate) fn new(root: PathBuf, codec: PathCodec) -> Self {
        Self { root, codec }
    }

    fn layout(&self) -> &TreeLayout {
        self.codec.layout()
    }

    /// Return a freshly created leaf directory, relative to the root.
    ///
    /// Each lost race costs one unit of `max_retries`; running out fails
    /// with [`StoreError::AllocationContention`].
    pub(crate) fn first_available_leaf_directory(&self, max_retries: u32) -> StoreResult<PathBuf> {
        let mut retries_left = max_retries;
        loop {
            if retries_left == 0 {
                error!(
                    attempts = max_retries,
                    "giving up looking for next available folder, no more retries left"
                );
                return Err(StoreError::AllocationContention {
                    attempts: max_retries,
                });
            }
            match self.try_open_leaf()? {
                Attempt::Opened(leaf) => return Ok(leaf),
                Attempt::LostRace(candidate) => {
                    retries_left -= 1;
                    debug!(
                        candidate = %candidate.display(),
                        retries_left,
                        "next folder already created, retrying"
                    );
                }
            }
        }
    }

    fn try_open_leaf(&self) -> StoreResult<Attempt> {
        let levels = self.layout().directory_levels();
        let mut relative = PathBuf::new();
        let mut indexes = Vec::with_capacity(levels);

        for level in 0..levels {
            match self.max_child(&self.root.join(&relative))? {
                Some(index) => {
                    relative.push(index.to_string());
                    indexes.push(index);
                }
                None => {
                    // Nothing below this level yet: start a brand-new branch.
                    for _ in level..levels {
                        relative.push("0");
                    }
                    return self.create_leaf(relative);
                }
            }
        }

        let block_size = self.layout().block_size();
        let last = indexes[levels - 1];
        let candidate = if last + 1 < block_size {
            relative.set_file_name((last + 1).to_string());
            relative
        } else {
            debug!(leaf = %relative.display(), "block size reached, moving up one level");
            if !increment(&mut indexes, block_size) {
                let capacity = self.layout().capacity();
                error!(
                    root = %self.root.display(),
                    %capacity,
                    "maximum number of content items reached"
                );
                return Err(StoreError::CapacityExhausted { capacity });
            }
            indexes.iter().map(|i| i.to_string()).collect()
        };

        self.create_leaf(candidate)
    }

    /// Numerically largest child directory of `dir` that is a valid digit.
    fn max_child(&self, dir: &Path) -> StoreResult<Option<u32>> {
        let entries = fs::read_dir(dir).map_err(|e| StoreError::read(dir, e))?;
        let mut max = None;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::read(dir, e))?;
            let name = entry.file_name();
            let is_dir = entry
                .file_type()
                .map_err(|e| StoreError::read(entry.path(), e))?
                .is_dir();
            let index = name
                .to_str()
                .and_then(|n| self.codec.parse_segment(n).ok())
                .filter(|_| is_dir);
            match index {
                Some(index) => max = max.max(Some(index)),
                None => warn!(
                    entry = %entry.path().display(),
                    "content store contains foreign entry, ignoring"
                ),
            }
        }
        Ok(max)
    }

    fn create_leaf(&self, relative: PathBuf) -> StoreResult<Attempt> {
        let dir = self.root.join(&relative);
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::write(parent, e))?;
        }
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!(leaf = %relative.display(), "opened new leaf folder");
                Ok(Attempt::Opened(relative))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(Attempt::LostRace(relative)),
            Err(e) => Err(StoreError::write(dir, e)),
        }
    }
}

/// Add one to a base-`radix` number stored most significant digit first.
/// Returns `false` when every digit overflowed.
fn increment(digits: &mut [u32], radix: u32) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit + 1 < radix {
            *digit += 1;
            return true;
        }
        *digit = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(root: &Path, b: u32, d: u32) -> FolderAllocator {
        FolderAllocator::new(
            root.to_path_buf(),
            PathCodec::new(TreeLayout::new(b, d).unwrap()),
        )
    }

    fn rel(segments: &[&str]) -> PathBuf {
        segments.iter().collect()
    }

    #[test]
    fn increment_carries() {
        let mut d = vec![0, 9];
        assert!(increment(&mut d, 10));
        assert_eq!(d, vec![1, 0]);

        let mut d = vec![3, 4];
        assert!(increment(&mut d, 10));
        assert_eq!(d, vec![3, 5]);

        let mut d = vec![9, 9];
        assert!(!increment(&mut d, 10));
        assert_eq!(d, vec![0, 0]);
    }

    #[test]
    fn empty_root_opens_zero_branch() {
        let dir = tempfile::tempdir().unwrap();
        let a = allocator(dir.path(), 10, 4);
        let leaf = a.first_available_leaf_directory(50).unwrap();
        assert_eq!(leaf, rel(&["0", "0", "0"]));
        assert!(dir.path().join(&leaf).is_dir());
    }

    #[test]
    fn existing_leaf_opens_next_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let a = allocator(dir.path(), 10, 3);
        assert_eq!(a.first_available_leaf_directory(50).unwrap(), rel(&["0", "0"]));
        assert_eq!(a.first_available_leaf_directory(50).unwrap(), rel(&["0", "1"]));
        assert_eq!(a.first_available_leaf_directory(50).unwrap(), rel(&["0", "2"]));
    }

    #[test]
    fn full_block_carries_into_parent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("0").join("2")).unwrap();
        let a = allocator(dir.path(), 3, 3);
        assert_eq!(a.first_available_leaf_directory(50).unwrap(), rel(&["1", "0"]));
    }

    #[test]
    fn descends_numerically_not_lexically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2", "10", "9"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let a = allocator(dir.path(), 16, 2);
        assert_eq!(a.first_available_leaf_directory(50).unwrap(), rel(&["11"]));
    }

    #[test]
    fn foreign_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lost+found")).unwrap();
        fs::create_dir(dir.path().join("07")).unwrap();
        fs::create_dir(dir.path().join("99")).unwrap();
        fs::write(dir.path().join("5"), b"not a directory").unwrap();
        let a = allocator(dir.path(), 10, 2);
        assert_eq!(a.first_available_leaf_directory(50).unwrap(), rel(&["0"]));
    }

    #[test]
    fn exhausted_tree_fails_permanently() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1").join("1")).unwrap();
        let a = allocator(dir.path(), 2, 3);
        let err = a.first_available_leaf_directory(50).unwrap_err();
        assert!(matches!(err, StoreError::CapacityExhausted { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn zero_retry_budget_is_contention() {
        let dir = tempfile::tempdir().unwrap();
        let a = allocator(dir.path(), 10, 2);
        let err = a.first_available_leaf_directory(0).unwrap_err();
        assert!(matches!(
            err,
            StoreError::AllocationContention { attempts: 0 }
        ));
    }

    #[test]
    fn lost_race_consumes_a_retry() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("0")).unwrap();
        let a = allocator(dir.path(), 10, 2);

        // Somebody else grabs "1" between our scan and our mkdir.
        let Attempt::Opened(first) = a.try_open_leaf().unwrap() else {
            panic!("expected a fresh leaf");
        };
        assert_eq!(first, rel(&["1"]));
        fs::remove_dir(dir.path().join("1")).unwrap();
        fs::create_dir(dir.path().join("1")).unwrap();
        match a.create_leaf(rel(&["1"])).unwrap() {
            Attempt::LostRace(candidate) => assert_eq!(candidate, rel(&["1"])),
            Attempt::Opened(_) => panic!("directory already existed"),
        }

        // A full rescan then moves on to the next sibling.
        assert_eq!(a.first_available_leaf_directory(1).unwrap(), rel(&["2"]));
    }

    #[test]
    fn concurrent_allocators_never_share_a_leaf() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(allocator(dir.path(), 64, 3));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let a = Arc::clone(&a);
                thread::spawn(move || {
                    (0..10)
                        .map(|_| a.first_available_leaf_directory(1000).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for leaf in h.join().expect("thread should not panic") {
                assert!(seen.insert(leaf.clone()), "leaf {leaf:?} handed out twice");
            }
        }
    }
}
