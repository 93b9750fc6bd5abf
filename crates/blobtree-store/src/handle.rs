use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use blobtree_types::ContentId;

use crate::error::{StoreError, StoreResult};

/// Reference to one stored item.
///
/// A handle is an immutable value: it names the item's identifier and
/// resolved path, and remembers the byte length when the store just wrote
/// it. It holds nothing open; every read opens the canonical file afresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentHandle {
    id: ContentId,
    path: PathBuf,
    known_len: Option<u64>,
}

impl ContentHandle {
    pub(crate) fn new(id: ContentId, path: PathBuf, known_len: Option<u64>) -> Self {
        Self {
            id,
            path,
            known_len,
        }
    }

    pub fn id(&self) -> &ContentId {
        &self.id
    }

    /// The identifier in the decimal form exchanged with callers.
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length recorded when the content was written by this handle's
    /// create or update call. `None` for fetched handles.
    pub fn known_len(&self) -> Option<u64> {
        self.known_len
    }

    /// Content length, from the recorded value or a fresh `stat`.
    pub fn len(&self) -> StoreResult<u64> {
        if let Some(len) = self.known_len {
            return Ok(len);
        }
        std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| self.read_error(e))
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Open the content for reading.
    pub fn open(&self) -> StoreResult<File> {
        File::open(&self.path).map_err(|e| self.read_error(e))
    }

    /// Run `f` over a buffered reader of the content. The file is closed
    /// when this returns, whatever `f` does.
    pub fn with_reader<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut dyn Read) -> io::Result<T>,
    {
        let mut reader = BufReader::new(self.open()?);
        f(&mut reader).map_err(|e| StoreError::read(&self.path, e))
    }

    /// Read the whole content into memory.
    pub fn read_to_vec(&self) -> StoreResult<Vec<u8>> {
        self.with_reader(|r| {
            let mut buf = Vec::new();
            r.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    fn read_error(&self, e: io::Error) -> StoreError {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound {
                id: self.id.clone(),
                path: self.path.clone(),
            }
        } else {
            StoreError::read(&self.path, e)
        }
    }
}
