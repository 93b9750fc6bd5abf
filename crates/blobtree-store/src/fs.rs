use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use blobtree_types::{ContentId, PathCodec, TreeLayout};
use tracing::{debug, error, info, warn};

use crate::allocator::{IdentifierAllocator, Reservation};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::handle::ContentHandle;
use crate::traits::ContentStore;

/// Suffix of the sibling file new content is streamed into during an update.
pub const INCOMING_SUFFIX: &str = ".incoming";

/// Suffix of the sibling file holding the prior content during an update.
pub const PREVIOUS_SUFFIX: &str = ".previous";

/// Content store backed by a bounded fan-out directory tree.
///
/// Every item lives at the path its identifier encodes to (see
/// [`PathCodec`]). The store instance owns its root: nothing else may write
/// inside it while the store is in use.
pub struct FileSystemContentStore {
    root: PathBuf,
    codec: PathCodec,
    config: StoreConfig,
    allocator: IdentifierAllocator,
    #[cfg(test)]
    faults: testing::Faults,
}

impl FileSystemContentStore {
    /// Open a store, creating its root directory if needed.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let layout = config.validate()?;
        fs::create_dir_all(&config.root).map_err(|e| StoreError::write(&config.root, e))?;

        let root = config.root.clone();
        let codec = PathCodec::new(layout);
        info!(
            root = %root.display(),
            block_size = layout.block_size(),
            depth = layout.depth(),
            "content store opened"
        );
        Ok(Self {
            allocator: IdentifierAllocator::new(root.clone(), codec, config.max_folder_retries),
            root,
            codec,
            config,
            #[cfg(test)]
            faults: testing::Faults::default(),
        })
    }

    /// Open a store at `root` with the given tree shape and default settings.
    pub fn new(root: impl Into<PathBuf>, block_size: u32, depth: u32) -> StoreResult<Self> {
        Self::open(StoreConfig::new(root).with_layout(block_size, depth))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &TreeLayout {
        self.codec.layout()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn codec(&self) -> &PathCodec {
        &self.codec
    }

    /// Absolute path of an existing item.
    fn resolve(&self, id: &str) -> StoreResult<(ContentId, PathBuf)> {
        let (id, relative) = self.codec.path_for_str(id)?;
        let path = self.root.join(relative);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok((id, path)),
            Ok(_) => Err(StoreError::NotFound { id, path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound { id, path }),
            Err(e) => Err(StoreError::read(path, e)),
        }
    }

    /// Stream `content` into `file`, returning the number of bytes written.
    fn write_content(&self, file: File, content: &mut dyn Read) -> io::Result<u64> {
        let mut writer = BufWriter::new(file);
        let written = io::copy(content, &mut writer)?;
        writer.flush()?;
        if self.config.sync_writes {
            writer.get_ref().sync_all()?;
        }
        Ok(written)
    }

    /// Make the current content of `path` reachable as `previous`.
    ///
    /// A hard link leaves the canonical name in place. Filesystems without
    /// hard links get the old content renamed aside instead, and the item
    /// is briefly missing until the new content is installed.
    fn set_aside(&self, path: &Path, previous: &Path) -> io::Result<()> {
        remove_if_present(previous)?;
        match self.link(path, previous) {
            Ok(()) => Ok(()),
            Err(e) if links_unsupported(&e) => {
                debug!(
                    path = %path.display(),
                    error = %e,
                    "hard links unavailable, renaming instead"
                );
                fs::rename(path, previous)
            }
            Err(e) => Err(e),
        }
    }

    fn link(&self, path: &Path, previous: &Path) -> io::Result<()> {
        #[cfg(test)]
        self.faults.check_link()?;
        fs::hard_link(path, previous)
    }

    /// Move the fully written incoming file over the canonical name.
    fn install(&self, incoming: &Path, path: &Path) -> io::Result<()> {
        #[cfg(test)]
        self.faults.check_install()?;
        fs::rename(incoming, path)
    }

    /// Undo [`set_aside`](Self::set_aside) after a failed install.
    fn roll_back(&self, id: &ContentId, path: &Path, previous: &Path) {
        if path.exists() {
            // Linked aside: the canonical file still holds the old content.
            if let Err(e) = remove_if_present(previous) {
                warn!(path = %previous.display(), error = %e, "failed to remove previous content");
            }
        } else if let Err(e) = fs::rename(previous, path) {
            error!(
                %id,
                previous = %previous.display(),
                error = %e,
                "failed to restore previous content"
            );
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        #[cfg(test)]
        self.faults.check_delete()?;
        fs::remove_file(path)
    }
}

impl ContentStore for FileSystemContentStore {
    fn create(
        &self,
        content: &mut dyn Read,
        size_hint: Option<u64>,
    ) -> StoreResult<ContentHandle> {
        let Reservation { id, path } = self.allocator.reserve_next()?;

        // The slot stays reserved if writing fails: the identifier is burned.
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StoreError::write(&path, e))?;
        let written = self
            .write_content(file, content)
            .map_err(|e| StoreError::write(&path, e))?;

        if let Some(hint) = size_hint.filter(|hint| *hint != written) {
            debug!(%id, hint, written, "size hint did not match content length");
        }
        debug!(%id, path = %path.display(), bytes = written, "content created");
        Ok(ContentHandle::new(id, path, Some(written)))
    }

    fn fetch(&self, id: &str) -> StoreResult<ContentHandle> {
        let (id, path) = self.resolve(id)?;
        Ok(ContentHandle::new(id, path, None))
    }

    fn update(
        &self,
        id: &str,
        content: &mut dyn Read,
        size_hint: Option<u64>,
    ) -> StoreResult<ContentHandle> {
        let (id, path) = self.resolve(id)?;
        let incoming = sibling(&path, INCOMING_SUFFIX);
        let previous = sibling(&path, PREVIOUS_SUFFIX);

        // The incoming file doubles as the per-item update lock.
        let file = match OpenOptions::new().write(true).create_new(true).open(&incoming) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::ConflictingUpdate(id));
            }
            Err(e) => return Err(StoreError::write(incoming, e)),
        };
        let mut guard = IncomingGuard::new(incoming);

        let written = self
            .write_content(file, content)
            .map_err(|e| StoreError::write(&guard.path, e))?;

        self.set_aside(&path, &previous)
            .map_err(|e| StoreError::write(&previous, e))?;
        let aside = file_identity(&previous);

        if let Err(e) = self.install(&guard.path, &path) {
            self.roll_back(&id, &path, &previous);
            return Err(StoreError::write(path, e));
        }
        guard.disarm();
        discard_previous(&previous, aside);

        if let Some(hint) = size_hint.filter(|hint| *hint != written) {
            debug!(%id, hint, written, "size hint did not match content length");
        }
        debug!(%id, path = %path.display(), bytes = written, "content updated");
        Ok(ContentHandle::new(id, path, Some(written)))
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let (id, path) = self.resolve(id)?;
        match self.remove(&path) {
            Ok(()) => {
                debug!(%id, path = %path.display(), "content deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound { id, path }),
            Err(source) => Err(StoreError::StorageDeleteFailed { path, source }),
        }
    }
}

impl std::fmt::Debug for FileSystemContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemContentStore")
            .field("root", &self.root)
            .field("block_size", &self.layout().block_size())
            .field("depth", &self.layout().depth())
            .finish()
    }
}

/// `path` with `suffix` appended to its file name.
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Errors from `hard_link` meaning the filesystem cannot link at all.
/// FAT-style filesystems report `EPERM` rather than `ENOTSUP`.
fn links_unsupported(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
    )
}

/// Device and inode of `path`, if the platform exposes them.
#[cfg(unix)]
fn file_identity(path: &Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    fs::symlink_metadata(path).ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn file_identity(_path: &Path) -> Option<(u64, u64)> {
    None
}

/// Remove the previous file left by a successful update.
///
/// Once the new content is installed the item is open for the next update,
/// which may already have set its own previous file aside under the same
/// name. That file is left alone.
fn discard_previous(previous: &Path, aside: Option<(u64, u64)>) {
    if aside.is_some() && file_identity(previous) != aside {
        debug!(path = %previous.display(), "previous file belongs to a later update");
        return;
    }
    if let Err(e) = remove_if_present(previous) {
        warn!(path = %previous.display(), error = %e, "failed to remove previous content");
    }
}

/// Removes the incoming file on every exit that did not install it.
///
/// Once installed the incoming name may already belong to the next update,
/// so the guard must be disarmed rather than left to delete it.
struct IncomingGuard {
    path: PathBuf,
    armed: bool,
}

impl IncomingGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for IncomingGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = remove_if_present(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove incoming file");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::FileSystemContentStore;

    /// Switches that make specific steps fail on demand.
    #[derive(Debug, Default)]
    pub(crate) struct Faults {
        fail_install: AtomicBool,
        fail_link: AtomicBool,
        no_hard_links: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl Faults {
        pub(crate) fn check_install(&self) -> io::Result<()> {
            if self.fail_install.load(Ordering::SeqCst) {
                return Err(io::Error::other("injected install failure"));
            }
            Ok(())
        }

        pub(crate) fn check_link(&self) -> io::Result<()> {
            if self.no_hard_links.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::Unsupported));
            }
            if self.fail_link.load(Ordering::SeqCst) {
                return Err(io::Error::other("injected link failure"));
            }
            Ok(())
        }

        pub(crate) fn check_delete(&self) -> io::Result<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(io::Error::other("injected delete failure"));
            }
            Ok(())
        }
    }

    impl FileSystemContentStore {
        pub(crate) fn fail_install(&self, fail: bool) {
            self.faults.fail_install.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn fail_link(&self, fail: bool) {
            self.faults.fail_link.store(fail, Ordering::SeqCst);
        }

        /// Behave like a filesystem without hard links.
        pub(crate) fn without_hard_links(&self, disabled: bool) {
            self.faults.no_hard_links.store(disabled, Ordering::SeqCst);
        }

        pub(crate) fn fail_delete(&self, fail: bool) {
            self.faults.fail_delete.store(fail, Ordering::SeqCst);
        }
    }
}
