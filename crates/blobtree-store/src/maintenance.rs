use std::fs;

use blobtree_types::ContentId;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::fs::{FileSystemContentStore, INCOMING_SUFFIX, PREVIOUS_SUFFIX};

/// What [`FileSystemContentStore::recover`] did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Previous files moved back because their item was missing.
    pub restored: usize,
    /// Previous files removed because their item was intact.
    pub removed_previous: usize,
    /// Incoming files of interrupted updates removed.
    pub removed_incoming: usize,
    /// Entries that could not be cleaned up.
    pub failures: usize,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl FileSystemContentStore {
    /// Clean up after updates interrupted by a crash.
    ///
    /// An update leaves at most two transient siblings next to its item: the
    /// incoming file with the new bytes and the previous file with the old
    /// ones. The canonical file is never partially written, so recovery only
    /// has to put a missing item back from its previous file and throw the
    /// rest away.
    ///
    /// Must run before the store is used concurrently: an incoming file of
    /// a live update is indistinguishable from a stale one.
    pub fn recover(&self) -> StoreResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let depth = self.layout().depth() as usize;

        for entry in self.leaf_files(depth) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "failed to scan content tree");
                    report.failures += 1;
                    continue;
                }
            };
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let path = entry.path();

            if let Some(item) = self.transient_item(name, PREVIOUS_SUFFIX) {
                let canonical = path.with_file_name(item);
                if canonical.exists() {
                    match fs::remove_file(path) {
                        Ok(()) => report.removed_previous += 1,
                        Err(e) => {
                            warn!(
                                path = %path.display(),
                                error = %e,
                                "failed to remove previous file"
                            );
                            report.failures += 1;
                        }
                    }
                } else {
                    match fs::rename(path, &canonical) {
                        Ok(()) => {
                            info!(
                                path = %canonical.display(),
                                "restored content of interrupted update"
                            );
                            report.restored += 1;
                        }
                        Err(e) => {
                            warn!(
                                path = %path.display(),
                                error = %e,
                                "failed to restore previous file"
                            );
                            report.failures += 1;
                        }
                    }
                }
            } else if self.transient_item(name, INCOMING_SUFFIX).is_some() {
                match fs::remove_file(path) {
                    Ok(()) => report.removed_incoming += 1,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to remove incoming file");
                        report.failures += 1;
                    }
                }
            }
        }

        if report.is_clean() {
            debug!(root = %self.root().display(), "recovery found nothing to do");
        } else {
            info!(
                restored = report.restored,
                removed_previous = report.removed_previous,
                removed_incoming = report.removed_incoming,
                failures = report.failures,
                "recovery complete"
            );
        }
        Ok(report)
    }

    /// Identifiers of every stored item, ascending.
    ///
    /// Transient update siblings and foreign entries are skipped.
    pub fn list(&self) -> StoreResult<Vec<ContentId>> {
        let depth = self.layout().depth() as usize;
        let mut ids = Vec::new();
        for entry in self.leaf_files(depth) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(self.root()).to_path_buf();
                StoreError::read(path, e.into())
            })?;
            let relative = entry
                .path()
                .strip_prefix(self.root())
                .unwrap_or(entry.path());
            match self.codec().identifier_for_path(relative) {
                Ok(id) => ids.push(id),
                Err(_) => debug!(path = %entry.path().display(), "skipping non-item entry"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every regular file at item depth.
    fn leaf_files(
        &self,
        depth: usize,
    ) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
        WalkDir::new(self.root())
            .min_depth(depth)
            .max_depth(depth)
            .into_iter()
            .filter(|entry| {
                entry
                    .as_ref()
                    .map(|e| e.file_type().is_file())
                    .unwrap_or(true)
            })
    }

    /// The item name a transient sibling belongs to, if `name` is one.
    fn transient_item<'a>(&self, name: &'a str, suffix: &str) -> Option<&'a str> {
        name.strip_suffix(suffix)
            .filter(|item| self.codec().parse_segment(item).is_ok())
    }
}
