//! Filesystem-backed binary content store.
//!
//! Given an opaque byte stream the store allocates a fresh identifier,
//! persists the bytes under a bounded fan-out directory tree, and later
//! serves, replaces, or deletes them by identifier. No database or lock
//! service is involved: only create, rename, link, delete, and list.
//!
//! # Layout
//!
//! With block size B and depth D, identifier `n` lives at the path spelled
//! by its D base-B digits (see [`blobtree_types::PathCodec`]). Directories
//! fill up to B children before a sibling is opened, so no directory ever
//! holds more than B items however many are stored.
//!
//! # Storage Backends
//!
//! All backends implement the [`ContentStore`] trait:
//!
//! - [`FileSystemContentStore`] -- directory-tree store rooted at one path
//!
//! # Design Rules
//!
//! 1. Identifiers are handed out once and never reused, not even after delete.
//! 2. Slots are claimed by exclusive file creation; the allocation lock only
//!    serializes the choice of slot, never the content write.
//! 3. Updates stream into a sibling file and are swapped in by rename, so
//!    readers see either the old or the new content, never a mix.
//! 4. Updates to one item are exclusive; updates to different items run in parallel.
//! 5. The allocation cursor is a cache; the directory tree is the only truth.
//! 6. Failures to clean up transient files are logged, never escalated.

pub mod config;
pub mod error;
pub mod fs;
pub mod handle;
pub mod maintenance;
pub mod traits;

mod allocator;
mod folder;

// Re-export primary types at crate root for ergonomic imports.
pub use blobtree_types::{ContentId, PathCodec, TreeLayout};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use fs::FileSystemContentStore;
pub use handle::ContentHandle;
pub use maintenance::RecoveryReport;
pub use traits::ContentStore;
