use std::io::Read;

use crate::error::{StoreError, StoreResult};
use crate::handle::ContentHandle;

/// Identifier-keyed binary content store.
///
/// All implementations must satisfy these invariants:
/// - Two concurrent `create` calls never receive the same identifier.
/// - Identifiers are never reused, not even after `delete`.
/// - A reader only ever sees complete content: either what was stored
///   before an `update` or what the `update` wrote, never a mix.
/// - Updates to one identifier are exclusive; a second concurrent update
///   fails with [`StoreError::ConflictingUpdate`] instead of waiting.
/// - All I/O errors are propagated, never silently ignored.
pub trait ContentStore: Send + Sync {
    /// Store `content` under a freshly allocated identifier.
    ///
    /// `size_hint` is advisory only; the returned handle carries the number
    /// of bytes actually written.
    fn create(&self, content: &mut dyn Read, size_hint: Option<u64>)
        -> StoreResult<ContentHandle>;

    /// Look up an existing item.
    fn fetch(&self, id: &str) -> StoreResult<ContentHandle>;

    /// Replace the content of an existing item.
    ///
    /// On error the previous content is left intact.
    fn update(
        &self,
        id: &str,
        content: &mut dyn Read,
        size_hint: Option<u64>,
    ) -> StoreResult<ContentHandle>;

    /// Remove an item. Its identifier is never handed out again.
    fn delete(&self, id: &str) -> StoreResult<()>;

    /// Check whether an item exists.
    ///
    /// Default implementation calls `fetch()` and maps `NotFound` to `false`.
    fn exists(&self, id: &str) -> StoreResult<bool> {
        match self.fetch(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
