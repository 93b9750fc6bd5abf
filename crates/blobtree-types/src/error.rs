use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("invalid tree layout (block size {block_size}, depth {depth}): {reason}")]
    InvalidLayout {
        block_size: u32,
        depth: u32,
        reason: String,
    },
}

impl TypeError {
    pub(crate) fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
