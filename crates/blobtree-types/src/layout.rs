use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::TypeError;
use crate::id::ContentId;

/// Deepest supported tree. An item path of this many segments still fits
/// well within the path length limits of common filesystems.
pub const MAX_DEPTH: u32 = 128;

/// Shape of the directory tree items are stored in.
///
/// - `block_size` (B) is the maximum number of children of any directory.
/// - `depth` (D) is the number of path segments of one item: D - 1 nested
///   directories followed by the file name.
///
/// The layout is fixed for the life of a populated root: changing either
/// value remaps every existing identifier to a different path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TreeLayout {
    block_size: u32,
    depth: u32,
}

impl TreeLayout {
    pub fn new(block_size: u32, depth: u32) -> Result<Self, TypeError> {
        if block_size < 2 {
            return Err(TypeError::InvalidLayout {
                block_size,
                depth,
                reason: "block size must be at least 2".into(),
            });
        }
        if depth < 2 {
            return Err(TypeError::InvalidLayout {
                block_size,
                depth,
                reason: "depth must be at least 2".into(),
            });
        }
        if depth > MAX_DEPTH {
            return Err(TypeError::InvalidLayout {
                block_size,
                depth,
                reason: format!("depth must be at most {MAX_DEPTH}"),
            });
        }
        Ok(Self { block_size, depth })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of directory levels above the item files (D - 1).
    pub fn directory_levels(&self) -> usize {
        self.depth as usize - 1
    }

    /// Total number of identifiers this layout can address (B^D).
    pub fn capacity(&self) -> BigUint {
        BigUint::from(self.block_size).pow(self.depth)
    }

    /// Returns `true` if `id` is addressable under this layout.
    pub fn contains(&self, id: &ContentId) -> bool {
        id.as_biguint() < &self.capacity()
    }
}

/// The D base-B digits of an identifier, most significant first.
///
/// `digits[i] = floor(id / B^(D-1-i)) mod B`. The first D - 1 digits name
/// directories from the root, the last one names the file in the leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Coordinate {
    digits: Vec<u32>,
}

impl Coordinate {
    /// Decompose `id` into its coordinate under `layout`.
    pub fn from_id(layout: &TreeLayout, id: &ContentId) -> Result<Self, TypeError> {
        if !layout.contains(id) {
            return Err(TypeError::invalid_identifier(
                id.to_string(),
                format!("out of range for a tree of capacity {}", layout.capacity()),
            ));
        }
        let radix = BigUint::from(layout.block_size);
        let mut rest = id.as_biguint().clone();
        let mut digits = vec![0u32; layout.depth as usize];
        for slot in digits.iter_mut().rev() {
            // Every remainder is < B, which is itself a u32.
            *slot = (&rest % &radix).to_u32().unwrap_or_default();
            rest /= &radix;
        }
        debug_assert!(rest.is_zero());
        Ok(Self { digits })
    }

    /// Build a coordinate from explicit digits, checking count and range.
    pub fn from_digits(layout: &TreeLayout, digits: Vec<u32>) -> Result<Self, TypeError> {
        if digits.len() != layout.depth as usize {
            return Err(TypeError::invalid_identifier(
                format!("{digits:?}"),
                format!("expected {} digits, got {}", layout.depth, digits.len()),
            ));
        }
        if let Some(d) = digits.iter().find(|d| **d >= layout.block_size) {
            return Err(TypeError::invalid_identifier(
                format!("{digits:?}"),
                format!("digit {d} is not below block size {}", layout.block_size),
            ));
        }
        Ok(Self { digits })
    }

    /// Recombine the digits: `Σ digit[i] * B^(D-1-i)`.
    pub fn to_id(&self, layout: &TreeLayout) -> ContentId {
        let radix = BigUint::from(layout.block_size);
        let value = self
            .digits
            .iter()
            .fold(BigUint::zero(), |acc, d| acc * &radix + BigUint::from(*d));
        ContentId::new(value)
    }

    pub fn digits(&self) -> &[u32] {
        &self.digits
    }

    /// Digits naming the directories, root first.
    pub fn directory_digits(&self) -> &[u32] {
        &self.digits[..self.digits.len() - 1]
    }

    /// Digit naming the file inside the leaf directory.
    pub fn leaf_index(&self) -> u32 {
        self.digits[self.digits.len() - 1]
    }
}
