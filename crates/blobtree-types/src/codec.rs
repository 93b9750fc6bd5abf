//! Bijection between identifiers and relative item paths.
//!
//! An identifier maps to D path segments: D - 1 directory names followed by
//! a file name, each the decimal form of one base-B digit with no padding.
//! Under B = 10, D = 3 the identifier `472` lives at `4/7/2` and `5` at `0/0/5`.

use std::path::{Component, Path, PathBuf};

use crate::error::TypeError;
use crate::id::ContentId;
use crate::layout::{Coordinate, TreeLayout};

/// Pure translation between [`ContentId`] and relative filesystem paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathCodec {
    layout: TreeLayout,
}

impl PathCodec {
    pub fn new(layout: TreeLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// Relative path of the item with identifier `id`.
    pub fn path_for_identifier(&self, id: &ContentId) -> Result<PathBuf, TypeError> {
        let coordinate = Coordinate::from_id(&self.layout, id)?;
        Ok(coordinate
            .digits()
            .iter()
            .map(|d| d.to_string())
            .collect::<PathBuf>())
    }

    /// Relative path of the item named by a caller-supplied identifier string.
    pub fn path_for_str(&self, id: &str) -> Result<(ContentId, PathBuf), TypeError> {
        let id = ContentId::parse(id)?;
        let path = self.path_for_identifier(&id)?;
        Ok((id, path))
    }

    /// Identifier of the item stored at the relative path `path`.
    ///
    /// Every one of the D segments must be a canonical decimal digit below
    /// B. This doubles as the filter for foreign entries found on disk.
    pub fn identifier_for_path(&self, path: &Path) -> Result<ContentId, TypeError> {
        let mut digits = Vec::with_capacity(self.layout.depth() as usize);
        for component in path.components() {
            let Component::Normal(segment) = component else {
                return Err(TypeError::invalid_identifier(
                    path.display().to_string(),
                    "path must be relative and contain only plain segments",
                ));
            };
            let segment = segment.to_str().ok_or_else(|| {
                TypeError::invalid_identifier(path.display().to_string(), "segment is not UTF-8")
            })?;
            digits.push(self.parse_segment(segment)?);
        }
        let coordinate = Coordinate::from_digits(&self.layout, digits)?;
        Ok(coordinate.to_id(&self.layout))
    }

    /// Parse one directory or file name as a digit of this layout.
    ///
    /// Only the canonical rendering is accepted: `"7"` parses, `"07"`,
    /// `"+7"` and `"7.incoming"` do not.
    pub fn parse_segment(&self, segment: &str) -> Result<u32, TypeError> {
        let canonical = !segment.is_empty()
            && segment.bytes().all(|b| b.is_ascii_digit())
            && (segment == "0" || !segment.starts_with('0'));
        if !canonical {
            return Err(TypeError::invalid_identifier(
                segment,
                "segment is not a canonical decimal digit",
            ));
        }
        let digit: u32 = segment.parse().map_err(|_| {
            TypeError::invalid_identifier(segment, "segment does not fit a block index")
        })?;
        if digit >= self.layout.block_size() {
            return Err(TypeError::invalid_identifier(
                segment,
                format!("segment is not below block size {}", self.layout.block_size()),
            ));
        }
        Ok(digit)
    }
}
