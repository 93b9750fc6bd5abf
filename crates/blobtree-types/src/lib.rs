//! Foundation types for blobtree.
//!
//! This crate provides the identifier and tree-shape types shared by the
//! storage engine and its clients. It performs no I/O.
//!
//! # Key Types
//!
//! - [`ContentId`] -- Arbitrary-precision identifier of one stored item
//! - [`TreeLayout`] -- Block size and depth of the storage tree
//! - [`Coordinate`] -- Base-B digits of an identifier, one per path segment
//! - [`PathCodec`] -- Identifier ↔ relative path bijection

pub mod codec;
pub mod error;
pub mod id;
pub mod layout;

pub use codec::PathCodec;
pub use error::TypeError;
pub use id::ContentId;
pub use layout::{Coordinate, TreeLayout, MAX_DEPTH};
