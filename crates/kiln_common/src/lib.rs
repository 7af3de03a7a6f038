//! Shared foundational types used across the Kiln shader compiler.
//!
//! This crate provides content hashing for fingerprints and cache keys, and the
//! internal-error result type shared by every compilation stage.

#![warn(missing_docs)]

pub mod hash;
pub mod result;

pub use hash::{ContentHash, ContentHasher};
pub use result::{InternalError, KilnResult};
