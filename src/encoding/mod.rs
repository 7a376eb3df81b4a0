//! Composite key encoding.
//!
//! Turns a (hash key, range key) pair into a single byte string that sorts
//! by hash key first and range key second, and builds the byte bounds used
//! for range scans.

use thiserror::Error;

pub mod key;

pub use key::{
    decode_composite, encode_composite, encode_hash, encode_range, hash_lower_bound,
    hash_upper_bound, range_lower_bound, range_upper_bound, CompositeKey,
};

/// Errors raised while decoding stored keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A stored key cannot be decoded with the current key types.
    #[error("Corrupt key: {0}")]
    CorruptKey(String),
}
