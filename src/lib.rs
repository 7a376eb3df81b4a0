//! Hash key + range key tables for redb.
//!
//! Values are addressed by a (hash key, range key) pair. Both keys are packed
//! into one [`CompositeKey`] whose order is hash key first, range key second,
//! so every entry under a hash key can be scanned in range key order, whole
//! or between two range keys.

pub mod config;
pub mod db;
pub mod encoding;
pub mod error;
pub mod table;

// Re-export common types for convenience
pub use config::DbConfig;
pub use db::Db;
pub use encoding::{CompositeKey, EncodingError};
pub use error::{Error, Result};
pub use table::{RangeCursor, RangeTable};
