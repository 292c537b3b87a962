//! Database module for SQLite persistence.
//!
//! Write helpers take a connection so they can run inside the store's
//! transaction; read helpers take the pool.

mod changes;
mod conflicts;
mod cursors;
mod documents;
mod pool;

pub use changes::*;
pub use conflicts::*;
pub use cursors::*;
pub use documents::*;
pub use pool::*;

/// Stored integers are signed; all counters here are non-negative.
pub(crate) fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

pub(crate) fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}
