//! CLI command implementations.

pub mod backup;
pub mod clear_cache;
pub mod stats;
pub mod validate;
