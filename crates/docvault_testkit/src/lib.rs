//! # DocVault Testkit
//!
//! Test utilities for DocVault.
//!
//! This crate provides:
//! - Test fixtures with scratch data directories
//! - Property-based test generators using proptest
//! - Crash simulation for interrupted writes
//! - Concurrency stress harnesses
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docvault_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_temp_store(|store| {
//!         store.create("posts", post("p1", "Hello")).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use docvault_core::{Config, CoreError, Document, Query, SortOrder, StorageEngine};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
