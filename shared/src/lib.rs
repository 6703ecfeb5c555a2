//! Shared types and domain rules for the Storefront Books platform
//!
//! This crate contains the pure accounting domain: document kinds, monetary
//! rounding, serial number templates, the double-entry journal derivation and
//! input validation. Everything here is I/O-free so the core invariants can
//! be tested without a database.

pub mod journal;
pub mod models;
pub mod money;
pub mod types;
pub mod validation;

pub use journal::*;
pub use models::*;
pub use money::*;
pub use types::*;
pub use validation::*;
