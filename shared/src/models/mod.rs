//! Domain models for the Storefront Books platform

mod account;
mod document;
mod line_item;
mod serial;

pub use account::*;
pub use document::*;
pub use line_item::*;
pub use serial::*;
