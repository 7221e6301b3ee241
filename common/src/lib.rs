//! Shared primitives for the dashboard workspace.
//!
//! Both the `sync-core` library and the `dashboard` host binary report errors
//! with the source position that produced them. That position type lives here
//! so every crate formats it identically.

pub mod error;

pub use error::error_location::ErrorLocation;
