//! Shared domain types for the Reel project.

pub mod config;
pub mod frame;

mod errors;

pub use errors::{ReelError, Result};
