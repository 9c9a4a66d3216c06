//! Kiwi-core: Shared types, errors, and configuration
//!
//! This crate provides the foundational types used across the Kiwi workspace:
//! identifiers, network selection, the error taxonomy and fee configuration.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
