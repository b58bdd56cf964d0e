//! # Calsync Domain
//!
//! Business domain types for the calendar synchronization engine.
//!
//! This crate contains:
//! - Connection, mirrored event and outbox records
//! - Provider page / token shapes
//! - The error taxonomy and Result alias
//! - Configuration structures and constants
//!
//! ## Architecture
//! - No dependencies on other calsync crates
//! - No I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
