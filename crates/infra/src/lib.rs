//! # Calsync Infrastructure
//!
//! Infrastructure implementations of the sync engine's ports.
//!
//! This crate contains:
//! - SQLite repositories for connections, mirrored events, and the outbox
//! - The Google Calendar / OAuth token client and the identity verifier
//! - The outbox dispatcher and its conflict-check forwarder
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `calsync-core`
//! - Contains all "impure" code (I/O, network)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod sync;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder, RetryPolicy};
pub use integrations::*;
