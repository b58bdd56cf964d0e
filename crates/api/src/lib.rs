//! # Calsync API
//!
//! HTTP layer - router, handlers and entry point wiring.
//!
//! This crate contains:
//! - The sync endpoint (handshake, push, manual) plus `OPTIONS` and `/health`
//! - Application context (dependency injection)
//! - Error rendering and tracing setup
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod context;
pub mod error;
pub mod handlers;
pub mod router;
pub mod utils;

// Re-export for convenience
pub use context::AppContext;
pub use error::{ApiError, ErrorResponse};
pub use router::{build_cors_layer, router};
