//! Calendar synchronization pipeline
//!
//! Trigger -> connection lookup -> credential refresh -> fetch -> reconcile
//! -> cursor update -> outbox publish. Each stage lives in its own module so
//! it can be exercised with in-memory ports.

pub mod fetch;
pub mod ports;
pub mod publisher;
pub mod reconciler;
pub mod refresher;
pub mod service;
pub mod trigger;
