//! Shared HTTP client

pub mod client;

pub use client::{HttpClient, HttpClientBuilder, RetryPolicy, USER_AGENT};
