//! External service integrations

pub mod google;
pub mod identity;

pub use google::GoogleCalendarClient;
pub use identity::HttpIdentityVerifier;
