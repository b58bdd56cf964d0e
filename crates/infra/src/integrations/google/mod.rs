//! Google Calendar API and OAuth token endpoint.

mod client;

pub use client::GoogleCalendarClient;
