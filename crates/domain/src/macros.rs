//! Macro for implementing Display and FromStr for string-backed enums
//!
//! Outbox statuses and domain event types are persisted as TEXT columns and
//! travel as strings over the wire. This macro keeps the mapping in one place.
//!
//! # Example
//!
//! ```rust
//! use calsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum DispatchState {
//!     Queued,
//!     Delivered,
//! }
//!
//! impl_domain_status_conversions!(DispatchState {
//!     Queued => "queued",
//!     Delivered => "delivered",
//! });
//!
//! assert_eq!(DispatchState::Queued.to_string(), "queued");
//! assert_eq!("DELIVERED".parse::<DispatchState>(), Ok(DispatchState::Delivered));
//! ```

/// Implements `Display`, `FromStr` and `as_str` for string-backed enums.
///
/// Parsing is case-insensitive; output always uses the declared spelling.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let lowered = s.to_lowercase();
                $(if lowered == $str {
                    return Ok(Self::$variant);
                })+
                Err(format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}
