//! Common functionality for the raven error capture client.
//!
//! This crate holds the pieces shared by the protocol, configuration and transport crates:
//! parsing of [`Dsn`]s, the `X-Sentry-Auth` header in [`Auth`], and unix timestamps.

#![warn(missing_docs)]

mod auth;
mod dsn;
mod macros;
pub mod time;

pub use self::auth::*;
pub use self::dsn::*;

/// The version of the store protocol spoken by this client.
pub const PROTOCOL_VERSION: u16 = 5;

/// The name of this client as reported to the collector.
pub const CLIENT_NAME: &str = "raven-rust";

/// The version of this client as reported to the collector.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the user agent string, which is also used as `sentry_client` in the auth header.
pub fn user_agent() -> String {
    format!("{CLIENT_NAME}/{CLIENT_VERSION}")
}
