//! Scrubbing of sensitive data from serialized event documents.
//!
//! Processors run on the JSON document of an event after serialization and before it is handed to
//! a transport. The [`SanitizeProcessor`] masks values of sensitive keys, credit card numbers and
//! query string parameters. [`RemoveCookiesProcessor`] and [`RemovePostDataProcessor`] strip
//! request data that is not covered by key matching.

#![warn(missing_docs)]

mod config;
mod processor;
mod regexes;
mod request;
mod sanitize;

pub use self::config::*;
pub use self::processor::*;
pub use self::request::*;
pub use self::sanitize::*;

/// Replacement for masked string values.
pub const STRING_MASK: &str = "********";

/// Replacement for masked integer values.
pub const INT_MASK: i64 = 0;
