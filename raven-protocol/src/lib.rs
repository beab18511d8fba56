//! The event protocol spoken by the raven client.
//!
//! An [`Event`] is assembled from raw input, enriched and finally serialized into a JSON document
//! with [`Event::to_document`]. Only fields holding a value are emitted; an unset field is omitted
//! rather than sent as `null`.
//!
//! Structured sub-payloads of an event are modelled as the closed [`Interface`] set. Each event
//! holds at most one interface per [`InterfaceKind`].

#![warn(missing_docs)]

mod breadcrumb;
mod event;
mod exception;
mod interface;
mod logentry;
mod request;
mod span;
mod stacktrace;

pub use self::breadcrumb::*;
pub use self::event::*;
pub use self::exception::*;
pub use self::interface::*;
pub use self::logentry::*;
pub use self::request::*;
pub use self::span::*;
pub use self::stacktrace::*;

/// A generic JSON object, used for free-form payloads such as `extra` and `contexts`.
pub type Object = serde_json::Map<String, serde_json::Value>;
