//! In-process capture and delivery of errors, messages and transactions.
//!
//! A [`Client`] turns raw input into an [`Event`](raven_protocol::Event), enriches it with the
//! configuration defaults and a [`Scope`], scrubs sensitive data from its document and hands it to
//! a transport. Delivery failures never reach the host application. They are logged, reported to
//! an optional failure callback, and push the transport into a backoff.
//!
//! ```no_run
//! use raven::{Client, Config, RawException};
//!
//! let config = Config::from_path("raven.yml").unwrap();
//! raven::init_logging(&config.logging);
//!
//! let client = Client::new(config).unwrap();
//! let mut scope = client.new_scope();
//! scope.set_tag("component", "billing");
//!
//! let exception = RawException::new("ZeroDivisionError", "divided by 0")
//!     .with_backtrace(["src/billing.rs:42:in `billing::invoice::total'"]);
//! client.capture_exception(&exception, &scope);
//! ```

#![warn(missing_docs)]

mod backtrace;
mod client;
mod dispatcher;
mod event;
mod exception;
mod linecache;
mod scope;

pub use self::backtrace::*;
pub use self::client::*;
pub use self::dispatcher::*;
pub use self::event::*;
pub use self::exception::*;
pub use self::linecache::*;
pub use self::scope::*;

pub use raven_common as common;
pub use raven_config::Config;
pub use raven_log::{LogConfig, LogFormat, init as init_logging};
pub use raven_pii as pii;
pub use raven_protocol as protocol;
pub use raven_transport as transport;
