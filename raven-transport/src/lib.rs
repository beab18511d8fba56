//! Delivery of event documents to the collector.
//!
//! A [`Transport`] ships an encoded [`Payload`]. Transports do not track failures themselves;
//! callers consult a shared [`TransportState`] before each attempt and report the outcome back
//! to it, which yields an exponential backoff after consecutive failures.
//!
//! Use [`from_config`] to build the transport selected by a [`Config`](raven_config::Config).

#![warn(missing_docs)]

mod encoding;
mod error;
mod http;
mod state;
mod transport;
mod udp;

pub use self::encoding::*;
pub use self::error::*;
pub use self::http::*;
pub use self::state::*;
pub use self::transport::*;
pub use self::udp::*;
