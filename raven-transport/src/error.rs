use std::io;

/// An error returned when an event could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is missing credentials or an endpoint.
    #[error("invalid transport configuration: {0}")]
    Config(String),

    /// Sending was suppressed after previous failures.
    #[error("not sending event due to previous failure(s)")]
    BackedOff,

    /// The document could not be serialized.
    #[error("could not serialize event")]
    Encode(#[from] serde_json::Error),

    /// The payload could not be compressed.
    #[error("could not compress event")]
    Compress(#[source] io::Error),

    /// The collector rejected the event.
    #[error("{message}")]
    Http {
        /// The HTTP status code of the response.
        status: u16,
        /// Description including the collector's `x-sentry-error` header.
        message: String,
    },

    /// The HTTP request failed.
    #[error("could not send request")]
    Reqwest(#[from] reqwest::Error),

    /// Writing the payload failed.
    #[error("could not write payload")]
    Io(#[from] io::Error),

    /// The asynchronous callback failed.
    #[error("async callback failed: {0}")]
    Async(String),
}

impl TransportError {
    /// Returns `true` if the error indicates that the collector is unreachable.
    pub fn is_network_error(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Reqwest(error) => error.is_timeout() || error.is_connect(),
            Self::Http { status, .. } => *status >= 500,
            Self::Config(_)
            | Self::BackedOff
            | Self::Encode(_)
            | Self::Compress(_)
            | Self::Async(_) => false,
        }
    }
}
