use serde::Serialize;

use crate::{Exception, LogEntry, Request, Stacktrace, Values};

/// Identifies the kind of an [`Interface`].
///
/// The ordering of kinds determines the order in which interfaces are serialized.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum InterfaceKind {
    /// The exception cause chain.
    Exception,
    /// A stack trace attached directly to the event.
    Stacktrace,
    /// The HTTP request being handled.
    Request,
    /// A parameterized log message.
    Message,
}

impl InterfaceKind {
    /// Returns the key under which the interface is serialized.
    pub fn key(self) -> &'static str {
        match self {
            InterfaceKind::Exception => "exception",
            InterfaceKind::Stacktrace => "stacktrace",
            InterfaceKind::Request => "request",
            InterfaceKind::Message => "logentry",
        }
    }
}

/// A structured sub-payload of an event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Interface {
    /// Exception cause chain, oldest cause first.
    Exception(Values<Exception>),
    /// Stack trace of a message event.
    Stacktrace(Stacktrace),
    /// HTTP request information.
    Request(Box<Request>),
    /// Log message with parameters.
    Message(LogEntry),
}

impl Interface {
    /// Returns the kind of this interface.
    pub fn kind(&self) -> InterfaceKind {
        match self {
            Interface::Exception(_) => InterfaceKind::Exception,
            Interface::Stacktrace(_) => InterfaceKind::Stacktrace,
            Interface::Request(_) => InterfaceKind::Request,
            Interface::Message(_) => InterfaceKind::Message,
        }
    }
}

impl From<Values<Exception>> for Interface {
    fn from(values: Values<Exception>) -> Self {
        Interface::Exception(values)
    }
}

impl From<Stacktrace> for Interface {
    fn from(stacktrace: Stacktrace) -> Self {
        Interface::Stacktrace(stacktrace)
    }
}

impl From<Request> for Interface {
    fn from(request: Request) -> Self {
        Interface::Request(Box::new(request))
    }
}

impl From<LogEntry> for Interface {
    fn from(entry: LogEntry) -> Self {
        Interface::Message(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let interface = Interface::from(LogEntry::new("hi", vec![]));
        assert_eq!(interface.kind(), InterfaceKind::Message);
        assert_eq!(interface.kind().key(), "logentry");

        let interface = Interface::from(Request::default());
        assert_eq!(interface.kind().key(), "request");
    }
}
