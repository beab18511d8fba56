use std::any::type_name;
use std::error::Error;
use std::sync::Arc;

use raven_protocol::{Exception, Values};

use crate::backtrace::BacktraceParser;

/// Type name used when none can be derived from an error.
const FALLBACK_TYPE: &str = "Error";

/// An exception as raised by the host application, before it is turned into an event.
///
/// Causes form a chain from the most recent exception to its root cause. Exceptions that were
/// re-raised with the same backtrace should share it through [`with_shared_backtrace`], so it is
/// only parsed and sent once.
///
/// [`with_shared_backtrace`]: Self::with_shared_backtrace
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawException {
    /// Type name, for example `ZeroDivisionError`.
    pub ty: String,
    /// The exception's message.
    pub value: String,
    /// The module declaring the exception type.
    pub module: Option<String>,
    /// Raw backtrace lines, innermost frame first.
    pub backtrace: Option<Arc<[String]>>,
    /// The exception that caused this one.
    pub cause: Option<Box<RawException>>,
}

impl RawException {
    /// Creates an exception without backtrace or cause.
    pub fn new(ty: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Sets the module declaring the exception type.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Sets the raw backtrace.
    pub fn with_backtrace<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_shared_backtrace(lines.into_iter().map(Into::into).collect())
    }

    /// Sets a backtrace that may be shared with other exceptions of the chain.
    pub fn with_shared_backtrace(mut self, backtrace: Arc<[String]>) -> Self {
        self.backtrace = Some(backtrace);
        self
    }

    /// Sets the exception that caused this one.
    pub fn with_cause(mut self, cause: RawException) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Converts an error and its [`source`](Error::source) chain.
    ///
    /// The type of the outermost error is taken from its type name. Sources are type-erased, so
    /// their type is read from the leading identifier of their `Debug` output.
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let (module, ty) = match split_type_name(type_name::<E>()) {
            Some((module, ty)) => (module, ty),
            None => (None, type_from_debug(&format!("{error:?}"))),
        };

        let mut sources = Vec::new();
        let mut source = error.source();
        while let Some(inner) = source {
            sources.push(Self::new(type_from_debug(&format!("{inner:?}")), inner.to_string()));
            source = inner.source();
        }

        let cause = sources
            .into_iter()
            .rev()
            .reduce(|cause, exception| exception.with_cause(cause));

        Self {
            ty,
            value: error.to_string(),
            module,
            backtrace: None,
            cause: cause.map(Box::new),
        }
    }

    /// Iterates over this exception and its causes, most recent first.
    pub fn chain(&self) -> impl Iterator<Item = &RawException> {
        std::iter::successors(Some(self), |exception| exception.cause.as_deref())
    }

    /// Builds the exception interface, oldest cause first.
    ///
    /// A backtrace shared by several exceptions of the chain is attached only to the first of
    /// them in wire order.
    pub fn to_values(&self, parser: &BacktraceParser) -> Values<Exception> {
        let mut chain: Vec<_> = self.chain().collect();
        chain.reverse();

        let mut seen: Vec<&Arc<[String]>> = Vec::new();
        let mut values = Vec::with_capacity(chain.len());

        for raw in chain {
            let mut stacktrace = None;
            if let Some(backtrace) = &raw.backtrace
                && !seen.iter().any(|other| Arc::ptr_eq(other, backtrace))
            {
                seen.push(backtrace);
                stacktrace = Some(parser.stacktrace(backtrace));
            }

            values.push(Exception {
                ty: raw.ty.clone(),
                value: raw.value.clone(),
                module: raw.module.clone(),
                stacktrace,
            });
        }

        Values::new(values)
    }
}

/// Splits a plain type path like `std::num::ParseIntError` into module and name.
fn split_type_name(name: &str) -> Option<(Option<String>, String)> {
    if name.contains(['<', '>', ' ', '&', '[', '(']) {
        return None;
    }

    Some(match name.rsplit_once("::") {
        Some((module, ty)) => (Some(module.to_owned()), ty.to_owned()),
        None => (None, name.to_owned()),
    })
}

fn type_from_debug(debug: &str) -> String {
    let ident: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        FALLBACK_TYPE.to_owned()
    } else {
        ident
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use raven_config::StacktraceConfig;
    use similar_asserts::assert_eq;

    use super::*;

    #[derive(Debug)]
    struct ConnectError {
        source: std::io::Error,
    }

    impl fmt::Display for ConnectError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("could not connect")
        }
    }

    impl Error for ConnectError {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.source)
        }
    }

    #[test]
    fn test_from_error() {
        let error = "12a".parse::<u32>().unwrap_err();
        let exception = RawException::from_error(&error);

        assert_eq!(exception.ty, "ParseIntError");
        assert!(exception.cause.is_none());
        assert!(exception.module.unwrap().starts_with("core::num"));
        assert_eq!(exception.value, "invalid digit found in string");
    }

    #[test]
    fn test_from_error_with_source() {
        let error = ConnectError {
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        let exception = RawException::from_error(&error);

        assert_eq!(exception.ty, "ConnectError");
        let cause = exception.cause.as_deref().unwrap();
        assert_eq!(cause.ty, "Custom");
        assert_eq!(cause.value, "refused");
    }

    #[test]
    fn test_from_dyn_error() {
        let error: Box<dyn Error> = Box::new(ConnectError {
            source: std::io::Error::other("refused"),
        });
        let exception = RawException::from_error(error.as_ref());

        assert_eq!(exception.ty, "ConnectError");
        assert_eq!(exception.module, None);
        assert_eq!(exception.chain().count(), 2);
    }

    #[test]
    fn test_values_oldest_cause_first() {
        let exception = RawException::new("RuntimeError", "outer")
            .with_cause(RawException::new("IOError", "middle").with_cause(RawException::new(
                "SocketError",
                "inner",
            )));

        let values = exception.to_values(&BacktraceParser::default());
        let types: Vec<_> = values.values.iter().map(|e| e.ty.as_str()).collect();
        assert_eq!(types, ["SocketError", "IOError", "RuntimeError"]);
    }

    #[test]
    fn test_shared_backtrace_attached_once() {
        let backtrace: Arc<[String]> = vec!["src/main.rs:3:in `main'".to_owned()].into();
        let exception = RawException::new("RuntimeError", "reraised")
            .with_shared_backtrace(backtrace.clone())
            .with_cause(
                RawException::new("ZeroDivisionError", "divided by 0")
                    .with_shared_backtrace(backtrace),
            );

        let parser = BacktraceParser::new(&StacktraceConfig::default());
        let values = exception.to_values(&parser).values;

        assert!(values[0].stacktrace.is_some());
        assert!(values[1].stacktrace.is_none());
    }

    #[test]
    fn test_distinct_backtraces_are_kept() {
        let exception = RawException::new("RuntimeError", "outer")
            .with_backtrace(["src/a.rs:1"])
            .with_cause(RawException::new("IOError", "inner").with_backtrace(["src/a.rs:1"]));

        let values = exception.to_values(&BacktraceParser::default()).values;
        assert!(values.iter().all(|e| e.stacktrace.is_some()));
    }

    #[test]
    fn test_type_from_debug() {
        assert_eq!(type_from_debug("Os { code: 2 }"), "Os");
        assert_eq!(type_from_debug("\"message\""), "Error");
        assert_eq!(type_from_debug("42"), "Error");
    }
}
