use std::io::{self, Write};

use parking_lot::Mutex;
use raven_config::{Config, TransportKind};

use crate::{HttpTransport, Payload, TransportError, UdpTransport};

/// Ships encoded event payloads to a destination.
///
/// Implementations perform a single attempt per call and report failures as errors. Retry and
/// backoff are the caller's responsibility.
pub trait Transport: Send + Sync {
    /// Sends one payload.
    fn send_data(&self, payload: Payload) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_data(&self, payload: Payload) -> Result<(), TransportError> {
        (**self).send_data(payload)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send_data(&self, payload: Payload) -> Result<(), TransportError> {
        (**self).send_data(payload)
    }
}

/// Discards all payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send_data(&self, _payload: Payload) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Writes each payload as a line to standard output or another writer.
pub struct StdoutTransport {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl StdoutTransport {
    /// Creates a transport writing to standard output.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Creates a transport writing to the given writer.
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

impl Default for StdoutTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StdoutTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdoutTransport").finish_non_exhaustive()
    }
}

impl Transport for StdoutTransport {
    fn send_data(&self, payload: Payload) -> Result<(), TransportError> {
        let mut writer = self.writer.lock();
        writer.write_all(&payload.data)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Records payloads in memory, optionally failing every send.
#[derive(Debug, Default)]
pub struct DummyTransport {
    payloads: Mutex<Vec<Payload>>,
    failure: Option<String>,
}

impl DummyTransport {
    /// Creates a transport that accepts and records every payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that records every payload and then fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            payloads: Mutex::default(),
            failure: Some(message.into()),
        }
    }

    /// Returns all payloads received so far.
    pub fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().clone()
    }

    /// Returns the number of payloads received so far.
    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }

    /// Returns `true` if no payloads were received.
    pub fn is_empty(&self) -> bool {
        self.payloads.lock().is_empty()
    }
}

impl Transport for DummyTransport {
    fn send_data(&self, payload: Payload) -> Result<(), TransportError> {
        self.payloads.lock().push(payload);

        match self.failure {
            Some(ref message) => Err(TransportError::Io(io::Error::other(message.clone()))),
            None => Ok(()),
        }
    }
}

/// Stands in for a transport that could not be created. Every send fails with the original
/// configuration error.
#[derive(Debug)]
pub struct MisconfiguredTransport {
    reason: String,
}

impl MisconfiguredTransport {
    /// Creates a transport that fails every send with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Transport for MisconfiguredTransport {
    fn send_data(&self, _payload: Payload) -> Result<(), TransportError> {
        Err(TransportError::Config(self.reason.clone()))
    }
}

fn try_from_config(config: &Config) -> Result<Box<dyn Transport>, TransportError> {
    let kind = config.transport_kind();

    let transport: Box<dyn Transport> = match kind {
        TransportKind::Noop => Box::new(NoopTransport),
        TransportKind::Stdout => Box::new(StdoutTransport::new()),
        TransportKind::Http | TransportKind::Udp => {
            let dsn = config
                .dsn
                .clone()
                .ok_or_else(|| TransportError::Config("no dsn configured".to_owned()))?;

            if kind == TransportKind::Http {
                Box::new(HttpTransport::new(
                    dsn,
                    config.timeout(),
                    config.connection_timeout(),
                )?)
            } else {
                Box::new(UdpTransport::new(dsn)?)
            }
        }
    };

    Ok(transport)
}

/// Creates the transport selected by the config.
///
/// Configuration problems such as a missing DSN do not fail here. They are reported on every
/// send through a [`MisconfiguredTransport`].
pub fn from_config(config: &Config) -> Box<dyn Transport> {
    match try_from_config(config) {
        Ok(transport) => transport,
        Err(error) => {
            raven_log::warn!("transport not available: {}", raven_log::LogError(&error));
            match error {
                TransportError::Config(reason) => Box::new(MisconfiguredTransport::new(reason)),
                other => Box::new(MisconfiguredTransport::new(other.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use raven_config::Encoding;
    use serde_json::json;

    use super::*;
    use crate::encode;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn payload() -> Payload {
        encode(&json!({"message": "hi"}), Encoding::Json).unwrap()
    }

    #[test]
    fn test_stdout_writes_lines() {
        let buffer = SharedBuffer::default();
        let transport = StdoutTransport::with_writer(buffer.clone());

        transport.send_data(payload()).unwrap();
        transport.send_data(payload()).unwrap();

        let written = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert_eq!(written, "{\"message\":\"hi\"}\n{\"message\":\"hi\"}\n");
    }

    #[test]
    fn test_dummy_records() {
        let transport = DummyTransport::new();
        assert!(transport.is_empty());
        transport.send_data(payload()).unwrap();
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.payloads()[0], payload());

        let transport = DummyTransport::failing("connection refused");
        let error = transport.send_data(payload()).unwrap_err();
        assert!(error.is_network_error());
        assert_eq!(transport.len(), 1);
    }

    #[test]
    fn test_from_config_without_dsn_is_noop() {
        let transport = from_config(&Config::default());
        assert!(transport.send_data(payload()).is_ok());
    }

    #[test]
    fn test_from_config_http_without_dsn_fails_on_send() {
        raven_log::init_test!();

        let mut config = Config::default();
        config.transport.kind = Some(TransportKind::Http);

        let transport = from_config(&config);
        let error = transport.send_data(payload()).unwrap_err();
        assert!(matches!(error, TransportError::Config(_)));
        assert_eq!(
            error.to_string(),
            "invalid transport configuration: no dsn configured"
        );
    }

    #[test]
    fn test_from_config_udp_without_port_fails_on_send() {
        let config = Config::from_yaml_str("dsn: udp://public@localhost/42").unwrap();
        let transport = from_config(&config);
        assert!(matches!(
            transport.send_data(payload()),
            Err(TransportError::Config(_))
        ));
    }
}
