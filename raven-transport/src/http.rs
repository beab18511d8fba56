use std::time::Duration;

use raven_common::time::UnixTimestamp;
use raven_common::{Auth, Dsn, Scheme};
use reqwest::blocking::Client;
use reqwest::header;

use crate::{Payload, Transport, TransportError};

/// Name of the header carrying authentication.
pub const AUTH_HEADER: &str = "X-Sentry-Auth";

/// Response header with a description of why the collector rejected an event.
pub const ERROR_HEADER: &str = "x-sentry-error";

/// Posts payloads to the store endpoint of the DSN.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    dsn: Dsn,
    store_url: String,
}

impl HttpTransport {
    /// Creates a transport for an `http` or `https` DSN.
    pub fn new(
        dsn: Dsn,
        timeout: Duration,
        connection_timeout: Duration,
    ) -> Result<Self, TransportError> {
        if !matches!(dsn.scheme(), Scheme::Http | Scheme::Https) {
            return Err(TransportError::Config(format!(
                "unsupported scheme {} for the http transport",
                dsn.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connection_timeout)
            .user_agent(raven_common::user_agent())
            .build()?;

        Ok(Self {
            store_url: dsn.store_url(),
            client,
            dsn,
        })
    }

    /// Returns the URL events are posted to.
    pub fn store_url(&self) -> &str {
        &self.store_url
    }
}

impl Transport for HttpTransport {
    fn send_data(&self, payload: Payload) -> Result<(), TransportError> {
        let auth = Auth::from_dsn(&self.dsn, raven_common::user_agent(), UnixTimestamp::now());

        let response = self
            .client
            .post(&self.store_url)
            .header(AUTH_HEADER, auth.to_string())
            .header(header::CONTENT_TYPE, payload.content_type)
            .body(payload.data)
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut message = format!("the server responded with status {}", status.as_u16());
        let error_header = response
            .headers()
            .get(ERROR_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Some(error) = error_header {
            message.push_str(", error: ");
            message.push_str(error);
        }

        Err(TransportError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use raven_config::Encoding;
    use serde_json::json;

    use super::*;
    use crate::encode;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn transport(server: &MockServer, path: &str) -> HttpTransport {
        let dsn = format!("http://public:secret@{}{path}/42", server.address())
            .parse()
            .unwrap();
        HttpTransport::new(dsn, TIMEOUT, TIMEOUT).unwrap()
    }

    #[test]
    fn test_posts_to_store_endpoint() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/api/42/store/")
                .header("content-type", "application/json")
                .header_exists("x-sentry-auth")
                .body(r#"{"message":"hi"}"#);
            then.status(200);
        });

        let payload = encode(&json!({"message": "hi"}), Encoding::Json).unwrap();
        transport(&server, "").send_data(payload).unwrap();
        mock.assert();
    }

    #[test]
    fn test_path_prefix() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/prefix/sentry/api/42/store/");
            then.status(200);
        });

        let transport = transport(&server, "/prefix/sentry");
        assert!(transport.store_url().ends_with("/prefix/sentry/api/42/store/"));

        let payload = encode(&json!({}), Encoding::Json).unwrap();
        transport.send_data(payload).unwrap();
        mock.assert();
    }

    #[test]
    fn test_gzip_content_type() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/api/42/store/")
                .header("content-type", "application/octet-stream");
            then.status(200);
        });

        let payload = encode(&json!({"message": "hi"}), Encoding::Gzip).unwrap();
        transport(&server, "").send_data(payload).unwrap();
        mock.assert();
    }

    #[test]
    fn test_error_status_with_sentry_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/api/42/store/");
            then.status(403).header("x-sentry-error", "Creation of this event was denied");
        });

        let payload = encode(&json!({}), Encoding::Json).unwrap();
        let error = transport(&server, "").send_data(payload).unwrap_err();

        match error {
            TransportError::Http { status, ref message } => {
                assert_eq!(status, 403);
                assert_eq!(
                    message,
                    "the server responded with status 403, error: Creation of this event was denied"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_server_error_is_network_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST");
            then.status(500);
        });

        let payload = encode(&json!({}), Encoding::Json).unwrap();
        let error = transport(&server, "").send_data(payload).unwrap_err();
        assert!(error.is_network_error());
        assert_eq!(error.to_string(), "the server responded with status 500");
    }

    #[test]
    fn test_rejects_udp_dsn() {
        let dsn = "udp://public@localhost:9001/42".parse().unwrap();
        let error = HttpTransport::new(dsn, TIMEOUT, TIMEOUT).unwrap_err();
        assert!(matches!(error, TransportError::Config(_)));
    }
}
