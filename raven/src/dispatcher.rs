use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use raven_config::{Config, Encoding};
use raven_log::LogError;
use raven_protocol::log_message;
use raven_transport::{BackoffSchedule, Transport, TransportError, TransportState, encode};
use serde_json::Value;

/// Hands an event document to another execution context for delivery.
///
/// Returning an error or panicking makes the dispatcher deliver the event synchronously instead.
pub type AsyncCallback =
    Arc<dyn Fn(Value) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Notified with the document of every event that could not be delivered.
pub type FailureCallback = Arc<dyn Fn(&Value, &TransportError) + Send + Sync>;

/// Delivers event documents through a transport, guarded by a backoff gate.
pub struct Dispatcher {
    transport: Box<dyn Transport>,
    state: TransportState,
    encoding: Encoding,
    async_callback: Option<AsyncCallback>,
    failure_callback: Option<FailureCallback>,
}

impl Dispatcher {
    /// Creates a dispatcher for the given transport using the encoding and backoff from `config`.
    pub fn new(transport: Box<dyn Transport>, config: &Config) -> Self {
        let schedule =
            BackoffSchedule::new(config.initial_retry_interval(), config.max_retry_interval());

        Self {
            transport,
            state: TransportState::new(schedule),
            encoding: config.transport.encoding,
            async_callback: None,
            failure_callback: None,
        }
    }

    /// Hands documents to the callback instead of sending them synchronously.
    pub fn with_async_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Value) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync + 'static,
    {
        self.async_callback = Some(Arc::new(callback));
        self
    }

    /// Reports documents that could not be delivered to the callback.
    pub fn with_failure_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value, &TransportError) + Send + Sync + 'static,
    {
        self.failure_callback = Some(Arc::new(callback));
        self
    }

    /// Returns the backoff state of the transport.
    pub fn state(&self) -> &TransportState {
        &self.state
    }

    /// Dispatches a document.
    ///
    /// Nothing is attempted while the transport backs off after failures. With an async callback,
    /// the callback receives a copy of the document. If it fails, the document is sent
    /// synchronously. Failures are logged and reported to the failure callback, and the event is
    /// dropped.
    pub fn dispatch(&self, document: Value) -> Result<(), TransportError> {
        if !self.state.should_try() {
            let error = TransportError::BackedOff;
            raven_log::warn!("{error}");
            self.failed(&document, &error);
            return Err(error);
        }

        let payload = match encode(&document, self.encoding) {
            Ok(payload) => payload,
            Err(error) => {
                raven_log::warn!("could not encode event: {}", LogError(&error));
                self.failed(&document, &error);
                return Err(error);
            }
        };

        if let Some(ref callback) = self.async_callback {
            let handoff = document.clone();
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(handoff)));

            let error = match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(error)) => TransportError::Async(error.to_string()),
                Err(panic) => TransportError::Async(panic_message(panic.as_ref())),
            };

            raven_log::error!("async event sending failed: {error}");
        }

        let event_id = document
            .get("event_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        raven_log::info!("sending event {event_id} to sentry");

        match self.transport.send_data(payload) {
            Ok(()) => {
                self.state.success();
                Ok(())
            }
            Err(error) => {
                self.state.failure();
                raven_log::warn!(
                    "unable to record event with remote sentry server: {}",
                    LogError(&error)
                );
                self.failed(&document, &error);
                Err(error)
            }
        }
    }

    fn failed(&self, document: &Value, error: &TransportError) {
        raven_log::warn!("failed to submit event: {}", log_message(document));

        if let Some(ref callback) = self.failure_callback {
            catch_hook("failure_callback", || callback(document, error));
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state)
            .field("encoding", &self.encoding)
            .field("async", &self.async_callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Runs a user hook, logging and swallowing a panic. Returns `None` if the hook panicked.
pub(crate) fn catch_hook<R>(name: &str, hook: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => Some(result),
        Err(panic) => {
            raven_log::error!("{name} panicked: {}", panic_message(panic.as_ref()));
            None
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use raven_transport::{DummyTransport, decode};
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn document() -> Value {
        json!({
            "event_id": "0123456789abcdef0123456789abcdef",
            "message": "hello",
        })
    }

    fn dispatcher(transport: &Arc<DummyTransport>) -> Dispatcher {
        Dispatcher::new(Box::new(transport.clone()), &Config::default())
    }

    #[test]
    fn test_sync_send() {
        raven_log::init_test!();

        let transport = Arc::new(DummyTransport::new());
        dispatcher(&transport).dispatch(document()).unwrap();

        let payloads = transport.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(decode(&payloads[0].data, Encoding::Json).unwrap(), document());
    }

    #[test]
    fn test_gzip_encoding() {
        let transport = Arc::new(DummyTransport::new());
        let mut config = Config::default();
        config.transport.encoding = Encoding::Gzip;

        Dispatcher::new(Box::new(transport.clone()), &config)
            .dispatch(document())
            .unwrap();

        let payloads = transport.payloads();
        let payload = &payloads[0];
        assert_eq!(payload.content_type, "application/octet-stream");
        assert_eq!(decode(&payload.data, Encoding::Gzip).unwrap(), document());
    }

    #[test]
    fn test_async_handoff() {
        let transport = Arc::new(DummyTransport::new());
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        let dispatcher = dispatcher(&transport).with_async_callback(move |document| {
            sink.lock().push(document);
            Ok(())
        });

        dispatcher.dispatch(document()).unwrap();

        assert!(transport.is_empty());
        assert_eq!(*received.lock(), [document()]);
    }

    #[test]
    fn test_async_error_falls_back() {
        raven_log::init_test!();

        let transport = Arc::new(DummyTransport::new());
        let dispatcher = dispatcher(&transport)
            .with_async_callback(|_| Err("queue is full".into()));

        dispatcher.dispatch(document()).unwrap();
        assert_eq!(transport.len(), 1);
    }

    #[test]
    fn test_async_panic_falls_back() {
        let transport = Arc::new(DummyTransport::new());
        let dispatcher =
            dispatcher(&transport).with_async_callback(|_| panic!("worker gone"));

        dispatcher.dispatch(document()).unwrap();
        assert_eq!(transport.len(), 1);
    }

    #[test]
    fn test_failure_callback_and_backoff() {
        raven_log::init_test!();

        let transport = Arc::new(DummyTransport::failing("connection refused"));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let sink = failures.clone();
        let dispatcher = dispatcher(&transport).with_failure_callback(move |document, error| {
            sink.lock().push((document["message"].clone(), error.to_string()));
        });

        let error = dispatcher.dispatch(document()).unwrap_err();
        assert!(error.is_network_error());
        assert_eq!(dispatcher.state().failures(), 1);

        // The transport backs off for one second, so the second event is not attempted.
        let error = dispatcher.dispatch(document()).unwrap_err();
        assert!(matches!(error, TransportError::BackedOff));
        assert_eq!(transport.len(), 1);
        assert_eq!(dispatcher.state().failures(), 1);

        let failures = failures.lock();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].0, json!("hello"));
        assert_eq!(failures[1].1, "not sending event due to previous failure(s)");
    }

    #[test]
    fn test_failure_callback_panic_is_contained() {
        raven_log::init_test!();

        let transport = Arc::new(DummyTransport::failing("connection refused"));
        let dispatcher = dispatcher(&transport)
            .with_failure_callback(|_, _| panic!("failure callback bug"));

        let error = dispatcher.dispatch(document()).unwrap_err();
        assert!(error.is_network_error());
        assert_eq!(dispatcher.state().failures(), 1);
    }

    #[test]
    fn test_catch_hook() {
        assert_eq!(catch_hook("hook", || 42), Some(42));
        assert_eq!(catch_hook("hook", || -> u32 { panic!("boom") }), None);
    }

    #[test]
    fn test_backoff_checked_before_async() {
        let transport = Arc::new(DummyTransport::failing("connection refused"));
        let handed_off = Arc::new(Mutex::new(0));

        let counter = handed_off.clone();
        let dispatcher = dispatcher(&transport).with_async_callback(move |_| {
            *counter.lock() += 1;
            Err("unavailable".into())
        });

        dispatcher.dispatch(document()).unwrap_err();
        dispatcher.dispatch(document()).unwrap_err();

        assert_eq!(*handed_off.lock(), 1);
        assert!(dispatcher.state().retry_after().is_some());
        assert_eq!(dispatcher.state().failures(), 1);
    }
}
