use std::error::Error;
use std::sync::Arc;

use parking_lot::Mutex;
use raven_config::Config;
use raven_log::LogError;
use raven_pii::{
    Processor, RemoveCookiesProcessor, RemovePostDataProcessor, SanitizeConfigError,
    SanitizeProcessor, process_all,
};
use raven_protocol::{Event, EventId, Transaction, TransactionEvent};
use raven_transport::{Transport, TransportError, TransportState};
use serde_json::Value;

use crate::dispatcher::{AsyncCallback, Dispatcher, FailureCallback, catch_hook};
use crate::event::{EventBuilder, MessageOptions};
use crate::exception::RawException;
use crate::linecache::LineCache;
use crate::scope::Scope;

/// May modify an event document before it is sent, or drop it by returning `None`.
pub type BeforeSend = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// Decides whether an exception or message is captured at all.
pub type ShouldCapture = Arc<dyn Fn(CaptureInput<'_>) -> bool + Send + Sync>;

/// The raw input of a capture, as passed to a [`ShouldCapture`] hook.
#[derive(Clone, Copy, Debug)]
pub enum CaptureInput<'a> {
    /// An exception is being captured.
    Exception(&'a RawException),
    /// A message is being captured.
    Message(&'a str),
}

/// An error returned when building a [`Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The scrubbing configuration is invalid.
    #[error("invalid sanitize configuration")]
    Sanitize(#[from] SanitizeConfigError),
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: Config,
    transport: Option<Box<dyn Transport>>,
    linecache: Option<Arc<dyn LineCache>>,
    async_callback: Option<AsyncCallback>,
    failure_callback: Option<FailureCallback>,
    before_send: Option<BeforeSend>,
    should_capture: Option<ShouldCapture>,
}

impl ClientBuilder {
    /// Creates a builder for the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            linecache: None,
            async_callback: None,
            failure_callback: None,
            before_send: None,
            should_capture: None,
        }
    }

    /// Sends events through the given transport instead of the configured one.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Attaches source context to stack frames through the given line cache.
    pub fn linecache<L: LineCache + 'static>(mut self, linecache: L) -> Self {
        self.linecache = Some(Arc::new(linecache));
        self
    }

    /// Hands event documents to the callback for delivery in another execution context.
    ///
    /// If the callback returns an error or panics, the event is sent synchronously.
    pub fn async_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Value) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync + 'static,
    {
        self.async_callback = Some(Arc::new(callback));
        self
    }

    /// Reports every event that could not be delivered to the callback.
    ///
    /// A panic in the callback is logged and does not reach the caller.
    pub fn failure_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value, &TransportError) + Send + Sync + 'static,
    {
        self.failure_callback = Some(Arc::new(callback));
        self
    }

    /// Runs the hook on each event document before it is scrubbed and sent.
    ///
    /// If the hook panics, the event is dropped.
    pub fn before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(hook));
        self
    }

    /// Runs the hook before an exception or message is turned into an event.
    ///
    /// If the hook panics, nothing is captured.
    pub fn should_capture<F>(mut self, hook: F) -> Self
    where
        F: Fn(CaptureInput<'_>) -> bool + Send + Sync + 'static,
    {
        self.should_capture = Some(Arc::new(hook));
        self
    }

    /// Builds the client.
    ///
    /// The transport is created from the configuration unless one was supplied. An unusable
    /// transport configuration does not fail here. Every send then fails and is reported.
    pub fn build(self) -> Result<Client, ClientError> {
        let config = Arc::new(self.config);

        let mut processors: Vec<Box<dyn Processor>> =
            vec![Box::new(SanitizeProcessor::new(&config.sanitize)?)];
        if config.sanitize.remove_cookies {
            processors.push(Box::new(RemoveCookiesProcessor));
        }
        if config.sanitize.remove_post_data {
            processors.push(Box::new(RemovePostDataProcessor));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => raven_transport::from_config(&config),
        };

        let mut dispatcher = Dispatcher::new(transport, &config);
        if let Some(callback) = self.async_callback {
            dispatcher = dispatcher.with_async_callback(move |document| callback(document));
        }
        if let Some(callback) = self.failure_callback {
            dispatcher =
                dispatcher.with_failure_callback(move |document, error| callback(document, error));
        }

        let mut builder = EventBuilder::new(config.clone());
        if let Some(linecache) = self.linecache {
            builder = builder.with_linecache(linecache);
        }

        Ok(Client {
            config,
            builder,
            processors,
            dispatcher,
            before_send: self.before_send,
            should_capture: self.should_capture,
            last_event_id: Mutex::new(None),
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Captures exceptions, messages and transactions and delivers them to the collector.
///
/// A client is shared by all threads of the application. Contextual data is passed explicitly
/// through a [`Scope`] with every capture. Capturing never fails: events that cannot be delivered
/// are logged, reported to the failure callback, and dropped.
pub struct Client {
    config: Arc<Config>,
    builder: EventBuilder,
    processors: Vec<Box<dyn Processor>>,
    dispatcher: Dispatcher,
    before_send: Option<BeforeSend>,
    should_capture: Option<ShouldCapture>,
    last_event_id: Mutex<Option<EventId>>,
}

impl Client {
    /// Creates a client from the configuration with the configured transport.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        ClientBuilder::new(config).build()
    }

    /// Returns a builder for a client with callbacks or a custom transport.
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the builder used to assemble events.
    pub fn event_builder(&self) -> &EventBuilder {
        &self.builder
    }

    /// Returns the backoff state of the transport.
    pub fn transport_state(&self) -> &TransportState {
        self.dispatcher.state()
    }

    /// Creates an empty scope with the configured breadcrumb capacity.
    pub fn new_scope(&self) -> Scope {
        Scope::new(self.config.breadcrumbs_capacity)
    }

    /// Returns the id of the most recent event handed to the transport.
    pub fn last_event_id(&self) -> Option<EventId> {
        *self.last_event_id.lock()
    }

    /// Captures an exception and its causes.
    pub fn capture_exception(&self, exception: &RawException, scope: &Scope) -> Option<Event> {
        if !self.capture_allowed(CaptureInput::Exception(exception)) {
            return None;
        }

        let event = self.builder.event_from_exception(exception, scope);
        self.capture_event(event)
    }

    /// Captures an error and its [`source`](Error::source) chain.
    pub fn capture_error<E: Error + ?Sized>(&self, error: &E, scope: &Scope) -> Option<Event> {
        self.capture_exception(&RawException::from_error(error), scope)
    }

    /// Captures a message.
    pub fn capture_message(&self, message: &str, scope: &Scope) -> Option<Event> {
        self.capture_message_with(message, MessageOptions::default(), scope)
    }

    /// Captures a message with parameters, level or an explicit backtrace.
    pub fn capture_message_with(
        &self,
        message: &str,
        options: MessageOptions,
        scope: &Scope,
    ) -> Option<Event> {
        if !self.capture_allowed(CaptureInput::Message(message)) {
            return None;
        }

        let event = self.builder.event_from_message(message, options, scope);
        self.capture_event(event)
    }

    /// Captures a finished transaction.
    pub fn capture_transaction(
        &self,
        transaction: Transaction,
        scope: &Scope,
    ) -> Option<TransactionEvent> {
        if !self.sending_allowed() {
            return None;
        }

        let event = self.builder.event_from_transaction(transaction, scope);
        let document = match event.to_document() {
            Ok(document) => document,
            Err(error) => {
                raven_log::warn!("could not serialize transaction: {}", LogError(&error));
                return None;
            }
        };

        self.send(event.event.id, document).then_some(event)
    }

    /// Sends an event that was already assembled, for example with [`event_builder`].
    ///
    /// Returns the event if it was handed to the transport, even if delivery failed. Returns
    /// `None` if sending is disabled for the current environment or the event was dropped by the
    /// `before_send` hook.
    ///
    /// [`event_builder`]: Self::event_builder
    pub fn capture_event(&self, event: Event) -> Option<Event> {
        if !self.sending_allowed() {
            return None;
        }

        let document = match event.to_document() {
            Ok(document) => document,
            Err(error) => {
                raven_log::warn!("could not serialize event: {}", LogError(&error));
                return None;
            }
        };

        self.send(event.id, document).then_some(event)
    }

    fn capture_allowed(&self, input: CaptureInput<'_>) -> bool {
        if !self.sending_allowed() {
            return false;
        }

        let Some(ref should_capture) = self.should_capture else {
            return true;
        };

        // A panicking hook vetoes the capture.
        if catch_hook("should_capture", || should_capture(input)) == Some(true) {
            return true;
        }

        raven_log::debug!("event not sent: rejected by should_capture");
        false
    }

    fn sending_allowed(&self) -> bool {
        let environment = self.builder.environment();
        if self.config.environment_enabled(environment) {
            return true;
        }

        raven_log::debug!("event not sent: environment {environment} is not enabled");
        false
    }

    /// Runs hooks and processors on the document and dispatches it.
    fn send(&self, id: EventId, mut document: Value) -> bool {
        if let Some(ref before_send) = self.before_send {
            // A panicking hook drops the event.
            document = match catch_hook("before_send", || before_send(document)).flatten() {
                Some(document) => document,
                None => {
                    raven_log::debug!("event not sent: dropped by before_send");
                    return false;
                }
            };
        }

        process_all(&self.processors, &mut document);

        *self.last_event_id.lock() = Some(id);
        // Failures are logged and reported to the failure callback by the dispatcher.
        self.dispatcher.dispatch(document).ok();
        true
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
