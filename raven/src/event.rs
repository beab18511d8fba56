use std::sync::Arc;

use raven_config::Config;
use raven_protocol::{
    Event, InterfaceKind, Level, LogEntry, Request, RequestOptions, Transaction, TransactionEvent,
    real_ip,
};
use serde_json::Value;

use crate::backtrace::BacktraceParser;
use crate::exception::RawException;
use crate::linecache::LineCache;
use crate::scope::Scope;

/// Optional inputs of a message event.
#[derive(Clone, Debug, Default)]
pub struct MessageOptions {
    /// Positional parameters of the message template.
    pub params: Vec<Value>,
    /// An explicit backtrace, innermost frame first. Messages carry no stack trace otherwise.
    pub backtrace: Option<Vec<String>>,
    /// The level of the event.
    pub level: Option<Level>,
}

/// Assembles events from raw input, configuration defaults and a [`Scope`].
#[derive(Clone, Debug)]
pub struct EventBuilder {
    config: Arc<Config>,
    parser: BacktraceParser,
    request_options: RequestOptions,
    environment: String,
    server_name: Option<String>,
}

impl EventBuilder {
    /// Creates a builder for the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        let request_options = RequestOptions {
            send_default_pii: config.send_default_pii,
            env_whitelist: config.request_env_whitelist.clone(),
        };

        Self {
            parser: BacktraceParser::new(&config.stacktrace),
            request_options,
            environment: config.current_environment(),
            server_name: config.server_name(),
            config,
        }
    }

    /// Attaches source context to frames through the given line cache.
    pub fn with_linecache(mut self, linecache: Arc<dyn LineCache>) -> Self {
        self.parser = self.parser.with_linecache(linecache);
        self
    }

    /// Returns the backtrace parser.
    pub fn parser(&self) -> &BacktraceParser {
        &self.parser
    }

    /// Returns the environment events are tagged with.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Creates an empty event carrying the configured defaults.
    ///
    /// This sets the environment, release, server name, modules and the configured tags.
    pub fn new_event(&self) -> Event {
        let mut event = Event::new();
        event.environment = Some(self.environment.clone());
        event.release = self.config.release.clone();
        event.server_name = self.server_name.clone();
        event.tags = self.config.tags.clone();

        if self.config.send_modules {
            event.modules = self.config.modules.clone();
        }

        event
    }

    /// Builds an event from an exception and its causes.
    pub fn event_from_exception(&self, exception: &RawException, scope: &Scope) -> Event {
        let mut event = self.new_event();
        event.set_interface(exception.to_values(&self.parser));
        self.apply_scope(&mut event, scope);
        event
    }

    /// Builds an event from a log message.
    pub fn event_from_message(
        &self,
        message: &str,
        options: MessageOptions,
        scope: &Scope,
    ) -> Event {
        let MessageOptions {
            params,
            backtrace,
            level,
        } = options;

        let mut event = self.new_event();
        event.set_message(message);
        event.level = level;
        event.set_interface(LogEntry::new(message, params));

        if let Some(backtrace) = backtrace {
            event.set_interface(self.parser.stacktrace(&backtrace));
        }

        self.apply_scope(&mut event, scope);
        event
    }

    /// Builds a transaction event from a transaction. An unfinished root span is finished now.
    pub fn event_from_transaction(
        &self,
        transaction: Transaction,
        scope: &Scope,
    ) -> TransactionEvent {
        let mut transaction_event = TransactionEvent::from_transaction(transaction);

        let mut event = self.new_event();
        event.id = transaction_event.event.id;
        event.timestamp = transaction_event.event.timestamp;
        event.transaction = transaction_event.event.transaction.take();
        event.contexts = std::mem::take(&mut transaction_event.event.contexts);

        self.apply_scope(&mut event, scope);
        transaction_event.event = event;
        transaction_event
    }

    /// Merges the scope into the event.
    ///
    /// If the scope holds a request environment and the event has no request yet, a request
    /// interface is derived from it. With default PII enabled, the user's IP address is derived
    /// from the request as well.
    pub fn apply_scope(&self, event: &mut Event, scope: &Scope) {
        if event.interface(InterfaceKind::Request).is_none()
            && let Some(env) = scope.request_env().filter(|env| !env.is_empty())
        {
            let request = Request::from_env(env, scope.request_body(), &self.request_options);
            event.set_interface(request);

            if self.request_options.send_default_pii
                && let Some(ip) = real_ip(env)
            {
                event
                    .user
                    .entry("ip_address")
                    .or_insert_with(|| Value::String(ip));
            }
        }

        scope.apply_to(event);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use raven_protocol::{Interface, RequestEnv};
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn builder(config: Config) -> EventBuilder {
        EventBuilder::new(Arc::new(config))
    }

    fn config() -> Config {
        Config {
            environment: Some("production".to_owned()),
            release: Some("v1.0.0".to_owned()),
            server_name: Some("web-1".to_owned()),
            tags: BTreeMap::from([
                ("region".to_owned(), "eu".to_owned()),
                ("foo".to_owned(), "config".to_owned()),
            ]),
            modules: BTreeMap::from([("serde".to_owned(), "1.0.0".to_owned())]),
            ..Config::default()
        }
    }

    #[test]
    fn test_zero_division() {
        let exception = RawException::new("ZeroDivisionError", "divided by 0")
            .with_backtrace(["src/math.rs:7:in `divide'", "src/main.rs:3:in `main'"]);

        let event = builder(config()).event_from_exception(&exception, &Scope::default());

        let exceptions = event.exceptions();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].ty, "ZeroDivisionError");
        assert_eq!(exceptions[0].value, "divided by 0");
        assert_eq!(event.log_message(), "ZeroDivisionError: divided by 0");

        let frames = &exceptions[0].stacktrace.as_ref().unwrap().frames;
        assert_eq!(frames[0].function.as_deref(), Some("main"));
        assert_eq!(frames[1].function.as_deref(), Some("divide"));
    }

    #[test]
    fn test_config_defaults() {
        let event = builder(config()).new_event();

        assert_eq!(event.environment.as_deref(), Some("production"));
        assert_eq!(event.release.as_deref(), Some("v1.0.0"));
        assert_eq!(event.server_name.as_deref(), Some("web-1"));
        assert_eq!(event.tags["region"], "eu");
        assert_eq!(event.modules["serde"], "1.0.0");
    }

    #[test]
    fn test_modules_disabled() {
        let config = Config {
            send_modules: false,
            ..config()
        };
        assert!(builder(config).new_event().modules.is_empty());
    }

    #[test]
    fn test_config_tags_win_over_scope() {
        let mut scope = Scope::default();
        scope.set_tag("foo", "scope");
        scope.set_tag("bar", "scope");

        let event = builder(config()).event_from_message("hello", Default::default(), &scope);

        assert_eq!(event.tags["foo"], "config");
        assert_eq!(event.tags["bar"], "scope");
        assert_eq!(event.tags["region"], "eu");
    }

    #[test]
    fn test_message() {
        let options = MessageOptions {
            params: vec![json!("db.local")],
            level: Some(Level::Warning),
            ..Default::default()
        };
        let event = builder(config()).event_from_message(
            "could not connect to %s",
            options,
            &Scope::default(),
        );

        assert_eq!(event.message, "could not connect to %s");
        assert_eq!(event.level, Some(Level::Warning));
        assert_eq!(
            event.interface(InterfaceKind::Message),
            Some(&Interface::Message(LogEntry::new(
                "could not connect to %s",
                vec![json!("db.local")],
            )))
        );
        assert!(event.interface(InterfaceKind::Stacktrace).is_none());
    }

    #[test]
    fn test_message_with_backtrace() {
        let options = MessageOptions {
            backtrace: Some(vec!["src/main.rs:3:in `main'".to_owned(), "garbage".to_owned()]),
            ..Default::default()
        };
        let event = builder(config()).event_from_message("hello", options, &Scope::default());

        match event.interface(InterfaceKind::Stacktrace) {
            Some(Interface::Stacktrace(stacktrace)) => assert_eq!(stacktrace.frames.len(), 1),
            other => panic!("unexpected interface: {other:?}"),
        }
    }

    #[test]
    fn test_scope_level_applies() {
        let mut scope = Scope::default();
        scope.set_level(Level::Info);

        let event = builder(config()).event_from_message("hello", Default::default(), &scope);
        assert_eq!(event.level, Some(Level::Info));
    }

    fn request_env() -> RequestEnv {
        [
            ("REQUEST_METHOD", "GET"),
            ("SERVER_NAME", "localhost"),
            ("SERVER_PORT", "80"),
            ("PATH_INFO", "/dashboard"),
            ("REMOTE_ADDR", "10.0.0.1"),
            ("HTTP_X_FORWARDED_FOR", "1.1.1.1, 10.0.0.2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
    }

    #[test]
    fn test_request_from_scope() {
        let mut scope = Scope::default();
        scope.set_request_env(request_env());

        let event = builder(config()).event_from_message("hello", Default::default(), &scope);

        match event.interface(InterfaceKind::Request) {
            Some(Interface::Request(request)) => {
                assert_eq!(request.url.as_deref(), Some("http://localhost/dashboard"));
                assert_eq!(request.method.as_deref(), Some("GET"));
            }
            other => panic!("unexpected interface: {other:?}"),
        }
        assert!(!event.user.contains_key("ip_address"));
    }

    #[test]
    fn test_request_ip_with_pii() {
        let config = Config {
            send_default_pii: true,
            ..config()
        };
        let mut scope = Scope::default();
        scope.set_request_env(request_env());

        let event = builder(config).event_from_message("hello", Default::default(), &scope);
        assert_eq!(event.user["ip_address"], "1.1.1.1");
    }

    #[test]
    fn test_transaction() {
        let mut transaction = Transaction::new("GET /dashboard", "http.server");
        let span = transaction.start_child("db.query");
        transaction.finish_child(span);
        transaction.finish();

        let mut scope = Scope::default();
        scope.set_tag("foo", "scope");
        scope.set_transaction("ignored");

        let event = builder(config()).event_from_transaction(transaction, &scope);

        assert_eq!(event.event.transaction.as_deref(), Some("GET /dashboard"));
        assert_eq!(event.event.environment.as_deref(), Some("production"));
        assert_eq!(event.event.tags["foo"], "config");
        assert!(event.event.contexts["trace"].is_object());
        assert!(event.event.contexts["server"].is_object());
        assert_eq!(event.spans.len(), 1);
    }
}
