use std::collections::BTreeMap;
use std::sync::LazyLock;

use raven_protocol::{
    Breadcrumb, BreadcrumbBuffer, DEFAULT_BREADCRUMBS_CAPACITY, Event, Level, Object, RequestEnv,
};
use serde_json::Value;
use sysinfo::System;

/// Name of the runtime reported in the `runtime` context.
const RUNTIME_NAME: &str = "rustc";

/// The `server` context attached to every new scope.
static SERVER_CONTEXT: LazyLock<Value> = LazyLock::new(|| {
    let mut server = Object::new();
    server.insert("os".to_owned(), os_context());
    server.insert("runtime".to_owned(), runtime_context());
    Value::Object(server)
});

fn os_context() -> Value {
    let mut os = Object::new();
    let fields = [
        ("name", System::name()),
        ("version", System::os_version()),
        ("build", System::long_os_version()),
        ("kernel_version", System::kernel_version()),
    ];

    for (key, value) in fields {
        os.insert(key.to_owned(), value.map_or(Value::Null, Value::String));
    }

    Value::Object(os)
}

fn runtime_context() -> Value {
    let version = match env!("RAVEN_RUSTC_VERSION") {
        "" => RUNTIME_NAME,
        version => version,
    };

    let mut runtime = Object::new();
    runtime.insert("name".to_owned(), RUNTIME_NAME.into());
    runtime.insert("version".to_owned(), version.into());
    Value::Object(runtime)
}

/// Contextual data merged into every event captured with it.
///
/// A scope belongs to one execution context, such as a request or a job. [`Clone`] creates an
/// independent deep copy, so changes to a nested scope never leak into its parent.
#[derive(Clone, Debug, PartialEq)]
pub struct Scope {
    tags: BTreeMap<String, String>,
    user: Object,
    extra: Object,
    contexts: Object,
    fingerprint: Vec<String>,
    breadcrumbs: BreadcrumbBuffer,
    transactions: Vec<String>,
    level: Option<Level>,
    request_env: Option<RequestEnv>,
    request_body: Option<String>,
}

impl Scope {
    /// Creates a scope retaining up to `breadcrumbs_capacity` breadcrumbs.
    ///
    /// The scope starts out with the `server` context describing the operating system and the
    /// runtime.
    pub fn new(breadcrumbs_capacity: usize) -> Self {
        let mut contexts = Object::new();
        contexts.insert("server".to_owned(), SERVER_CONTEXT.clone());

        Self {
            tags: BTreeMap::new(),
            user: Object::new(),
            extra: Object::new(),
            contexts,
            fingerprint: Vec::new(),
            breadcrumbs: BreadcrumbBuffer::new(breadcrumbs_capacity),
            transactions: Vec::new(),
            level: None,
            request_env: None,
            request_body: None,
        }
    }

    /// Replaces the user. An empty object unsets it.
    pub fn set_user(&mut self, user: Object) {
        self.user = user;
    }

    /// Replaces all extra data.
    pub fn set_extras(&mut self, extra: Object) {
        self.extra = extra;
    }

    /// Sets a single extra value.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Replaces all contexts, including the default `server` context.
    pub fn set_contexts(&mut self, contexts: Object) {
        self.contexts = contexts;
    }

    /// Sets a single context.
    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.contexts.insert(key.into(), value.into());
    }

    /// Replaces all tags.
    pub fn set_tags(&mut self, tags: BTreeMap<String, String>) {
        self.tags = tags;
    }

    /// Sets a single tag.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Sets the level of events captured with this scope.
    pub fn set_level(&mut self, level: Level) {
        self.level = Some(level);
    }

    /// Pushes a transaction name. The most recent name is applied to events.
    pub fn set_transaction(&mut self, name: impl Into<String>) {
        self.transactions.push(name.into());
    }

    /// Removes the most recent transaction name.
    pub fn pop_transaction(&mut self) -> Option<String> {
        self.transactions.pop()
    }

    /// Replaces the fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: Vec<String>) {
        self.fingerprint = fingerprint;
    }

    /// Sets the environment of the request being handled.
    pub fn set_request_env(&mut self, env: RequestEnv) {
        self.request_env = Some(env);
    }

    /// Sets the raw body of the request being handled.
    pub fn set_request_body(&mut self, body: impl Into<String>) {
        self.request_body = Some(body.into());
    }

    /// Records a breadcrumb, dropping the oldest one if the buffer is full.
    pub fn record_breadcrumb(&mut self, breadcrumb: Breadcrumb) {
        self.breadcrumbs.record(breadcrumb);
    }

    /// Records a breadcrumb with the given message and category.
    pub fn add_breadcrumb(&mut self, message: impl Into<String>, category: Option<&str>) {
        self.record_breadcrumb(Breadcrumb {
            message: Some(message.into()),
            category: category.map(str::to_owned),
            ..Breadcrumb::default()
        });
    }

    /// Removes all breadcrumbs.
    pub fn clear_breadcrumbs(&mut self) {
        self.breadcrumbs.clear();
    }

    /// Returns the tags.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Returns the user.
    pub fn user(&self) -> &Object {
        &self.user
    }

    /// Returns the extra data.
    pub fn extra(&self) -> &Object {
        &self.extra
    }

    /// Returns the contexts.
    pub fn contexts(&self) -> &Object {
        &self.contexts
    }

    /// Returns the fingerprint.
    pub fn fingerprint(&self) -> &[String] {
        &self.fingerprint
    }

    /// Returns the breadcrumbs.
    pub fn breadcrumbs(&self) -> &BreadcrumbBuffer {
        &self.breadcrumbs
    }

    /// Returns the most recent transaction name.
    pub fn transaction(&self) -> Option<&str> {
        self.transactions.last().map(String::as_str)
    }

    /// Returns the level.
    pub fn level(&self) -> Option<Level> {
        self.level
    }

    /// Returns the request environment.
    pub fn request_env(&self) -> Option<&RequestEnv> {
        self.request_env.as_ref()
    }

    /// Returns the raw request body.
    pub fn request_body(&self) -> Option<&str> {
        self.request_body.as_deref()
    }

    /// Merges this scope into an event.
    ///
    /// Values already set on the event are kept. Maps are merged per key, so the scope only fills
    /// keys the event does not have. A key the event set to `null` stays `null`.
    pub fn apply_to(&self, event: &mut Event) {
        for (key, value) in &self.tags {
            event.tags.entry(key.clone()).or_insert_with(|| value.clone());
        }

        merge_object(&mut event.user, &self.user);
        merge_object(&mut event.extra, &self.extra);
        merge_object(&mut event.contexts, &self.contexts);

        if event.fingerprint.is_empty() {
            event.fingerprint = self.fingerprint.clone();
        }

        if event.transaction.is_none() {
            event.transaction = self.transaction().map(str::to_owned);
        }

        if event.level.is_none() {
            event.level = self.level;
        }

        if event.breadcrumbs.is_none() {
            event.breadcrumbs = Some(self.breadcrumbs.clone());
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(DEFAULT_BREADCRUMBS_CAPACITY)
    }
}

fn merge_object(target: &mut Object, source: &Object) {
    for (key, value) in source {
        target.entry(key.as_str()).or_insert_with(|| value.clone());
    }
}
