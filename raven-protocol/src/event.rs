use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use raven_common::time::format_timestamp;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{BreadcrumbBuffer, Exception, Interface, InterfaceKind, Object, truncate_message};

/// The default platform tag of events sent by this client.
pub const DEFAULT_PLATFORM: &str = "native";

/// The default logger name of events sent by this client.
pub const DEFAULT_LOGGER: &str = "rust";

/// Derived log message for events that have neither a message nor an exception.
pub const NO_MESSAGE_VALUE: &str = "<no message value>";

/// Wrapper around a UUID with slightly different formatting.
///
/// Event identifiers are rendered as 32 lowercase hex characters without dashes.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new, random event identifier.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Tests if the UUID is nil.
    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0.as_simple())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(uuid_str: &str) -> Result<Self, Self::Err> {
        uuid_str.parse().map(EventId)
    }
}

raven_common::impl_str_serde!(EventId, "an event identifier");

/// An error used when parsing [`Level`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid level")]
pub struct ParseLevelError;

/// Severity level of an event or breadcrumb.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    /// Indicates very spammy debug information.
    Debug,
    /// Informational messages.
    Info,
    /// A warning.
    Warning,
    /// An error.
    #[default]
    Error,
    /// Similar to error but indicates a critical event that usually causes a shutdown.
    Fatal,
}

impl Level {
    /// Returns the wire name of this level.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Ok(match string {
            "debug" => Level::Debug,
            "info" | "log" => Level::Info,
            "warning" | "warn" => Level::Warning,
            "error" => Level::Error,
            "fatal" | "critical" => Level::Fatal,
            _ => return Err(ParseLevelError),
        })
    }
}

raven_common::impl_str_serde!(Level, "a severity level");

/// Name and version of the client that produced an event.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ClientSdkInfo {
    /// Unique SDK name.
    pub name: String,
    /// SDK version.
    pub version: String,
}

impl Default for ClientSdkInfo {
    fn default() -> Self {
        Self {
            name: raven_common::CLIENT_NAME.to_owned(),
            version: raven_common::CLIENT_VERSION.to_owned(),
        }
    }
}

/// A captured error or message record destined for the collector.
///
/// Events are constructed with [`Event::new`], populated by the client and then converted into
/// their wire document with [`Event::to_document`].
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Unique identifier of this event.
    pub id: EventId,
    /// Creation time, serialized with second precision.
    pub timestamp: DateTime<Utc>,
    /// Severity level. Serialized as `error` when unset.
    pub level: Option<Level>,
    /// Name of the logger that created the event.
    pub logger: String,
    /// Platform tag.
    pub platform: String,
    /// Information about the client.
    pub sdk: ClientSdkInfo,
    /// Human readable message, capped at [`MAX_MESSAGE_SIZE`](crate::MAX_MESSAGE_SIZE) bytes.
    pub message: String,
    /// The release of the application.
    pub release: Option<String>,
    /// The environment the application runs in.
    pub environment: Option<String>,
    /// Name of the host.
    pub server_name: Option<String>,
    /// Loaded dependencies and their versions.
    pub modules: BTreeMap<String, String>,
    /// Name of the active transaction.
    pub transaction: Option<String>,
    /// Information about the affected user.
    pub user: Object,
    /// Custom tags.
    pub tags: BTreeMap<String, String>,
    /// Structured contexts. A key mapped to `null` is kept and suppresses scope defaults.
    pub contexts: Object,
    /// Arbitrary additional data.
    pub extra: Object,
    /// Grouping fingerprint.
    pub fingerprint: Vec<String>,
    /// Snapshot of breadcrumbs recorded before the event.
    pub breadcrumbs: Option<BreadcrumbBuffer>,
    /// Attached interfaces, at most one per kind.
    pub interfaces: BTreeMap<InterfaceKind, Interface>,
}

impl Event {
    /// Creates an empty event with a fresh identifier and the current time.
    pub fn new() -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            level: None,
            logger: DEFAULT_LOGGER.to_owned(),
            platform: DEFAULT_PLATFORM.to_owned(),
            sdk: ClientSdkInfo::default(),
            message: String::new(),
            release: None,
            environment: None,
            server_name: None,
            modules: BTreeMap::new(),
            transaction: None,
            user: Object::new(),
            tags: BTreeMap::new(),
            contexts: Object::new(),
            extra: Object::new(),
            fingerprint: Vec::new(),
            breadcrumbs: None,
            interfaces: BTreeMap::new(),
        }
    }

    /// Sets the message, truncating it if it exceeds the size limit.
    pub fn set_message(&mut self, message: &str) {
        self.message = truncate_message(message);
    }

    /// Sets the level from its name. `warn` is accepted as an alias for `warning`.
    pub fn set_level_str(&mut self, level: &str) -> Result<(), ParseLevelError> {
        self.level = Some(level.parse()?);
        Ok(())
    }

    /// Attaches an interface, replacing a previous one of the same kind.
    pub fn set_interface(&mut self, interface: impl Into<Interface>) {
        let interface = interface.into();
        self.interfaces.insert(interface.kind(), interface);
    }

    /// Returns the interface of the given kind.
    pub fn interface(&self, kind: InterfaceKind) -> Option<&Interface> {
        self.interfaces.get(&kind)
    }

    /// Returns the recorded exceptions, oldest cause first.
    pub fn exceptions(&self) -> &[Exception] {
        match self.interface(InterfaceKind::Exception) {
            Some(Interface::Exception(values)) => &values.values,
            _ => &[],
        }
    }

    /// Serializes the event into its wire document.
    ///
    /// This is the single canonical conversion used for both synchronous sends and asynchronous
    /// handoff.
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Returns the human readable summary of this event.
    pub fn log_message(&self) -> String {
        derive_log_message(
            &self.message,
            self.exceptions().first().map(|e| (e.ty.as_str(), e.value.as_str())),
        )
    }

    /// Writes all populated fields shared with transaction events.
    pub(crate) fn serialize_common<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        map.serialize_entry("event_id", &self.id)?;
        if let Some(ref release) = self.release {
            map.serialize_entry("release", release)?;
        }
        if let Some(ref environment) = self.environment {
            map.serialize_entry("environment", environment)?;
        }
        if let Some(ref server_name) = self.server_name {
            map.serialize_entry("server_name", server_name)?;
        }
        if !self.modules.is_empty() {
            map.serialize_entry("modules", &self.modules)?;
        }
        if !self.user.is_empty() {
            map.serialize_entry("user", &self.user)?;
        }
        if !self.tags.is_empty() {
            map.serialize_entry("tags", &self.tags)?;
        }
        if !self.contexts.is_empty() {
            map.serialize_entry("contexts", &self.contexts)?;
        }
        if !self.extra.is_empty() {
            map.serialize_entry("extra", &self.extra)?;
        }
        if let Some(ref transaction) = self.transaction {
            map.serialize_entry("transaction", transaction)?;
        }
        if !self.platform.is_empty() {
            map.serialize_entry("platform", &self.platform)?;
        }
        if !self.logger.is_empty() {
            map.serialize_entry("logger", &self.logger)?;
        }
        map.serialize_entry("sdk", &self.sdk)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.serialize_common(&mut map)?;

        map.serialize_entry("level", &self.level.unwrap_or_default())?;
        map.serialize_entry("timestamp", &format_timestamp(&self.timestamp))?;
        if !self.message.is_empty() {
            map.serialize_entry("message", &self.message)?;
        }
        if !self.fingerprint.is_empty() {
            map.serialize_entry("fingerprint", &self.fingerprint)?;
        }
        if let Some(ref breadcrumbs) = self.breadcrumbs {
            if !breadcrumbs.is_empty() {
                map.serialize_entry("breadcrumbs", breadcrumbs)?;
            }
        }
        for (kind, interface) in &self.interfaces {
            map.serialize_entry(kind.key(), interface)?;
        }

        map.end()
    }
}

fn derive_log_message(message: &str, exception: Option<(&str, &str)>) -> String {
    if !message.is_empty() {
        return message.to_owned();
    }

    match exception {
        Some((ty, value)) => format!("{ty}: {value}"),
        None => NO_MESSAGE_VALUE.to_owned(),
    }
}

/// Returns the human readable summary of a serialized event document.
///
/// This is the explicit `message` if non-empty, otherwise `"<type>: <value>"` of the first recorded
/// exception, otherwise `<no message value>`.
pub fn log_message(document: &Value) -> String {
    let message = document
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let exception = document
        .pointer("/exception/values/0")
        .map(|exception| {
            let field = |name| exception.get(name).and_then(Value::as_str).unwrap_or_default();
            (field("type"), field("value"))
        });

    derive_log_message(message, exception)
}
