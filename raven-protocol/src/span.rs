use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{Event, Object};

/// Serializes date-times as fractional unix timestamps.
mod float_timestamp {
    use chrono::{DateTime, Utc};
    use raven_common::time::datetime_to_f64;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(datetime_to_f64(time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        from_f64(secs).ok_or_else(|| D::Error::custom("timestamp out of range"))
    }

    pub fn from_f64(secs: f64) -> Option<DateTime<Utc>> {
        let whole = secs.trunc();
        let nanos = ((secs - whole) * 1e9).round() as u32;
        DateTime::from_timestamp(whole as i64, nanos)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            time: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(time) => super::serialize(time, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<f64>::deserialize(deserializer)? {
                Some(secs) => from_f64(secs)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom("timestamp out of range")),
                None => Ok(None),
            }
        }
    }
}

fn new_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().as_simple().to_string();
    id.truncate(16);
    id
}

/// A timed operation within a trace.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Span {
    /// 32 hex character identifier shared by all spans of a trace.
    pub trace_id: String,

    /// 16 hex character identifier of this span.
    pub span_id: String,

    /// Identifier of the parent span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,

    /// Short code identifying the kind of operation, for example `db.query`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,

    /// Longer description of the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Completion status, for example `ok` or `internal_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Tags of this span.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    /// Arbitrary data attached to this span.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub data: Object,

    /// When the operation started.
    #[serde(with = "float_timestamp")]
    pub start_timestamp: DateTime<Utc>,

    /// When the operation finished. `None` while the span is running.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "float_timestamp::option"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Span {
    /// Starts a new root span of a fresh trace.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            trace_id: new_trace_id(),
            span_id: new_span_id(),
            parent_span_id: None,
            op: Some(op.into()),
            description: None,
            status: None,
            tags: BTreeMap::new(),
            data: Object::new(),
            start_timestamp: Utc::now(),
            timestamp: None,
        }
    }

    /// Starts a child span in the same trace.
    pub fn start_child(&self, op: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            parent_span_id: Some(self.span_id.clone()),
            ..Self::new(op)
        }
    }

    /// Marks the span as finished now. A finished span keeps its original end time.
    pub fn finish(&mut self) {
        self.finish_at(Utc::now());
    }

    /// Marks the span as finished at the given time.
    pub fn finish_at(&mut self, time: DateTime<Utc>) {
        if self.timestamp.is_none() {
            self.timestamp = Some(time);
        }
    }

    /// Returns `true` once the span has been finished.
    pub fn is_finished(&self) -> bool {
        self.timestamp.is_some()
    }

    /// Sets the completion status.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    /// Sets a tag.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Attaches arbitrary data.
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Returns the `trace` context describing this span.
    pub fn trace_context(&self) -> Value {
        let mut context = json!({
            "trace_id": self.trace_id,
            "span_id": self.span_id,
        });

        if let Some(object) = context.as_object_mut() {
            if let Some(ref parent) = self.parent_span_id {
                object.insert("parent_span_id".to_owned(), parent.as_str().into());
            }
            if let Some(ref op) = self.op {
                object.insert("op".to_owned(), op.as_str().into());
            }
            if let Some(ref description) = self.description {
                object.insert("description".to_owned(), description.as_str().into());
            }
            if let Some(ref status) = self.status {
                object.insert("status".to_owned(), status.as_str().into());
            }
        }

        context
    }
}

/// A named root span together with its finished child spans.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    /// Name of the transaction, for example a route or job class.
    pub name: String,
    /// The root span.
    pub root: Span,
    /// Finished child spans in completion order.
    pub spans: Vec<Span>,
}

impl Transaction {
    /// Starts a transaction with a new root span.
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: Span::new(op),
            spans: Vec::new(),
        }
    }

    /// Starts a span that is a direct child of the root span.
    pub fn start_child(&self, op: impl Into<String>) -> Span {
        self.root.start_child(op)
    }

    /// Finishes the span if needed and records it in this transaction.
    pub fn finish_child(&mut self, mut span: Span) {
        span.finish();
        self.spans.push(span);
    }

    /// Finishes the root span.
    pub fn finish(&mut self) {
        self.root.finish();
    }
}

/// An event describing a finished [`Transaction`].
///
/// Transaction events share all enrichment with regular events. They serialize with
/// `"type": "transaction"`, fractional timestamps and their spans in recorded order.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionEvent {
    /// The underlying event carrying ids, tags, contexts and release metadata.
    pub event: Event,
    /// When the transaction started.
    pub start_timestamp: DateTime<Utc>,
    /// When the transaction finished.
    pub timestamp: DateTime<Utc>,
    /// Child spans in recorded order.
    pub spans: Vec<Span>,
}

impl TransactionEvent {
    /// The type discriminator of transaction events.
    pub const TYPE: &'static str = "transaction";

    /// Creates an event from a transaction. An unfinished root span is finished now.
    ///
    /// The root span becomes the `trace` context and the transaction name becomes the
    /// `transaction` attribute.
    pub fn from_transaction(transaction: Transaction) -> Self {
        let Transaction {
            name,
            mut root,
            spans,
        } = transaction;

        root.finish();

        let mut event = Event::new();
        event.transaction = Some(name);
        event.contexts.insert("trace".to_owned(), root.trace_context());

        Self {
            event,
            start_timestamp: root.start_timestamp,
            timestamp: root.timestamp.unwrap_or_else(Utc::now),
            spans,
        }
    }

    /// Serializes the event into its wire document.
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Returns the human readable summary of this event.
    pub fn log_message(&self) -> String {
        self.event.log_message()
    }
}

impl Serialize for TransactionEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.event.serialize_common(&mut map)?;

        map.serialize_entry("type", Self::TYPE)?;
        if let Some(level) = self.event.level {
            map.serialize_entry("level", &level)?;
        }
        map.serialize_entry(
            "start_timestamp",
            &raven_common::time::datetime_to_f64(&self.start_timestamp),
        )?;
        map.serialize_entry(
            "timestamp",
            &raven_common::time::datetime_to_f64(&self.timestamp),
        )?;
        if !self.spans.is_empty() {
            map.serialize_entry("spans", &self.spans)?;
        }

        map.end()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use insta::assert_json_snapshot;

    use super::*;

    fn at(secs: i64, millis: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, millis * 1_000_000).unwrap()
    }

    #[test]
    fn test_span_ids() {
        let root = Span::new("http.server");
        assert_eq!(root.trace_id.len(), 32);
        assert_eq!(root.span_id.len(), 16);
        assert!(root.parent_span_id.is_none());

        let child = root.start_child("db.query");
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn test_finish_keeps_first_end() {
        let mut span = Span::new("task");
        span.finish_at(at(10, 0));
        span.finish_at(at(20, 0));
        assert_eq!(span.timestamp, Some(at(10, 0)));
        assert!(span.is_finished());
    }

    #[test]
    fn test_span_serialization() {
        let mut span = Span::new("db.query");
        span.trace_id = "4c79f60c11214eb38604f4ae0781bfb2".to_owned();
        span.span_id = "fa90fdead5f74052".to_owned();
        span.start_timestamp = at(1_600_000_000, 250);
        span.finish_at(at(1_600_000_001, 500));
        span.set_status("ok");

        assert_json_snapshot!(span, @r#"
        {
          "trace_id": "4c79f60c11214eb38604f4ae0781bfb2",
          "span_id": "fa90fdead5f74052",
          "op": "db.query",
          "status": "ok",
          "start_timestamp": 1600000000.25,
          "timestamp": 1600000001.5
        }
        "#);

        let parsed: Span = serde_json::from_value(serde_json::to_value(&span).unwrap()).unwrap();
        assert_eq!(parsed, span);
    }

    #[test]
    fn test_transaction_event_keeps_span_order() {
        let mut transaction = Transaction::new("GET /users", "http.server");
        for op in ["first", "second", "third"] {
            let child = transaction.start_child(op);
            transaction.finish_child(child);
        }
        transaction.finish();

        let root = transaction.root.clone();
        let event = TransactionEvent::from_transaction(transaction);
        let document = event.to_document().unwrap();

        assert_eq!(document["type"], "transaction");
        assert_eq!(document["transaction"], "GET /users");
        assert!(document.get("level").is_none());
        assert!(document.get("message").is_none());

        let ops: Vec<&str> = document["spans"]
            .as_array()
            .unwrap()
            .iter()
            .map(|span| span["op"].as_str().unwrap())
            .collect();
        assert_eq!(ops, ["first", "second", "third"]);

        assert_eq!(document["contexts"]["trace"]["trace_id"], root.trace_id.as_str());
        assert_eq!(document["contexts"]["trace"]["span_id"], root.span_id.as_str());
        assert_eq!(document["contexts"]["trace"]["op"], "http.server");
        assert!(document["start_timestamp"].is_f64());
    }
}
