use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum size of a message in bytes. Longer messages are truncated.
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// Truncates a message to [`MAX_MESSAGE_SIZE`] bytes on a character boundary.
pub fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_SIZE {
        return message.to_owned();
    }

    let mut end = MAX_MESSAGE_SIZE;
    while !message.is_char_boundary(end) {
        end -= 1;
    }

    message[..end].to_owned()
}

/// A log message template with positional parameters.
///
/// ```json
/// {
///   "logentry": {
///     "message": "could not connect to %s",
///     "params": ["db.local"]
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LogEntry {
    /// The message template, capped at [`MAX_MESSAGE_SIZE`] bytes.
    pub message: String,

    /// Positional parameters for the template.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

impl LogEntry {
    /// Creates a log entry, truncating the template if required.
    pub fn new(message: &str, params: Vec<Value>) -> Self {
        Self {
            message: truncate_message(message),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_short_message_unchanged() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        // Each `ä` takes two bytes, so the limit falls inside a character.
        let message = format!("x{}", "ä".repeat(MAX_MESSAGE_SIZE));
        let truncated = truncate_message(&message);
        assert_eq!(truncated.len(), MAX_MESSAGE_SIZE - 1);
        assert!(truncated.starts_with('x'));
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = LogEntry::new("could not connect to %s", vec![json!("db.local")]);
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"message": "could not connect to %s", "params": ["db.local"]})
        );

        let entry = LogEntry::new("plain", vec![]);
        assert_eq!(serde_json::to_value(&entry).unwrap(), json!({"message": "plain"}));
    }
}
