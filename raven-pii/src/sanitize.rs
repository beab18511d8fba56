use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::regexes::{CREDIT_CARD_REGEX, DEFAULT_FIELDS, compile_fields};
use crate::{INT_MASK, Processor, STRING_MASK, SanitizeConfig, SanitizeConfigError};

/// Key whose string value is decoded as a form encoded query string before sanitizing.
const QUERY_STRING_KEY: &str = "query_string";

/// Masks sensitive values in an event document.
///
/// Keys are matched against the default sensitive fields together with the configured ones. For
/// each key and value the rules apply in order:
///
///  1. Whitelisted keys are kept as they are.
///  2. Objects are sanitized recursively and arrays element by element under the same key.
///  3. A string under `query_string` is decoded, sanitized per parameter and encoded again.
///  4. Integers are replaced with [`INT_MASK`] if the key matches or they look like a credit card.
///  5. Strings containing a JSON object are sanitized and serialized again if the key or the
///     value matches a sensitive field.
///  6. Other strings are replaced with [`STRING_MASK`] if the key matches or they look like a
///     credit card.
///
/// # Example
///
/// ```
/// use raven_pii::{Processor, SanitizeConfig, SanitizeProcessor};
/// use serde_json::json;
///
/// let processor = SanitizeProcessor::new(&SanitizeConfig::default()).unwrap();
/// let mut document = json!({"password": "abc123", "note": "ok"});
/// processor.process(&mut document);
///
/// assert_eq!(document, json!({"password": "********", "note": "ok"}));
/// ```
#[derive(Clone, Debug)]
pub struct SanitizeProcessor {
    fields: Option<Regex>,
    whitelist: Option<Regex>,
    credit_cards: bool,
}

impl SanitizeProcessor {
    /// Compiles the field and whitelist patterns of the given config.
    pub fn new(config: &SanitizeConfig) -> Result<Self, SanitizeConfigError> {
        let fields = DEFAULT_FIELDS
            .iter()
            .copied()
            .chain(config.fields.iter().map(String::as_str));

        Ok(Self {
            fields: compile_fields(fields)?,
            whitelist: compile_fields(config.whitelist.iter().map(String::as_str))?,
            credit_cards: config.credit_cards,
        })
    }

    fn is_sensitive(&self, string: &str) -> bool {
        self.fields
            .as_ref()
            .is_some_and(|fields| fields.is_match(string))
    }

    fn is_whitelisted(&self, key: &str) -> bool {
        self.whitelist
            .as_ref()
            .is_some_and(|whitelist| whitelist.is_match(key))
    }

    fn matches(&self, key: &str, value: &str) -> bool {
        (self.credit_cards && CREDIT_CARD_REGEX.is_match(value)) || self.is_sensitive(key)
    }

    fn process_object(&self, object: &mut Map<String, Value>) {
        for (key, value) in object.iter_mut() {
            self.sanitize(key, value);
        }
    }

    fn sanitize(&self, key: &str, value: &mut Value) {
        if self.is_whitelisted(key) {
            return;
        }

        match value {
            Value::Object(object) => self.process_object(object),
            Value::Array(items) => {
                for item in items {
                    self.sanitize(key, item);
                }
            }
            Value::String(string) if key == QUERY_STRING_KEY => {
                if let Some(sanitized) = self.sanitize_query_string(string) {
                    *string = sanitized;
                }
            }
            Value::Number(number) => {
                if !number.is_f64() && self.matches(key, &number.to_string()) {
                    *number = Number::from(INT_MASK);
                }
            }
            Value::String(string) => {
                if let Some(sanitized) = self.sanitize_embedded_json(key, string) {
                    *string = sanitized;
                } else if self.matches(key, string) {
                    *string = STRING_MASK.to_owned();
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }

    fn sanitize_query_string(&self, query_string: &str) -> Option<String> {
        let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(query_string) {
            Ok(pairs) => pairs,
            Err(error) => {
                raven_log::debug!("query string not sanitized: {}", raven_log::LogError(&error));
                return None;
            }
        };

        let pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(key, value)| {
                let mut value = Value::String(value);
                self.sanitize(&key, &mut value);
                let value = match value {
                    Value::String(value) => value,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        serde_urlencoded::to_string(pairs).ok()
    }

    /// Sanitizes a string holding a JSON object, returning it serialized again.
    fn sanitize_embedded_json(&self, key: &str, string: &str) -> Option<String> {
        if !self.is_sensitive(key) && !self.is_sensitive(string) {
            return None;
        }

        let Ok(Value::Object(mut object)) = serde_json::from_str(string) else {
            return None;
        };

        self.process_object(&mut object);
        serde_json::to_string(&object).ok()
    }
}

impl Processor for SanitizeProcessor {
    fn process(&self, document: &mut Value) {
        if let Value::Object(object) = document {
            self.process_object(object);
        }
    }
}
