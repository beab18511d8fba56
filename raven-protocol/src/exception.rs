use serde::{Deserialize, Serialize};

use crate::Stacktrace;

/// A list of values, serialized as `{"values": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Values<T> {
    /// The contained values.
    pub values: Vec<T>,
}

impl<T> Values<T> {
    /// Wraps a list of values.
    pub fn new(values: Vec<T>) -> Self {
        Self { values }
    }
}

/// A single exception of a cause chain.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Exception {
    /// Type name of the exception, for example `ZeroDivisionError`.
    #[serde(rename = "type")]
    pub ty: String,

    /// The exception's message.
    pub value: String,

    /// The module the exception type is declared in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Stack trace of this exception. Omitted when an earlier exception shares the same trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_exception_values() {
        let values = Values::new(vec![Exception {
            ty: "ZeroDivisionError".to_owned(),
            value: "divided by 0".to_owned(),
            module: Some("app::math".to_owned()),
            stacktrace: None,
        }]);

        assert_eq!(
            serde_json::to_value(&values).unwrap(),
            json!({
                "values": [{
                    "type": "ZeroDivisionError",
                    "value": "divided by 0",
                    "module": "app::math"
                }]
            })
        );
    }
}
