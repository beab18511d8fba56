use serde_json::Value;

use crate::{Processor, STRING_MASK};

/// Masks request cookies and the `Cookie` header.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveCookiesProcessor;

impl Processor for RemoveCookiesProcessor {
    fn process(&self, document: &mut Value) {
        let Some(request) = document.get_mut("request").and_then(Value::as_object_mut) else {
            return;
        };

        if let Some(cookies) = request.get_mut("cookies") {
            *cookies = Value::from(STRING_MASK);
        }

        let headers = request.get_mut("headers").and_then(Value::as_object_mut);
        if let Some(cookie) = headers.and_then(|headers| headers.get_mut("Cookie")) {
            *cookie = Value::from(STRING_MASK);
        }
    }
}

/// Removes the body of `POST` requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemovePostDataProcessor;

impl Processor for RemovePostDataProcessor {
    fn process(&self, document: &mut Value) {
        let Some(request) = document.get_mut("request").and_then(Value::as_object_mut) else {
            return;
        };

        if request.get("method").and_then(Value::as_str) == Some("POST") {
            request.remove("data");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_remove_cookies() {
        let mut document = json!({
            "request": {
                "cookies": {"session": "abc"},
                "headers": {"Cookie": "session=abc", "Accept": "*/*"}
            }
        });
        RemoveCookiesProcessor.process(&mut document);

        assert_eq!(
            document,
            json!({
                "request": {
                    "cookies": "********",
                    "headers": {"Cookie": "********", "Accept": "*/*"}
                }
            })
        );
    }

    #[test]
    fn test_remove_cookies_without_request() {
        let mut document = json!({"message": "hi"});
        RemoveCookiesProcessor.process(&mut document);
        assert_eq!(document, json!({"message": "hi"}));
    }

    #[test]
    fn test_remove_post_data() {
        let mut document = json!({"request": {"method": "POST", "data": {"a": 1}}});
        RemovePostDataProcessor.process(&mut document);
        assert_eq!(document, json!({"request": {"method": "POST"}}));

        let mut document = json!({"request": {"method": "GET", "data": "x"}});
        RemovePostDataProcessor.process(&mut document);
        assert_eq!(document, json!({"request": {"method": "GET", "data": "x"}}));
    }
}
