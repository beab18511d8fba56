use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request environment: CGI style variables such as `REQUEST_METHOD` and `HTTP_*` headers.
pub type RequestEnv = BTreeMap<String, String>;

/// Environment keys carrying client addresses. Only sent with default PII.
pub const IP_HEADERS: &[&str] = &[
    "REMOTE_ADDR",
    "HTTP_CLIENT_IP",
    "HTTP_X_REAL_IP",
    "HTTP_X_FORWARDED_FOR",
];

/// Environment keys that may carry a request identifier, in order of preference.
const REQUEST_ID_KEYS: &[&str] = &["action_dispatch.request_id", "HTTP_X_REQUEST_ID"];

/// Controls how a [`Request`] is extracted from a [`RequestEnv`].
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// Include cookies, the request body and client addresses.
    pub send_default_pii: bool,
    /// Environment keys retained in [`Request::env`]. All keys are kept when empty.
    pub env_whitelist: Vec<String>,
}

/// Information about the HTTP request being handled when the event was captured.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Request {
    /// The URL of the request without query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP request method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body, decoded into an object for form submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// The raw query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,

    /// Parsed cookies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: BTreeMap<String, String>,

    /// Request headers in canonical casing, for example `Content-Type`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Selected server environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Request {
    /// Extracts request information from a request environment.
    ///
    /// The `body` is attached only when `send_default_pii` is enabled. Without it, cookies and all
    /// [`IP_HEADERS`] are removed as well.
    pub fn from_env(env: &RequestEnv, body: Option<&str>, options: &RequestOptions) -> Self {
        let mut env = env.clone();
        let mut request = Request::default();

        if options.send_default_pii {
            let content_type = env.get("CONTENT_TYPE").map(String::as_str);
            request.data = body.map(|body| parse_body(body, content_type));
            request.cookies = env
                .get("HTTP_COOKIE")
                .map(|cookie| parse_cookies(cookie))
                .unwrap_or_default();
        } else {
            for key in IP_HEADERS {
                env.remove(*key);
            }
        }

        request.url = build_url(&env);
        request.method = env.get("REQUEST_METHOD").cloned();
        request.query_string = env.get("QUERY_STRING").cloned();
        request.headers = format_headers(&env);
        request.env = filter_env(&env, &options.env_whitelist);

        request
    }
}

fn parse_body(body: &str, content_type: Option<&str>) -> Value {
    let is_form = content_type
        .is_some_and(|ty| ty.starts_with("application/x-www-form-urlencoded"));

    if is_form && let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(body) {
        return pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect::<serde_json::Map<_, _>>()
            .into();
    }

    Value::String(body.to_owned())
}

fn parse_cookies(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_owned(), value.trim().to_owned()))
        })
        .collect()
}

fn build_url(env: &RequestEnv) -> Option<String> {
    let scheme = match env.get("rack.url_scheme") {
        Some(scheme) => scheme.as_str(),
        None if env.get("HTTPS").is_some_and(|https| https == "on") => "https",
        None => "http",
    };

    let host = match env.get("HTTP_HOST") {
        Some(host) => host.clone(),
        None => {
            let name = env.get("SERVER_NAME")?;
            match env.get("SERVER_PORT").map(String::as_str) {
                None | Some("") => name.clone(),
                Some("80") if scheme == "http" => name.clone(),
                Some("443") if scheme == "https" => name.clone(),
                Some(port) => format!("{name}:{port}"),
            }
        }
    };

    let script_name = env.get("SCRIPT_NAME").map_or("", String::as_str);
    let path_info = env.get("PATH_INFO").map_or("", String::as_str);

    Some(format!("{scheme}://{host}{script_name}{path_info}"))
}

/// Converts a header key such as `HTTP_X_FORWARDED_FOR` into `X-Forwarded-For`.
fn header_name(key: &str) -> String {
    let key = key.strip_prefix("HTTP_").unwrap_or(key);
    key.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

fn format_headers(env: &RequestEnv) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    for (key, value) in env {
        if REQUEST_ID_KEYS.contains(&key.as_str()) {
            if let Some(request_id) = read_request_id(env) {
                headers
                    .entry("X-Request-Id".to_owned())
                    .or_insert_with(|| request_id.to_owned());
            }
            continue;
        }

        // Lowercase keys are server internals rather than headers.
        if key.to_uppercase() != *key {
            continue;
        }

        // Rack sets HTTP_VERSION to the server protocol. Keep it only if the client sent a
        // distinct `Version` header.
        if key == "HTTP_VERSION" && env.get("SERVER_PROTOCOL") == Some(value) {
            continue;
        }

        if key == "HTTP_COOKIE" {
            continue;
        }

        if !key.starts_with("HTTP_") && key != "CONTENT_TYPE" && key != "CONTENT_LENGTH" {
            continue;
        }

        headers.insert(header_name(key), value.clone());
    }

    headers
}

fn read_request_id(env: &RequestEnv) -> Option<&str> {
    REQUEST_ID_KEYS
        .iter()
        .find_map(|key| env.get(*key))
        .map(String::as_str)
}

fn filter_env(env: &RequestEnv, whitelist: &[String]) -> BTreeMap<String, String> {
    if whitelist.is_empty() {
        return env.clone();
    }

    env.iter()
        .filter(|(key, _)| whitelist.contains(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn ips_from(header: Option<&String>) -> Vec<IpAddr> {
    let Some(header) = header else {
        return Vec::new();
    };

    header
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|ip| ip.trim().parse().ok())
        .collect()
}

fn is_trusted_proxy(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => ip.is_loopback() || ip.is_private(),
        IpAddr::V6(ip) => ip.is_loopback() || (ip.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Determines the client address of a request, looking through proxy headers.
///
/// Candidates are taken from `Client-Ip`, `X-Real-Ip`, `X-Forwarded-For` and finally
/// `REMOTE_ADDR`. The first address that is not a loopback or private proxy address wins. If all
/// candidates are private, `REMOTE_ADDR` is returned.
pub fn real_ip(env: &RequestEnv) -> Option<String> {
    let remote_addr = ips_from(env.get("REMOTE_ADDR")).into_iter().next();

    let candidates = ips_from(env.get("HTTP_CLIENT_IP"))
        .into_iter()
        .chain(ips_from(env.get("HTTP_X_REAL_IP")))
        .chain(ips_from(env.get("HTTP_X_FORWARDED_FOR")))
        .chain(remote_addr);

    candidates
        .filter(|ip| !is_trusted_proxy(ip))
        .chain(remote_addr)
        .next()
        .map(|ip| ip.to_string())
}
