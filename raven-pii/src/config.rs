use serde::{Deserialize, Serialize};

/// An error returned when compiling a [`SanitizeConfig`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum SanitizeConfigError {
    /// A field or whitelist entry could not be compiled into a pattern.
    #[error("could not parse pattern")]
    RegexError(#[source] regex::Error),
}

fn default_true() -> bool {
    true
}

/// Controls which values are scrubbed from event documents.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Additional sensitive field names. Names without regex metacharacters match whole words.
    pub fields: Vec<String>,

    /// Field names that are never masked, checked before any other rule.
    pub whitelist: Vec<String>,

    /// Mask values that look like credit card numbers regardless of their key.
    #[serde(default = "default_true")]
    pub credit_cards: bool,

    /// Mask request cookies and the `Cookie` header.
    pub remove_cookies: bool,

    /// Remove the request body of `POST` requests.
    pub remove_post_data: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            whitelist: Vec::new(),
            credit_cards: true,
            remove_cookies: false,
            remove_post_data: false,
        }
    }
}
