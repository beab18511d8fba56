use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::SanitizeConfigError;

/// Field names masked by default. These are matched anywhere inside a key.
pub const DEFAULT_FIELDS: &[&str] = &[
    "authorization",
    "password",
    "passwd",
    "secret",
    "ssn",
    "social(.*)?sec",
];

/// Characters that mark a field name as a regular expression.
const REGEX_SPECIAL_CHARACTERS: &[char] = &['.', '$', '^', '{', '[', '(', '|', ')', '*', '+', '?'];

/// 13 to 16 digits with optional space or dash separators.
pub static CREDIT_CARD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d[ -]*?){13,16}$").unwrap());

fn use_boundary(field: &str) -> bool {
    !DEFAULT_FIELDS.contains(&field) && !field.contains(REGEX_SPECIAL_CHARACTERS)
}

/// Compiles field names into a single case-insensitive pattern.
///
/// Returns `None` if there are no fields, in which case nothing should match.
pub fn compile_fields<'a, I>(fields: I) -> Result<Option<Regex>, SanitizeConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut alternatives: Vec<String> = Vec::new();
    for field in fields {
        if field.is_empty() {
            continue;
        }

        let alternative = if use_boundary(field) {
            format!(r"\b{field}\b")
        } else {
            field.to_owned()
        };

        if !alternatives.contains(&alternative) {
            alternatives.push(alternative);
        }
    }

    if alternatives.is_empty() {
        return Ok(None);
    }

    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(SanitizeConfigError::RegexError)
}
