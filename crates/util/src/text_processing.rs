//! # Redaction Utilities
//!
//! Helpers that mask credentials before anything leaves the process: step descriptors embedded
//! in results, log records, and transport error messages.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Mask written in place of an `Authorization` header value.
pub const AUTHORIZATION_MASK: &str = "****";

/// Redacts values that look like secrets in a string.
///
/// # Example
/// ```rust
/// use spindle_util::text_processing::redact_sensitive;
///
/// let redacted = redact_sensitive("Authorization: Bearer secret123");
/// assert_eq!(redacted, "Authorization: [REDACTED]");
///
/// let redacted = redact_sensitive("API_TOKEN=xyz789");
/// assert_eq!(redacted, "API_TOKEN=[REDACTED]");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    redact_sensitive_with(input, "[REDACTED]")
}

/// Redacts sensitive-looking values, using a custom replacement token.
pub fn redact_sensitive_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();

    for pattern in get_redact_patterns().iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
                if captures.get(2).is_some() {
                    format!("{}{}{}", prefix, replacement, suffix)
                } else {
                    replacement.to_string()
                }
            })
            .to_string();
    }

    redacted
}

/// Returns compiled regex patterns for detecting sensitive information.
///
/// Authorization headers come first so that a whole `Bearer <token>` value is replaced
/// before the narrower inline-credential patterns run.
pub fn get_redact_patterns() -> &'static Vec<Regex> {
    static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);

    &REDACT_PATTERNS
}

fn build_redact_patterns() -> Vec<Regex> {
    vec![
        Regex::new(r"(?i)(authorization:\s+)([^\s]+(?:\s+[^\s]+)*)").unwrap(),
        Regex::new(r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)").unwrap(),
        Regex::new(r"(?i)((?:^|\b)Basic\s+)([A-Za-z0-9+/]+=*)").unwrap(),
        Regex::new(r"(?i)([A-Za-z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)[A-Za-z0-9_]*\s*=\s*)([^\s&]+)").unwrap(),
        Regex::new(r"(?i)(://[^:/\s]+:)([^@\s]+)(@)").unwrap(),
    ]
}

/// Returns a copy of `headers` with any `Authorization` value masked.
pub fn redact_headers(headers: &IndexMap<String, String>) -> IndexMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case("authorization") {
                (name.clone(), AUTHORIZATION_MASK.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// Masks the `Authorization` entry inside a descriptor's `headers` mapping.
///
/// Other fields are left untouched; the descriptor keeps its shape.
pub fn redact_descriptor(descriptor: &Value) -> Value {
    let Value::Object(fields) = descriptor else {
        return descriptor.clone();
    };
    let mut out = fields.clone();
    if let Some(Value::Object(headers)) = fields.get("headers") {
        let masked: Map<String, Value> = headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.clone(), Value::String(AUTHORIZATION_MASK.to_string()))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect();
        out.insert("headers".to_string(), Value::Object(masked));
    }
    Value::Object(out)
}

/// Recursively redacts sensitive data from JSON string leaves.
pub fn redact_json(v: &Value) -> Value {
    match v {
        Value::String(s) => Value::String(redact_sensitive(s)),
        Value::Array(arr) => Value::Array(arr.iter().map(redact_json).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, val)| (k.clone(), redact_json(val))).collect()),
        other => other.clone(),
    }
}
