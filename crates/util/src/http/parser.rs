//! Response body decoding.

use serde_json::Value;

/// Decode a response body: JSON when it parses, otherwise the raw text.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use spindle_util::http::parse_response_body;
///
/// assert_eq!(parse_response_body(r#"{"id": 1}"#), json!({"id": 1}));
/// assert_eq!(parse_response_body("plain"), json!("plain"));
/// ```
pub fn parse_response_body(text: &str) -> Value {
    serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
