//! # Template Resolution
//!
//! Interpolates previously captured outputs into step descriptors using the `${{ ... }}`
//! syntax. Every string leaf of a descriptor is rendered; a handful of typed leaves coerce the
//! rendered text back into a non-string JSON value.
//!
//! ## Template Syntax
//!
//! - `${{ created }}` renders the whole variable (mappings and lists as JSON text)
//! - `${{ created.id }}` and `${{ items[0].id }}` navigate nested values
//! - `${{ created['odd key'] }}` addresses keys that are not identifiers
//! - `${{ __token__ }}` renders the static bearer token when one is configured
//!
//! Unknown variables and missing paths render as the empty string.
//!
//! ## Typed Leaves
//!
//! A mapping with exactly one of the keys `$int`, `$float`, `$bool`, `$list` and a string value
//! is replaced by the coerced result of rendering that string:
//!
//! ```rust
//! use serde_json::{Map, json};
//! use spindle_engine::resolve::interpolate_value;
//!
//! let mut variables = Map::new();
//! variables.insert("count".into(), json!(3));
//!
//! let rendered = interpolate_value(&json!({"limit": {"$int": "${{ count }}"}}), &variables).unwrap();
//! assert_eq!(rendered, json!({"limit": 3}));
//! ```

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Failure coercing a typed leaf.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot convert '{text}' to {target}")]
pub struct TemplateError {
    pub text: String,
    pub target: &'static str,
}

/// Recursively renders every string in `value` against `variables`.
pub fn interpolate_value(value: &Value, variables: &Map<String, Value>) -> Result<Value, TemplateError> {
    match value {
        Value::String(string_value) => Ok(Value::String(interpolate_string(string_value, variables))),
        Value::Array(array_values) => array_values
            .iter()
            .map(|array_value| interpolate_value(array_value, variables))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(object_map) => {
            if let Some(coerced) = coerce_typed_leaf(object_map, variables) {
                return coerced;
            }
            let mut interpolated_map = Map::new();
            for (key, value) in object_map.iter() {
                interpolated_map.insert(key.clone(), interpolate_value(value, variables)?);
            }
            Ok(Value::Object(interpolated_map))
        }
        _ => Ok(value.clone()),
    }
}

fn coerce_typed_leaf(object_map: &Map<String, Value>, variables: &Map<String, Value>) -> Option<Result<Value, TemplateError>> {
    if object_map.len() != 1 {
        return None;
    }
    let (key, Value::String(template)) = object_map.iter().next()? else {
        return None;
    };
    let coerce: fn(&str) -> Result<Value, TemplateError> = match key.as_str() {
        "$int" => coerce_int,
        "$float" => coerce_float,
        "$bool" => coerce_bool,
        "$list" => coerce_list,
        _ => return None,
    };
    Some(coerce(&interpolate_string(template, variables)))
}

fn coerce_int(text: &str) -> Result<Value, TemplateError> {
    text.trim().parse::<i64>().map(Value::from).map_err(|_| TemplateError {
        text: text.to_string(),
        target: "int",
    })
}

fn coerce_float(text: &str) -> Result<Value, TemplateError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| TemplateError {
            text: text.to_string(),
            target: "float",
        })
}

fn coerce_bool(text: &str) -> Result<Value, TemplateError> {
    Ok(Value::Bool(!text.is_empty()))
}

fn coerce_list(text: &str) -> Result<Value, TemplateError> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return Ok(Value::Array(items));
    }
    Ok(Value::Array(text.chars().map(|c| Value::String(c.to_string())).collect()))
}

/// Renders every `${{ ... }}` occurrence in `input_string`.
pub fn interpolate_string(input_string: &str, variables: &Map<String, Value>) -> String {
    let mut output_string = String::new();
    let mut remaining_string = input_string;

    while let Some(template_start) = remaining_string.find("${{") {
        let (string_before_template, string_after_template) = remaining_string.split_at(template_start);
        output_string.push_str(string_before_template);

        if let Some(template_end_index) = string_after_template.find("}}") {
            let template_expression = string_after_template[3..template_end_index].trim();
            output_string.push_str(&resolve_expression(template_expression, variables).unwrap_or_default());
            remaining_string = &string_after_template[template_end_index + 2..];
        } else {
            // Unterminated: keep the rest verbatim.
            output_string.push_str(string_after_template);
            return output_string;
        }
    }

    output_string.push_str(remaining_string);
    output_string
}

fn resolve_expression(expression: &str, variables: &Map<String, Value>) -> Option<String> {
    let segments = parse_path(expression)?;
    let (root, rest) = segments.split_first()?;
    let PathSegment::Key(root_name) = root else {
        return None;
    };
    let mut current = variables.get(root_name.as_str())?;
    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(object_map)) => object_map.get(key.as_str())?,
            (PathSegment::Index(index), Value::Array(array_values)) => array_values.get(*index)?,
            _ => return None,
        };
    }
    Some(format_json_value(current))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Splits `a.b[0]['c d']` into segments.
fn parse_path(expression: &str) -> Option<Vec<PathSegment>> {
    let mut segments = Vec::new();
    let mut chars = expression.trim().chars().peekable();
    let mut identifier = String::new();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !identifier.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut identifier)));
                }
            }
            '[' => {
                if !identifier.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut identifier)));
                }
                let quote = chars.peek().copied().filter(|q| *q == '\'' || *q == '"');
                let mut inner = String::new();
                if let Some(quote) = quote {
                    chars.next();
                    loop {
                        match chars.next()? {
                            ch if ch == quote => break,
                            ch => inner.push(ch),
                        }
                    }
                    if chars.next()? != ']' {
                        return None;
                    }
                    segments.push(PathSegment::Key(inner));
                } else {
                    loop {
                        match chars.next()? {
                            ']' => break,
                            ch => inner.push(ch),
                        }
                    }
                    segments.push(PathSegment::Index(inner.trim().parse().ok()?));
                }
            }
            ch if ch.is_whitespace() => return None,
            ch => identifier.push(ch),
        }
    }
    if !identifier.is_empty() {
        segments.push(PathSegment::Key(identifier));
    }
    if segments.is_empty() { None } else { Some(segments) }
}

fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(string_value) => string_value.clone(),
        Value::Number(number_value) => number_value.to_string(),
        Value::Bool(boolean_value) => boolean_value.to_string(),
        Value::Null => String::new(),
        other_value => other_value.to_string(),
    }
}
