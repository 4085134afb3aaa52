//! Normalization of authored step descriptors.
//!
//! These routines turn a loose descriptor into the typed shape the executor runs:
//! - `kind`, when present, must be `http_request`.
//! - `rollback` is stripped; the ledger reads it from the raw descriptor.
//! - The method must be one of the supported verbs (any case).
//! - Unknown fields are rejected and defaults are filled in.

use serde_json::Value;

use super::{HttpMethod, HttpStepDefinition, HttpStepSpec, StepKind};
use crate::errors::SchemaError;

/// Normalize a raw HTTP descriptor, applying field defaults.
pub fn normalize_http_step(definition: &HttpStepDefinition) -> Result<HttpStepSpec, SchemaError> {
    let mut fields = definition.fields().clone();
    fields.remove("rollback");

    if let Some(kind) = fields.remove("kind")
        && kind.as_str() != Some(StepKind::HttpRequest.as_str())
    {
        return Err(SchemaError::UnsupportedKind(kind.to_string()));
    }

    if let Some(Value::String(method)) = fields.get("method") {
        method.parse::<HttpMethod>()?;
    }

    let spec = HttpStepSpec::from_value(Value::Object(fields))?;
    if let Some(body) = &spec.body
        && !body.is_object()
    {
        return Err(SchemaError::BodyNotMapping);
    }
    Ok(spec)
}

/// Callable inputs are either a mapping or a single template string.
pub fn validate_callable_inputs(inputs: &Value) -> Result<(), SchemaError> {
    match inputs {
        Value::Object(_) | Value::String(_) => Ok(()),
        _ => Err(SchemaError::InvalidCallableInputs),
    }
}
