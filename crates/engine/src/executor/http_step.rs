//! HTTP step execution with retry semantics.
//!
//! Per attempt, in order: token refresh, dispatch, output capture, `fail_on` codes, expected
//! code, `fail_on` bodies, expected body. `fail_on` hits end the step immediately; expectation
//! misses sleep `delay` seconds and retry until `retry + 1` attempts have been made.

use std::time::Duration;

use serde_json::Value;
use spindle_types::{
    HttpStepDefinition, HttpStepSpec, OutputState, ResponseClause, SchemaError, StepPayload, StepResult, StepStatus,
    normalize_http_step, round_duration,
};
use spindle_util::{DispatchRequest, Dispatcher, join_url, redact_descriptor};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::ResultDraft;
use crate::{matcher::matches, resolve::interpolate_value};

pub(super) async fn execute_http_step(
    dispatcher: &dyn Dispatcher,
    verify_tls: bool,
    host: &str,
    definition: &HttpStepDefinition,
    output: OutputState,
) -> StepResult {
    let mut draft = ResultDraft {
        host: host.to_string(),
        name: definition.name().map(str::to_string),
        target: definition.route().to_string(),
        ignore: definition.is_ignored(),
        step: redact_descriptor(&Value::Object(definition.fields().clone())),
        output,
        duration_sec: None,
        attempts: 0,
        payload: StepPayload::HttpRequest {
            code: None,
            body: Value::Null,
        },
    };

    let spec = match prepare(definition, &draft.output) {
        Ok(spec) => spec,
        Err(message) => return draft.finish(StepStatus::Failed, message),
    };
    draft.name = spec.name.clone();
    draft.target = spec.route.clone();
    draft.ignore = spec.ignore;

    // An unusable URL fails every attempt like any other transport error.
    let url = join_url(host, &spec.route);

    let mut headers = spec.effective_headers();
    let delay = Duration::from_secs(spec.delay);
    let start = Instant::now();
    let mut last_failure = String::new();

    for attempt in 1..=spec.retry.saturating_add(1) {
        if let Some(token) = draft.output.token() {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token.resolve()));
        }
        draft.step = describe(&spec, &headers);
        draft.attempts = attempt;

        let response = match &url {
            Ok(url) => {
                let request = DispatchRequest {
                    method: spec.method,
                    url: url.clone(),
                    headers: headers.clone(),
                    body: spec.body.clone(),
                    verify_tls,
                };
                dispatcher.send(request).await
            }
            Err(error) => Err(error.clone()),
        };
        draft.duration_sec = Some(round_duration(start.elapsed().as_secs_f64()));

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                warn!(host, route = %spec.route, attempt, error = %error, "request failed");
                last_failure = format!("Request failed: {error}");
                draft.payload = StepPayload::HttpRequest {
                    code: None,
                    body: Value::Null,
                };
                sleep(delay).await;
                continue;
            }
        };

        let code = response.code;
        let body = response.body;
        draft.payload = StepPayload::HttpRequest {
            code: Some(code),
            body: body.clone(),
        };
        if let Some(variable) = &spec.output {
            draft.output = draft.output.with_variable(variable.clone(), body.clone());
        }

        if spec.fail_on.iter().any(|clause| clause.code == Some(code)) {
            return draft.finish(StepStatus::Failed, "Failing HTTP status code.");
        }

        if let Some(message) = check_code(spec.expected.as_ref(), code) {
            debug!(host, route = %spec.route, attempt, code, "status code not accepted");
            last_failure = message.to_string();
            sleep(delay).await;
            continue;
        }

        if spec
            .fail_on
            .iter()
            .any(|clause| clause.body.as_ref().is_some_and(|expected| has_content(expected) && matches(&body, expected, clause.expected_match)))
        {
            return draft.finish(StepStatus::Failed, "Failing body.");
        }

        if let Some(expected) = &spec.expected
            && let Some(expected_body) = expected.body.as_ref().filter(|value| has_content(value))
            && !matches(&body, expected_body, expected.expected_match)
        {
            debug!(host, route = %spec.route, attempt, "body not accepted");
            last_failure = "Invalid body.".to_string();
            sleep(delay).await;
            continue;
        }

        return draft.finish(StepStatus::Success, "OK.");
    }

    draft.finish(StepStatus::Failed, last_failure)
}

/// Normalize, then render templates against the output snapshot.
fn prepare(definition: &HttpStepDefinition, output: &OutputState) -> Result<HttpStepSpec, String> {
    let describe_schema_error = |error: SchemaError| match error {
        SchemaError::InvalidMethod(_) => format!("Invalid HTTP method. {error}"),
        other => format!("Step must follow the descriptor schema: {other}"),
    };
    let spec = normalize_http_step(definition).map_err(describe_schema_error)?;
    let raw = spec.to_value().map_err(describe_schema_error)?;
    let rendered = interpolate_value(&raw, &output.template_context()).map_err(|error| format!("Template rendering failed: {error}"))?;
    HttpStepSpec::from_value(rendered).map_err(|error| format!("Template rendering failed: {error}"))
}

/// `expected.code` when given, otherwise any 2xx.
fn check_code(expected: Option<&ResponseClause>, code: u16) -> Option<&'static str> {
    match expected.and_then(|clause| clause.code) {
        Some(expected_code) if expected_code != code => Some("Invalid HTTP status code."),
        Some(_) => None,
        None if !(200..300).contains(&code) => Some("Invalid default HTTP status code (2XX)."),
        None => None,
    }
}

/// Empty mappings, lists, and strings place no constraint on the body.
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

fn describe(spec: &HttpStepSpec, headers: &indexmap::IndexMap<String, String>) -> Value {
    let mut described = spec.clone();
    described.headers = headers.clone();
    redact_descriptor(&described.to_value().unwrap_or(Value::Null))
}
