//! Callable step execution.

use serde_json::{Map, Value};
use spindle_types::{
    CallableStep, OutputState, StepPayload, StepResult, StepStatus, round_duration, validate_callable_inputs,
};
use tokio::{task::JoinError, time::Instant};

use super::ResultDraft;
use crate::resolve::interpolate_value;

pub(super) async fn execute_callable_step(host: &str, step: &CallableStep, output: OutputState) -> StepResult {
    let mut draft = ResultDraft {
        host: host.to_string(),
        name: step.name.clone(),
        target: step.target.name().to_string(),
        ignore: step.ignore,
        step: step.describe(&step.inputs),
        output,
        duration_sec: None,
        attempts: 0,
        payload: StepPayload::Callable { returned: Value::Null },
    };

    let inputs = match render_inputs(&step.inputs, &draft.output) {
        Ok(inputs) => inputs,
        Err(message) => return draft.finish(StepStatus::Failed, message),
    };
    draft.step = step.describe(&Value::Object(inputs.clone()));
    draft.attempts = 1;

    let start = Instant::now();
    let target = step.target.clone();
    let task_host = host.to_string();
    let outcome = tokio::spawn(async move { target.call(&task_host, inputs).await }).await;
    draft.duration_sec = Some(round_duration(start.elapsed().as_secs_f64()));

    match outcome {
        Ok(Ok(returned)) => {
            if let Some(variable) = &step.output {
                draft.output = draft.output.with_variable(variable.clone(), returned.clone());
            }
            draft.payload = StepPayload::Callable { returned };
            draft.finish(StepStatus::Success, "OK.")
        }
        Ok(Err(error)) if error.is_assertion() => draft.finish(StepStatus::Failed, format!("Assertion failed: {error}")),
        Ok(Err(error)) => draft.finish(StepStatus::Error, format!("Callable raised an error: {error}")),
        Err(join_error) => draft.finish(StepStatus::Error, format!("Callable panicked: {}", panic_detail(join_error))),
    }
}

fn panic_detail(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

/// Render inputs; a lone template string must render to a JSON object.
fn render_inputs(inputs: &Value, output: &OutputState) -> Result<Map<String, Value>, String> {
    validate_callable_inputs(inputs).map_err(|error| format!("Step must follow the descriptor schema: {error}"))?;
    let rendered =
        interpolate_value(inputs, &output.template_context()).map_err(|error| format!("Template rendering failed: {error}"))?;
    match rendered {
        Value::Object(map) => Ok(map),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(format!("Callable inputs must render to a mapping, got '{text}'")),
        },
        _ => Err("Callable inputs must render to a mapping".to_string()),
    }
}
