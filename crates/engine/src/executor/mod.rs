//! Step execution: runs one step against one host with one output snapshot.
//!
//! - `http_step` templates, dispatches, and validates HTTP descriptors with retries
//! - `callable_step` invokes user-supplied async checks
//! - Both return a [`StepResult`] carrying the successor [`OutputState`]

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use spindle_types::{OutputState, StepDefinition, StepPayload, StepResult, StepStatus};
use spindle_util::{Dispatcher, redact_json};
use tracing::{error, info, warn};

mod callable_step;
mod http_step;

/// Executes single steps. Cheap to share across concurrent host executions.
#[derive(Clone)]
pub struct StepExecutor {
    dispatcher: Arc<dyn Dispatcher>,
    verify_tls: bool,
}

impl StepExecutor {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, verify_tls: bool) -> Self {
        Self { dispatcher, verify_tls }
    }

    /// Run `step` against `host`.
    ///
    /// `output` is taken by value; the returned result carries the replacement state.
    pub async fn execute(&self, host: &str, step: &StepDefinition, output: OutputState) -> StepResult {
        match step {
            StepDefinition::Http(definition) => {
                http_step::execute_http_step(self.dispatcher.as_ref(), self.verify_tls, host, definition, output).await
            }
            StepDefinition::Callable(callable) => callable_step::execute_callable_step(host, callable, output).await,
        }
    }
}

/// Fields accumulated while a step runs; turned into an immutable [`StepResult`] once.
struct ResultDraft {
    host: String,
    name: Option<String>,
    target: String,
    ignore: bool,
    step: Value,
    output: OutputState,
    duration_sec: Option<f64>,
    attempts: u32,
    payload: StepPayload,
}

impl ResultDraft {
    fn finish(self, status: StepStatus, message: impl Into<String>) -> StepResult {
        let result = StepResult {
            name: self.name,
            status,
            host: self.host,
            target: self.target,
            message: message.into(),
            timestamp: Utc::now(),
            duration_sec: self.duration_sec,
            attempts: self.attempts,
            ignore: self.ignore,
            payload: self.payload,
            step: self.step,
            output: self.output,
        };
        log_terminal_result(&result);
        result
    }
}

/// One record per terminal result. Inline credentials in the descriptor are masked as well.
fn log_terminal_result(result: &StepResult) {
    let step = result.name.as_deref().unwrap_or("-");
    match (result.status, result.ignore) {
        (StepStatus::Success, _) => info!(
            host = %result.host,
            step,
            route = %result.target,
            status = %result.status,
            attempts = result.attempts,
            duration_sec = ?result.duration_sec,
            descriptor = %redact_json(&result.step),
            "step succeeded"
        ),
        (_, true) => warn!(
            host = %result.host,
            step,
            route = %result.target,
            status = %result.status,
            attempts = result.attempts,
            duration_sec = ?result.duration_sec,
            message = %result.message,
            descriptor = %redact_json(&result.step),
            "ignored step did not succeed"
        ),
        (StepStatus::Failed, false) => error!(
            host = %result.host,
            step,
            route = %result.target,
            status = %result.status,
            attempts = result.attempts,
            duration_sec = ?result.duration_sec,
            message = %result.message,
            descriptor = %redact_json(&result.step),
            "step failed"
        ),
        (StepStatus::Error, false) => error!(
            host = %result.host,
            step,
            route = %result.target,
            status = %result.status,
            duration_sec = ?result.duration_sec,
            message = %result.message,
            descriptor = %redact_json(&result.step),
            "step raised an error"
        ),
    }
}
