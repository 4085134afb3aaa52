//! Step results and per-host report aggregation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::OutputState;

/// Terminal status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Success,
    /// Expectation not met, descriptor rejected, or transport failure.
    Failed,
    /// Unexpected failure raised by a callable.
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "SUCCESS",
            StepStatus::Failed => "FAILED",
            StepStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant-specific outcome data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    HttpRequest { code: Option<u16>, body: Value },
    Callable { returned: Value },
}

/// Rounds seconds to hundredths.
pub fn round_duration(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

/// Immutable record of one resolved step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: Option<String>,
    pub status: StepStatus,
    pub host: String,
    /// Route for HTTP steps, capability name for callables.
    pub target: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub duration_sec: Option<f64>,
    pub attempts: u32,
    pub ignore: bool,
    #[serde(flatten)]
    pub payload: StepPayload,
    /// Resolved descriptor with credentials redacted.
    pub step: Value,
    /// Output snapshot after this step; serializes with the token masked.
    pub output: OutputState,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// A non-SUCCESS result that was not demoted by `ignore`.
    pub fn is_blocking_failure(&self) -> bool {
        !self.ignore && !self.is_success()
    }
}

/// Ordered results for one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub host: String,
    pub reports: Vec<StepResult>,
    pub total_duration_sec: f64,
}

impl HostReport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            reports: Vec::new(),
            total_duration_sec: 0.0,
        }
    }

    pub fn push(&mut self, result: StepResult) {
        if let Some(duration) = result.duration_sec {
            self.total_duration_sec = round_duration(self.total_duration_sec + duration);
        }
        self.reports.push(result);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::output::OutputState;

    fn result(status: StepStatus, ignore: bool, duration: Option<f64>) -> StepResult {
        StepResult {
            name: Some("probe".into()),
            status,
            host: "http://h".into(),
            target: "/".into(),
            message: "msg".into(),
            timestamp: Utc::now(),
            duration_sec: duration,
            attempts: 1,
            ignore,
            payload: StepPayload::HttpRequest {
                code: Some(200),
                body: json!({}),
            },
            step: json!({"method": "GET"}),
            output: OutputState::new(Some("tok".into())),
        }
    }

    #[test]
    fn blocking_failure_respects_ignore() {
        assert!(result(StepStatus::Failed, false, None).is_blocking_failure());
        assert!(!result(StepStatus::Error, true, None).is_blocking_failure());
        assert!(!result(StepStatus::Success, false, None).is_blocking_failure());
    }

    #[test]
    fn host_report_sums_durations() {
        let mut report = HostReport::new("http://h");
        report.push(result(StepStatus::Success, false, Some(0.25)));
        report.push(result(StepStatus::Failed, true, None));
        report.push(result(StepStatus::Success, false, Some(1.1)));
        assert_eq!(report.reports.len(), 3);
        assert!((report.total_duration_sec - 1.35).abs() < f64::EPSILON);
    }

    #[test]
    fn serialized_result_is_flat_and_masked() {
        let value = serde_json::to_value(result(StepStatus::Success, false, Some(0.1))).unwrap();
        assert_eq!(value["status"], json!("SUCCESS"));
        assert_eq!(value["kind"], json!("http_request"));
        assert_eq!(value["code"], json!(200));
        assert_eq!(value["output"]["__token__"], json!("***"));
    }
}
