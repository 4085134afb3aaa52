//! Run aggregation and the JSON report sink.

use std::path::Path;

use indexmap::IndexMap;
use spindle_types::{HostReport, StepResult};

use crate::errors::ScenarioError;

/// Outcome of a full run: verdict plus results grouped per host.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// True iff no structural error occurred and every non-ignored result succeeded.
    pub success: bool,
    pub hosts: Vec<HostReport>,
    pub error: Option<ScenarioError>,
}

impl ScenarioReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.hosts)
    }

    /// Write the per-host report list to `path`. Output snapshots serialize with the token masked.
    pub async fn write_to(&self, path: &Path) -> Result<(), ScenarioError> {
        let report_error = |reason: String| ScenarioError::Report {
            path: path.to_path_buf(),
            reason,
        };
        let json = self.to_json().map_err(|error| report_error(error.to_string()))?;
        tokio::fs::write(path, json).await.map_err(|error| report_error(error.to_string()))
    }
}

/// Folds result batches into per-host reports in host declaration order.
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    hosts: IndexMap<String, HostReport>,
    success: bool,
    error: Option<ScenarioError>,
}

impl ReportBuilder {
    pub(crate) fn new(hosts: &[String]) -> Self {
        Self {
            hosts: hosts.iter().map(|host| (host.clone(), HostReport::new(host.clone()))).collect(),
            success: true,
            error: None,
        }
    }

    pub(crate) fn record(&mut self, batch: Vec<StepResult>) {
        for result in batch {
            if result.is_blocking_failure() {
                self.success = false;
            }
            self.hosts
                .entry(result.host.clone())
                .or_insert_with(|| HostReport::new(result.host.clone()))
                .push(result);
        }
    }

    pub(crate) fn fail(&mut self, error: ScenarioError) {
        self.success = false;
        self.error.get_or_insert(error);
    }

    pub(crate) fn finish(self) -> ScenarioReport {
        ScenarioReport {
            success: self.success,
            hosts: self.hosts.into_values().collect(),
            error: self.error,
        }
    }
}
