//! # Spindle Engine
//!
//! Runs declarative scenarios, which are ordered lists of HTTP or callable steps, against one or
//! more hosts. Captured outputs chain between steps through `${{ ... }}` templates. Responses
//! are checked structurally and retried. Failures roll back through compensating steps.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use spindle_engine::{ScenarioOptions, run_scenario};
//! use spindle_types::StepDefinition;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let steps = vec![
//!     StepDefinition::try_from(json!({
//!         "name": "create",
//!         "method": "POST",
//!         "route": "/items",
//!         "body": {"name": "demo"},
//!         "output": "created",
//!         "rollback": ["delete"]
//!     }))?,
//!     StepDefinition::try_from(json!({
//!         "name": "delete",
//!         "method": "DELETE",
//!         "route": "/items/${{ created.id }}"
//!     }))?,
//! ];
//! let options = ScenarioOptions::new(["http://localhost:8080"]).with_report("report.json");
//! let passed = run_scenario(steps, options).await;
//! # let _ = passed;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`matcher`**: strict and partial structural comparison of response bodies
//! - **`resolve`**: template rendering and typed-leaf coercion
//! - **`executor`**: runs one step against one host
//! - **`rollback`**: step catalog and the compensation ledger
//! - **`scenario`**: the resumable run, its report, and the report sink

use std::sync::Arc;

use spindle_types::StepDefinition;
use spindle_util::{Dispatcher, ReqwestDispatcher, block_on_future};
use tracing::error;

pub mod errors;
pub mod executor;
pub mod matcher;
pub mod resolve;
pub mod rollback;
pub mod scenario;

#[cfg(test)]
mod testing;

pub use errors::ScenarioError;
pub use executor::StepExecutor;
pub use matcher::matches;
pub use rollback::{LedgerEntry, RollbackLedger, StepCatalog};
pub use scenario::{ScenarioOptions, ScenarioReport, ScenarioRun, StepOutcome};

/// Run `steps` over HTTP and return the verdict.
///
/// A client that cannot be built is logged and counts as a failed run.
pub async fn run_scenario(steps: Vec<StepDefinition>, options: ScenarioOptions) -> bool {
    let dispatcher = match ReqwestDispatcher::new() {
        Ok(dispatcher) => dispatcher,
        Err(error) => {
            error!(error = %error, "failed to build HTTP client");
            return false;
        }
    };
    run_scenario_with(Arc::new(dispatcher), steps, options).await.success
}

/// Run `steps` through `dispatcher` and return the full report.
pub async fn run_scenario_with(
    dispatcher: Arc<dyn Dispatcher>,
    steps: Vec<StepDefinition>,
    options: ScenarioOptions,
) -> ScenarioReport {
    ScenarioRun::new(dispatcher, steps, options).run().await
}

/// Blocking form of [`run_scenario`] for synchronous callers.
pub fn run_scenario_blocking(steps: Vec<StepDefinition>, options: ScenarioOptions) -> anyhow::Result<bool> {
    block_on_future(run_scenario(steps, options))
}
