//! Scenario-structure errors. Step failures are results, not errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("rollback reference '{reference}' in step {step} does not name any step")]
    UnresolvedRollbackReference { step: String, reference: String },

    #[error("invalid rollback entry in step {step}: {entry}")]
    InvalidRollbackEntry { step: String, entry: String },

    #[error("step name '{0}' is used more than once")]
    DuplicateStepName(String),

    #[error("could not write report to {}: {reason}", path.display())]
    Report { path: PathBuf, reason: String },
}
