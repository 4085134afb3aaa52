//! Shared type definitions for the spindle scenario engine.
//!
//! Step descriptors, the per-host output state, and result records live here so that the
//! engine, the dispatch utilities, and the CLI agree on one vocabulary.

pub mod errors;
pub mod output;
pub mod result;
pub mod step;

pub use errors::{CallableError, SchemaError};
pub use output::{OutputState, TOKEN_KEY, TOKEN_MASK, TokenProvider, TokenSource};
pub use result::{HostReport, StepPayload, StepResult, StepStatus, round_duration};
pub use step::{
    CallableStep, FnCallable, HttpMethod, HttpStepDefinition, HttpStepSpec, MatchMode, ResponseClause, RollbackEntry,
    StepCallable, StepDefinition, StepKind, callable_fn,
    validation::{normalize_http_step, validate_callable_inputs},
};
