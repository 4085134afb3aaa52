//! # Scenario Runs
//!
//! A [`ScenarioRun`] drives a step list across a host list as a pull-based sequence. Each call
//! to [`ScenarioRun::next`] advances by exactly one step (or one compensation) and yields the
//! results it produced:
//!
//! - sequential mode yields one result per item; hosts run one after another and share a single
//!   output state
//! - parallel mode yields one batch per step, holding the result of every host still alive
//!
//! A non-ignored failure triggers the rollback ledger. In sequential mode every compensation
//! registered so far, for any host, runs before the next host starts; a later failure replays
//! them again. In parallel mode the failed host stops
//! receiving steps and its compensations run after the last step.
//!
//! Structural problems (duplicate names, unresolved or malformed rollback entries) are detected
//! on the first call, before any dispatch, and end the sequence with an `Err` item.

use std::{collections::VecDeque, mem, path::PathBuf, sync::Arc};

use futures_util::{Stream, future::join_all, stream};
use indexmap::IndexMap;
use spindle_types::{OutputState, StepDefinition, StepResult, TokenSource};
use spindle_util::Dispatcher;
use tracing::{error, info, warn};

use crate::{
    errors::ScenarioError,
    executor::StepExecutor,
    rollback::{RollbackLedger, StepCatalog},
};

mod report;

pub use report::ScenarioReport;
use report::ReportBuilder;

/// How a scenario is run. `verify_tls` defaults to true.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub hosts: Vec<String>,
    pub token: Option<TokenSource>,
    pub parallel: bool,
    pub verify_tls: bool,
    pub report_path: Option<PathBuf>,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            token: None,
            parallel: false,
            verify_tls: true,
            report_path: None,
        }
    }
}

impl ScenarioOptions {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<TokenSource>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }
}

/// One item of a run, flattened when the batch holds a single result.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Single(StepResult),
    Batch(Vec<StepResult>),
}

impl StepOutcome {
    fn from_batch(mut batch: Vec<StepResult>) -> Self {
        if batch.len() == 1 {
            match batch.pop() {
                Some(result) => Self::Single(result),
                None => Self::Batch(batch),
            }
        } else {
            Self::Batch(batch)
        }
    }

    pub fn results(&self) -> &[StepResult] {
        match self {
            Self::Single(result) => std::slice::from_ref(result),
            Self::Batch(results) => results,
        }
    }
}

#[derive(Debug)]
enum Phase {
    NotStarted,
    Sequential { host: usize, step: usize },
    Parallel { step: usize },
    /// Walks ledger entries below `cursor` newest-first (restricted to `host` when set), then
    /// continues with `then`.
    Draining {
        host: Option<String>,
        cursor: usize,
        then: Box<Phase>,
    },
    /// Parallel mode: failed hosts whose compensations have not run yet.
    ParallelRollback { pending: VecDeque<String> },
    Done,
}

#[derive(Debug, Clone)]
struct HostState {
    output: OutputState,
    failed: bool,
}

/// Resumable execution of one scenario. Not restartable; consume it once.
pub struct ScenarioRun {
    executor: StepExecutor,
    steps: Vec<StepDefinition>,
    hosts: Vec<String>,
    parallel: bool,
    report_path: Option<PathBuf>,
    catalog: StepCatalog,
    ledger: RollbackLedger,
    shared_output: OutputState,
    host_states: IndexMap<String, HostState>,
    phase: Phase,
}

impl ScenarioRun {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, steps: Vec<StepDefinition>, options: ScenarioOptions) -> Self {
        let seed = OutputState::new(options.token);
        let host_states = options
            .hosts
            .iter()
            .map(|host| {
                (host.clone(), HostState {
                    output: seed.clone(),
                    failed: false,
                })
            })
            .collect();
        Self {
            executor: StepExecutor::new(dispatcher, options.verify_tls),
            steps,
            hosts: options.hosts,
            parallel: options.parallel,
            report_path: options.report_path,
            catalog: StepCatalog::default(),
            ledger: RollbackLedger::new(),
            shared_output: seed,
            host_states,
            phase: Phase::NotStarted,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Advance by one step or one compensation. `None` once the run is exhausted.
    pub async fn next(&mut self) -> Option<Result<Vec<StepResult>, ScenarioError>> {
        loop {
            match mem::replace(&mut self.phase, Phase::Done) {
                Phase::NotStarted => match StepCatalog::build(&self.steps) {
                    Ok(catalog) => {
                        info!(
                            hosts = self.hosts.len(),
                            steps = self.steps.len(),
                            parallel = self.parallel,
                            "starting scenario"
                        );
                        self.catalog = catalog;
                        self.phase = if self.parallel {
                            Phase::Parallel { step: 0 }
                        } else {
                            Phase::Sequential { host: 0, step: 0 }
                        };
                    }
                    Err(error) => {
                        error!(error = %error, "scenario rejected before execution");
                        return Some(Err(error));
                    }
                },
                Phase::Sequential { host, step } => {
                    let Some(host_name) = self.hosts.get(host).cloned() else {
                        continue;
                    };
                    let Some(definition) = self.steps.get(step).cloned() else {
                        self.phase = Phase::Sequential { host: host + 1, step: 0 };
                        continue;
                    };
                    if let Err(error) = self.ledger.register(&host_name, &definition, &self.catalog) {
                        return Some(Err(error));
                    }
                    let output = mem::take(&mut self.shared_output);
                    let result = self.executor.execute(&host_name, &definition, output).await;
                    self.shared_output = result.output.clone();

                    self.phase = if result.is_blocking_failure() {
                        warn!(host = %host_name, pending = self.ledger.pending(None), "host aborted, rolling back");
                        Phase::Draining {
                            host: None,
                            cursor: self.ledger.len(),
                            then: Box::new(Phase::Sequential { host: host + 1, step: 0 }),
                        }
                    } else {
                        Phase::Sequential { host, step: step + 1 }
                    };
                    return Some(Ok(vec![result]));
                }
                Phase::Parallel { step } => {
                    let Some(definition) = self.steps.get(step).cloned() else {
                        self.phase = self.parallel_rollback();
                        continue;
                    };
                    self.phase = Phase::Parallel { step: step + 1 };
                    match self.run_parallel_step(&definition).await {
                        Ok(batch) if batch.is_empty() => continue,
                        Ok(batch) => return Some(Ok(batch)),
                        Err(error) => {
                            self.phase = Phase::Done;
                            return Some(Err(error));
                        }
                    }
                }
                Phase::Draining { host, cursor, then } => {
                    let Some((index, entry)) = self
                        .ledger
                        .previous(cursor, host.as_deref())
                        .map(|(index, entry)| (index, entry.clone()))
                    else {
                        self.phase = *then;
                        continue;
                    };
                    info!(
                        host = %entry.host,
                        step = entry.step.name().unwrap_or("-"),
                        route = %entry.step.target(),
                        "running compensation"
                    );
                    let output = self.take_output(&entry.host);
                    let result = self.executor.execute(&entry.host, &entry.step, output).await;
                    self.restore_output(&entry.host, result.output.clone());
                    self.phase = Phase::Draining {
                        host,
                        cursor: index,
                        then,
                    };
                    return Some(Ok(vec![result]));
                }
                Phase::ParallelRollback { mut pending } => {
                    if let Some(host) = pending.pop_front() {
                        self.phase = Phase::Draining {
                            host: Some(host),
                            cursor: self.ledger.len(),
                            then: Box::new(Phase::ParallelRollback { pending }),
                        };
                    }
                }
                Phase::Done => return None,
            }
        }
    }

    /// Like [`ScenarioRun::next`], flattening single-result batches.
    pub async fn next_result(&mut self) -> Option<Result<StepOutcome, ScenarioError>> {
        self.next().await.map(|item| item.map(StepOutcome::from_batch))
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<StepResult>, ScenarioError>> {
        stream::unfold(self, |mut run| async move { run.next().await.map(|item| (item, run)) })
    }

    /// Consume the whole run, write the report if configured, and return the aggregate.
    pub async fn run(mut self) -> ScenarioReport {
        let mut builder = ReportBuilder::new(&self.hosts);
        while let Some(item) = self.next().await {
            match item {
                Ok(batch) => builder.record(batch),
                Err(error) => builder.fail(error),
            }
        }
        let mut report = builder.finish();
        if let Some(path) = &self.report_path
            && let Err(error) = report.write_to(path).await
        {
            error!(error = %error, "failed to write scenario report");
            report.success = false;
            report.error.get_or_insert(error);
        }
        info!(success = report.success, "scenario finished");
        report
    }

    /// Run `definition` concurrently on every host that has not failed yet.
    async fn run_parallel_step(&mut self, definition: &StepDefinition) -> Result<Vec<StepResult>, ScenarioError> {
        let mut inputs = Vec::new();
        for (host, state) in self.host_states.iter_mut().filter(|(_, state)| !state.failed) {
            self.ledger.register(host, definition, &self.catalog)?;
            inputs.push((host.clone(), mem::take(&mut state.output)));
        }

        let executor = &self.executor;
        let results = join_all(
            inputs
                .into_iter()
                .map(|(host, output)| async move { executor.execute(&host, definition, output).await }),
        )
        .await;

        for result in &results {
            if let Some(state) = self.host_states.get_mut(&result.host) {
                state.output = result.output.clone();
                if result.is_blocking_failure() {
                    warn!(host = %result.host, "host failed, skipping its remaining steps");
                    state.failed = true;
                }
            }
        }
        Ok(results)
    }

    fn parallel_rollback(&self) -> Phase {
        let pending: VecDeque<String> = self
            .host_states
            .iter()
            .filter(|(_, state)| state.failed)
            .map(|(host, _)| host.clone())
            .collect();
        if pending.is_empty() {
            Phase::Done
        } else {
            Phase::ParallelRollback { pending }
        }
    }

    fn take_output(&mut self, host: &str) -> OutputState {
        if self.parallel {
            self.host_states
                .get_mut(host)
                .map(|state| mem::take(&mut state.output))
                .unwrap_or_default()
        } else {
            mem::take(&mut self.shared_output)
        }
    }

    fn restore_output(&mut self, host: &str, output: OutputState) {
        if self.parallel {
            if let Some(state) = self.host_states.get_mut(host) {
                state.output = output;
            }
        } else {
            self.shared_output = output;
        }
    }
}
