use std::{path::PathBuf, process::ExitCode};

use anyhow::{Result, bail};
use clap::Parser;
use spindle_engine::{ScenarioOptions, run_scenario};
use spindle_types::StepDefinition;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

/// Run a declarative HTTP scenario against one or more hosts.
#[derive(Debug, Parser)]
#[command(name = "spindle", version, about)]
struct Cli {
    /// Scenario file (YAML or JSON).
    #[arg(short, long)]
    file: PathBuf,

    /// Target host; repeat for several. Replaces the hosts listed in the file.
    #[arg(long = "host", value_name = "URL")]
    hosts: Vec<String>,

    /// Run every host concurrently, one step at a time.
    #[arg(long)]
    parallel: bool,

    /// Skip TLS certificate verification.
    #[arg(long)]
    insecure: bool,

    /// Bearer token sent with every HTTP step.
    #[arg(long, env = "SPINDLE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Write the JSON report here.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let (steps, options) = match prepare(cli) {
        Ok(prepared) => prepared,
        Err(error) => {
            error!(error = %format!("{error:#}"), "invalid scenario configuration");
            eprintln!("error: {error:#}");
            return ExitCode::from(2);
        }
    };

    if run_scenario(steps, options).await {
        info!("scenario passed");
        ExitCode::SUCCESS
    } else {
        error!("scenario failed");
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the scenario file and apply command-line overrides.
fn prepare(cli: Cli) -> Result<(Vec<StepDefinition>, ScenarioOptions)> {
    let scenario = config::load_scenario(&cli.file)?;
    let steps = scenario.step_definitions()?;

    let hosts = if cli.hosts.is_empty() { scenario.hosts.clone() } else { cli.hosts };
    if hosts.is_empty() {
        bail!("no hosts configured; add `hosts` to {} or pass --host", cli.file.display());
    }

    let mut options = ScenarioOptions::new(hosts)
        .parallel(cli.parallel || scenario.parallel)
        .verify_tls(scenario.verify_tls && !cli.insecure);
    if let Some(token) = cli.token.or_else(|| scenario.token.clone()) {
        options = options.with_token(token);
    }
    if let Some(report) = cli.report.or_else(|| scenario.report_path()) {
        options = options.with_report(report);
    }
    Ok((steps, options))
}
