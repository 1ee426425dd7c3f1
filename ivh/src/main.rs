//! Infrastructure Validation Harness - CLI entry point.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use ivh::{HarnessRunner, Report, builtin_catalog, load_scenarios};
use ivh_common::cancel::cancel_pair;
use ivh_common::config::{HarnessConfig, load_env};
use ivh_common::provision::TerraformCli;
use ivh_common::ssh::SshTransport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "ivh")]
#[command(author, version, about = "Infrastructure validation harness - provision, check, always destroy")]
struct Cli {
    /// Provisioning-engine configuration root
    #[arg(short, long, default_value = "environments/production")]
    config_dir: PathBuf,

    /// TOML scenario file replacing the built-in catalog
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Skip expensive multi-resource scenarios
    #[arg(long)]
    short: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Abort the whole run after this long (e.g. "45m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Engine binary to invoke
    #[arg(long, default_value = "terraform")]
    engine_binary: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Credentials are a hard precondition: fail before provisioning anything.
    let env = load_env().context("startup precondition failed")?;
    let config = Arc::new(HarnessConfig::new(env, &cli.config_dir));
    if !config.remote_checks_available() {
        warn!("no SSH key pair in environment; remote checks will rely on the ssh agent");
    }

    let scenarios = match &cli.scenarios {
        Some(path) => load_scenarios(path)?,
        None => builtin_catalog(),
    };
    info!(
        scenarios = scenarios.len(),
        config_dir = %cli.config_dir.display(),
        short = cli.short,
        "starting harness run"
    );

    let (cancel_handle, cancel_token) = cancel_pair();
    let handle = Arc::new(cancel_handle);

    // Interrupt -> cancel in-flight waits so provisioned environments move
    // straight to teardown instead of orphaning resources.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling run and tearing down");
                handle.cancel();
            }
        });
    }
    if let Some(timeout) = cli.timeout {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(?timeout, "run timeout reached; cancelling");
            handle.cancel();
        });
    }

    let runner = HarnessRunner::new(
        TerraformCli::with_binary(&cli.engine_binary),
        SshTransport::new(),
        config,
    )
    .short_mode(cli.short);

    let results = runner.run(scenarios, cancel_token).await;
    let report = Report::new(results);
    report.log_summary();

    let json = report.to_json().context("failed to render report")?;
    match &cli.report {
        Some(path) => std::fs::write(path, &json)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => println!("{json}"),
    }

    std::process::exit(report.exit_code());
}
