//! gfd-e2e - end-to-end check of GFD on a live cluster
//!
//! Deploys the GFD and NFD manifests, waits for GFD to label a node, then
//! checks the node carries exactly the expected labels.

use anyhow::{Context, Result};
use clap::Parser;
use gfd_verify::config::DEFAULT_SENTINEL_LABEL;
use gfd_verify::telemetry::init_logging_with;
use gfd_verify::e2e::{self, Manifests};
use gfd_verify::{E2eConfig, KubeControlPlane, LabelSource, MatchStrategy};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gfd-e2e")]
#[command(about = "End-to-end tests for GPU Feature Discovery", long_about = None)]
#[command(version)]
struct Cli {
    /// Manifest stream deploying GFD
    #[arg(value_name = "GFD_YAML_PATH")]
    gfd_yaml: PathBuf,

    /// Manifest stream deploying NFD
    #[arg(value_name = "NFD_YAML_PATH")]
    nfd_yaml: PathBuf,

    /// Kubeconfig file (default: inferred)
    #[arg(long, env = "GFD_VERIFY_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context
    #[arg(long, env = "GFD_VERIFY_CONTEXT")]
    context: Option<String>,

    /// Node to check (default: first listed node)
    #[arg(long, env = "GFD_VERIFY_NODE")]
    node: Option<String>,

    /// Bound on the node watch, in seconds
    #[arg(long, env = "GFD_VERIFY_WATCH_TIMEOUT_SECS", default_value_t = 180)]
    watch_timeout_secs: u64,

    /// Label whose appearance ends the watch
    #[arg(long, env = "GFD_VERIFY_SENTINEL_LABEL", default_value = DEFAULT_SENTINEL_LABEL)]
    sentinel_label: String,

    /// Label pairing: first-fit or maximum
    #[arg(long, env = "GFD_VERIFY_STRATEGY", default_value = "first-fit")]
    strategy: MatchStrategy,

    /// Debug logging
    #[arg(short, long, env = "GFD_VERIFY_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging_with(if cli.verbose { "debug" } else { "info" });

    println!("Running E2E tests for GFD");

    match run(cli).await {
        Ok(true) => {
            println!("E2E tests done");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("E2E tests failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut config = E2eConfig::new(cli.gfd_yaml, cli.nfd_yaml)
        .watch_timeout(Duration::from_secs(cli.watch_timeout_secs))
        .sentinel_label(cli.sentinel_label)
        .strategy(cli.strategy);
    if let Some(path) = cli.kubeconfig {
        config = config.kubeconfig(path);
    }
    if let Some(context) = cli.context {
        config = config.context(context);
    }
    if let Some(node) = cli.node {
        config = config.node(node);
    }

    let manifests = Manifests::load(&config).await?;

    let cluster = KubeControlPlane::from_config(&config)
        .await
        .context("Failed to connect to the cluster")?;

    let report = e2e::run_with(&cluster, &config, &manifests).await?;

    for line in report.reconciliation.report_lines(LabelSource::Node) {
        eprintln!("{line}");
    }

    Ok(report.passed())
}
