//! gfd-integration - run the GFD image once and check its output file

use anyhow::Result;
use clap::Parser;
use gfd_verify::config::{DEFAULT_MOUNT_TARGET, DEFAULT_OUTPUT_FILE};
use gfd_verify::telemetry::init_logging_with;
use gfd_verify::{integration, DockerCli, IntegrationConfig, LabelSource, MatchStrategy};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gfd-integration")]
#[command(about = "Integration tests for GPU Feature Discovery in a standalone container", long_about = None)]
#[command(version)]
struct Cli {
    /// GFD image to run
    #[arg(value_name = "DOCKER_IMAGE")]
    image: String,

    /// File with one expected label regex per line
    #[arg(long, env = "GFD_VERIFY_EXPECTED_OUTPUT", default_value = "./expected-output.txt")]
    expected_output: PathBuf,

    /// Where the scratch directory is mounted in the container
    #[arg(long, env = "GFD_VERIFY_MOUNT_TARGET", default_value = DEFAULT_MOUNT_TARGET)]
    mount_target: String,

    /// Name of the file GFD writes inside the mount
    #[arg(long, env = "GFD_VERIFY_OUTPUT_FILE", default_value = DEFAULT_OUTPUT_FILE)]
    output_file: String,

    /// Seconds between output file checks, at least 1
    #[arg(
        long,
        env = "GFD_VERIFY_POLL_INTERVAL_SECS",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval_secs: u64,

    /// Bound on the output wait in seconds; 0 waits forever
    #[arg(long, env = "GFD_VERIFY_POLL_TIMEOUT_SECS", default_value_t = 300)]
    poll_timeout_secs: u64,

    /// Container CLI to drive
    #[arg(long, env = "GFD_VERIFY_DOCKER", default_value = "docker")]
    docker: String,

    /// Label pairing: first-fit or maximum
    #[arg(long, env = "GFD_VERIFY_STRATEGY", default_value = "first-fit")]
    strategy: MatchStrategy,

    /// Debug logging
    #[arg(short, long, env = "GFD_VERIFY_VERBOSE")]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> IntegrationConfig {
        let poll_timeout =
            (self.poll_timeout_secs > 0).then(|| Duration::from_secs(self.poll_timeout_secs));

        IntegrationConfig::new(&self.image)
            .expected_output(&self.expected_output)
            .mount_target(&self.mount_target)
            .output_file(&self.output_file)
            .poll_interval(Duration::from_secs(self.poll_interval_secs))
            .poll_timeout(poll_timeout)
            .strategy(self.strategy)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging_with(if cli.verbose { "debug" } else { "info" });

    println!("Running integration tests for GFD");

    match run(&cli).await {
        Ok(true) => {
            println!("Integration tests done");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("Integration tests failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<bool> {
    let runtime = DockerCli::with_binary(&cli.docker);
    let report = integration::run(&runtime, &cli.config(), &mut std::io::stdout()).await?;

    for line in report.reconciliation.report_lines(LabelSource::File) {
        println!("{line}");
    }

    Ok(report.passed())
}
