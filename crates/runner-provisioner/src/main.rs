// Entry point for the `runner-provision` binary.
//
// Parses the command line, sets up logging and the async runtime, creates a
// HostContext and delegates to the Provisioner.

use clap::Parser;
use provision_common::constants;
use provision_common::host_context::HostContext;
use provision_sdk::build_constants::{ProvisionerPackage, Source};
use tracing_subscriber::EnvFilter;

use runner_provisioner::cli::Cli;
use runner_provisioner::provisioner::Provisioner;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to build Tokio runtime: {e}");
            std::process::exit(constants::return_code::TERMINATED_ERROR);
        }
    };

    let exit_code = runtime.block_on(run(cli));

    // Lingering blocking tasks must not delay the exit code.
    runtime.shutdown_background();
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    tracing::info!("Runner provisioner starting.");
    tracing::info!("  Version  = {}", ProvisionerPackage::VERSION);
    tracing::info!("  Commit   = {}", Source::COMMIT_HASH);
    tracing::info!(
        "  Platform = {} / {}",
        constants::CURRENT_PLATFORM,
        constants::CURRENT_ARCHITECTURE
    );

    let host_context = HostContext::new("Provisioner");
    let provisioner = Provisioner::new(host_context);

    match provisioner.execute_command(cli).await {
        Ok(exit_code) => {
            tracing::info!("Provisioner exiting with code {}", exit_code);
            exit_code
        }
        Err(e) => {
            provisioner.report_failure(&e);
            constants::return_code::TERMINATED_ERROR
        }
    }
}
