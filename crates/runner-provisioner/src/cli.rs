//! Command line surface of `runner-provision`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use provision_common::constants::{defaults, variables};
use provision_sdk::{ContainsText, MatchesPattern, ReadinessProbe, SupervisorOptions};
use std::path::PathBuf;
use std::time::Duration;

use crate::github::RunnerScope;

#[derive(Debug, Parser)]
#[command(
    name = "runner-provision",
    version,
    about = "Register, install and launch a self-hosted GitHub Actions runner"
)]
pub struct Cli {
    /// Debug-level logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Obtain a registration token, install and configure the runner, then
    /// launch it and wait until it listens for jobs
    Provision(ProvisionArgs),
    /// Launch any command and gate on a readiness line in its output
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    /// `owner/repo`, `org`, or a full repository/organization URL
    #[arg(long)]
    pub scope: RunnerScope,

    /// Personal access token used to create the registration token
    /// (falls back to GITHUB_TOKEN)
    #[arg(long, env = variables::INPUT_PAT, hide_env_values = true)]
    pub pat: Option<String>,

    /// Runner name (defaults to the host name)
    #[arg(long, env = variables::INPUT_NAME)]
    pub name: Option<String>,

    /// Extra comma separated labels
    #[arg(long, env = variables::INPUT_LABELS)]
    pub labels: Option<String>,

    /// Work folder, relative to the runner directory
    #[arg(long, env = variables::INPUT_WORK, default_value = defaults::WORK_DIRECTORY)]
    pub work: String,

    /// Runner group to register into
    #[arg(long = "runner-group", alias = "runnergroup", env = variables::INPUT_RUNNER_GROUP)]
    pub runner_group: Option<String>,

    /// Directory the runner package is extracted into
    #[arg(long, default_value = defaults::RUNNER_DIRECTORY)]
    pub runner_dir: PathBuf,

    /// Install this runner version instead of the latest release
    #[arg(long)]
    pub runner_version: Option<String>,

    /// Override the REST API base URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Reuse an already extracted package in --runner-dir
    #[arg(long)]
    pub skip_download: bool,

    /// Replace an existing runner with the same name
    #[arg(long)]
    pub replace: bool,

    /// Register a runner that takes a single job
    #[arg(long)]
    pub ephemeral: bool,

    /// Disable runner self-update
    #[arg(long)]
    pub disable_update: bool,

    /// Do not add the default self-hosted/OS/arch labels
    #[arg(long)]
    pub no_default_labels: bool,

    /// Allow the runner scripts to run as root
    #[arg(long)]
    pub allow_run_as_root: bool,

    #[command(flatten)]
    pub readiness: ReadinessArgs,
}

impl ProvisionArgs {
    /// The credential from `--pat`/`ACTIONS_RUNNER_INPUT_PAT`, else `GITHUB_TOKEN`.
    pub fn resolve_pat(&self) -> Result<String> {
        self.pat
            .clone()
            .or_else(|| std::env::var(variables::GITHUB_TOKEN).ok())
            .filter(|p| !p.trim().is_empty())
            .context("A credential is required: pass --pat or set GITHUB_TOKEN")
    }
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Working directory for the command
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    #[command(flatten)]
    pub readiness: ReadinessArgs,

    /// Program and arguments, after `--`
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ReadinessArgs {
    /// Text whose presence in a line signals readiness
    #[arg(long, conflicts_with = "ready_pattern")]
    pub ready_text: Option<String>,

    /// Regular expression matched against each line instead of --ready-text
    #[arg(long)]
    pub ready_pattern: Option<String>,

    /// Seconds without output tolerated before readiness
    #[arg(long, value_name = "SECS", default_value_t = defaults::NOT_READY_TIMEOUT.as_secs())]
    pub not_ready_timeout: u64,

    /// Seconds of silence after readiness that count as a settled start
    #[arg(long, value_name = "SECS", default_value_t = defaults::READY_TIMEOUT.as_secs())]
    pub ready_timeout: u64,

    /// Leave the process running when it fails to become ready
    #[arg(long)]
    pub keep_on_timeout: bool,
}

impl ReadinessArgs {
    pub fn probe(&self) -> Result<ReadySignal> {
        match (&self.ready_pattern, &self.ready_text) {
            (Some(pattern), _) => Ok(ReadySignal::Pattern(
                MatchesPattern::new(pattern)
                    .with_context(|| format!("Invalid --ready-pattern '{pattern}'"))?,
            )),
            (None, Some(text)) => Ok(ReadySignal::Text(ContainsText::new(text.as_str()))),
            (None, None) => Ok(ReadySignal::Text(ContainsText::new(defaults::READY_TEXT))),
        }
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            not_ready_timeout: Duration::from_secs(self.not_ready_timeout),
            ready_timeout: Duration::from_secs(self.ready_timeout),
            terminate_on_timeout: !self.keep_on_timeout,
        }
    }
}

/// The readiness probe selected on the command line.
#[derive(Debug, Clone)]
pub enum ReadySignal {
    Text(ContainsText),
    Pattern(MatchesPattern),
}

impl ReadinessProbe for ReadySignal {
    fn is_ready(&self, line: &str) -> bool {
        match self {
            ReadySignal::Text(p) => p.is_ready(line),
            ReadySignal::Pattern(p) => p.is_ready(line),
        }
    }

    fn describe(&self) -> String {
        match self {
            ReadySignal::Text(p) => p.describe(),
            ReadySignal::Pattern(p) => p.describe(),
        }
    }
}
