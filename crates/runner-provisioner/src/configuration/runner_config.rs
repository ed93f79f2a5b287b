// Unattended configuration of an extracted runner package.

use anyhow::{bail, Context, Result};
use provision_common::constants::command_line::{args, flags};
use provision_common::constants::OsPlatform;
use provision_common::Tracing;
use provision_sdk::{CommandSpec, ProcessInvoker, TraceWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Environment variable the runner scripts require before running as root.
const ALLOW_RUN_AS_ROOT: &str = "RUNNER_ALLOW_RUNASROOT";

/// Options forwarded to the configuration script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerConfigOptions {
    pub name: String,
    pub labels: Vec<String>,
    pub work: String,
    pub runner_group: Option<String>,
    pub replace: bool,
    pub ephemeral: bool,
    pub disable_update: bool,
    pub no_default_labels: bool,
    pub allow_run_as_root: bool,
}

impl RunnerConfigOptions {
    /// Arguments for `config.sh`. The token is included verbatim; callers
    /// must have registered it with the secret masker.
    pub fn config_args(&self, url: &str, token: &str) -> Vec<String> {
        let mut out = vec![
            format!("--{}", flags::UNATTENDED),
            format!("--{}", args::URL),
            url.to_string(),
            format!("--{}", args::TOKEN),
            token.to_string(),
            format!("--{}", args::NAME),
            self.name.clone(),
            format!("--{}", args::WORK),
            self.work.clone(),
        ];
        if !self.labels.is_empty() {
            out.push(format!("--{}", args::LABELS));
            out.push(self.labels.join(","));
        }
        if let Some(group) = self.runner_group.as_deref().filter(|g| !g.trim().is_empty()) {
            out.push(format!("--{}", args::RUNNER_GROUP));
            out.push(group.to_string());
        }
        for (enabled, flag) in [
            (self.replace, flags::REPLACE),
            (self.ephemeral, flags::EPHEMERAL),
            (self.disable_update, flags::DISABLE_UPDATE),
            (self.no_default_labels, flags::NO_DEFAULT_LABELS),
        ] {
            if enabled {
                out.push(format!("--{flag}"));
            }
        }
        out
    }
}

/// Runs the configuration script and produces the run command.
pub struct RunnerConfigurator {
    trace: Tracing,
    platform: OsPlatform,
}

impl RunnerConfigurator {
    pub fn new(trace: Tracing, platform: OsPlatform) -> Self {
        Self { trace, platform }
    }

    /// Configure the runner in `runner_dir` against `url`, then return the
    /// command that starts it.
    pub async fn configure(
        &self,
        runner_dir: &Path,
        url: &str,
        token: &str,
        options: &RunnerConfigOptions,
        cancel: CancellationToken,
    ) -> Result<CommandSpec> {
        let script = self.script_path(runner_dir, self.platform.config_script())?;
        self.trace.info(&format!(
            "Configuring runner '{}' for {url} (labels: [{}])",
            options.name,
            options.labels.join(", ")
        ));

        let command = self
            .base_command(script, runner_dir, options)
            .args(options.config_args(url, token));

        let invoker = ProcessInvoker::new(Arc::new(self.trace.clone()));
        invoker
            .execute(&command, true, cancel)
            .await
            .context("Runner configuration failed")?;

        self.trace.info("Runner configured.");
        self.run_command(runner_dir, options)
    }

    /// The command that starts an already configured runner.
    pub fn run_command(&self, runner_dir: &Path, options: &RunnerConfigOptions) -> Result<CommandSpec> {
        let script = self.script_path(runner_dir, self.platform.run_script())?;
        Ok(self.base_command(script, runner_dir, options))
    }

    fn base_command(&self, script: PathBuf, runner_dir: &Path, options: &RunnerConfigOptions) -> CommandSpec {
        let mut command = CommandSpec::new(script).current_dir(runner_dir);
        if options.allow_run_as_root {
            command = command.env(ALLOW_RUN_AS_ROOT, "1");
        }
        command
    }

    fn script_path(&self, runner_dir: &Path, name: &str) -> Result<PathBuf> {
        let path = runner_dir.join(name);
        if !path.is_file() {
            bail!(
                "'{}' not found; is {} an extracted runner package?",
                path.display(),
                runner_dir.display()
            );
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        Ok(path)
    }
}
