// Provisioner: dispatches CLI commands and drives the provisioning workflow
// (registration token, package, configuration, supervised launch).

use anyhow::{Context, Result};
use provision_common::constants::{self, return_code};
use provision_common::{HostContext, HttpClientFactory, ShutdownReason, Tracing};
use provision_sdk::{
    CommandSpec, ReadinessProbe, Supervisor, SupervisorError, SupervisorOptions, TraceWriter,
};
use std::sync::Arc;

use crate::cli::{Cli, Command, ProvisionArgs, WatchArgs};
use crate::configuration::validators;
use crate::configuration::{RunnerConfigOptions, RunnerConfigurator};
use crate::github::{GitHubClient, RunnerPackage};
use crate::package::PackageInstaller;

pub struct Provisioner {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl Provisioner {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Provisioner");
        Self { context, trace }
    }

    /// Log a failed command with every cause, secrets masked.
    pub fn report_failure(&self, err: &anyhow::Error) {
        self.trace.error_chain(err);
    }

    /// Run the parsed command. Returns the process exit code.
    pub async fn execute_command(&self, cli: Cli) -> Result<i32> {
        self.install_signal_handlers();

        match cli.command {
            Command::Provision(args) => self.provision(args).await,
            Command::Watch(args) => self.watch(args).await,
        }
    }

    async fn provision(&self, args: ProvisionArgs) -> Result<i32> {
        let pat = args.resolve_pat()?;
        self.context.add_secret(&pat);

        let options = self.config_options(&args)?;
        let probe = args.readiness.probe()?;
        let api_base = match &args.api_url {
            Some(api_url) => validators::validate_url(api_url)?,
            None => args.scope.api_base()?,
        };
        self.trace.info(&format!(
            "Provisioning runner '{}' for {} via {api_base}",
            options.name, args.scope
        ));

        let client = HttpClientFactory::create_client(&self.context)?;
        let github = GitHubClient::new(client.clone(), api_base, self.context.get_trace("GitHubClient"));

        let registration = github
            .create_registration_token(&args.scope, &pat)
            .await
            .context("Failed to obtain a runner registration token")?;
        self.context.add_secret(&registration.token);

        if args.skip_download {
            self.trace.info(&format!(
                "Skipping download, using the runner in {}",
                args.runner_dir.display()
            ));
        } else {
            let package = match &args.runner_version {
                Some(version) => RunnerPackage::for_version(
                    version,
                    constants::CURRENT_PLATFORM,
                    constants::CURRENT_ARCHITECTURE,
                )?,
                None => github
                    .latest_release(Some(&pat))
                    .await?
                    .select_package(constants::CURRENT_PLATFORM, constants::CURRENT_ARCHITECTURE)?,
            };
            PackageInstaller::new(client, self.context.get_trace("PackageInstaller"))
                .install(&package, &args.runner_dir, self.context.shutdown_token())
                .await?;
        }

        let configurator = RunnerConfigurator::new(
            self.context.get_trace("RunnerConfig"),
            constants::CURRENT_PLATFORM,
        );
        let run = configurator
            .configure(
                &args.runner_dir,
                &args.scope.config_url(),
                &registration.token,
                &options,
                self.context.shutdown_token(),
            )
            .await?;

        self.supervise(&run, args.readiness.supervisor_options(), probe)
            .await
    }

    async fn watch(&self, args: WatchArgs) -> Result<i32> {
        let probe = args.readiness.probe()?;
        let (program, rest) = args
            .command
            .split_first()
            .context("A command to run is required")?;

        let mut command = CommandSpec::new(program).args(rest.iter().cloned());
        if let Some(cwd) = &args.cwd {
            command = command.current_dir(cwd);
        }

        self.supervise(&command, args.readiness.supervisor_options(), probe)
            .await
    }

    /// Start `command`, wait for readiness, then follow it until it exits.
    async fn supervise(
        &self,
        command: &CommandSpec,
        options: SupervisorOptions,
        probe: impl ReadinessProbe + 'static,
    ) -> Result<i32> {
        let masker = self.context.secret_masker().clone();
        let supervisor = Supervisor::new(options, probe, Arc::new(self.trace.clone()))
            .with_echo(move |line| println!("{}", masker.mask_secrets(line)))
            .with_cancellation(self.context.shutdown_token());

        match supervisor.supervise(command).await {
            Ok(ready) => {
                self.trace
                    .info(&format!("Following output of process {}.", ready.pid()));
                let exit_code = ready.follow(self.context.shutdown_token()).await?;
                self.trace
                    .info(&format!("Process exited with code {exit_code}."));
                Ok(exit_code)
            }
            Err(SupervisorError::TimedOut { program, outcome }) => {
                self.trace.error(&format!(
                    "'{program}' did not become ready: {outcome}"
                ));
                Ok(return_code::READINESS_TIMEOUT)
            }
            Err(SupervisorError::Cancelled { pid, exit_code }) => {
                let reason = self
                    .context
                    .shutdown_reason()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "cancellation".to_string());
                self.trace.info(&format!(
                    "Stopped process {pid} before it became ready ({reason}), exit code {exit_code}."
                ));
                Ok(return_code::TERMINATED_ERROR)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn config_options(&self, args: &ProvisionArgs) -> Result<RunnerConfigOptions> {
        let name = match &args.name {
            Some(name) => name.trim().to_string(),
            None => default_runner_name()?,
        };
        validators::validate_runner_name(&name)?;
        validators::validate_work_folder(&args.work)?;
        let labels = validators::parse_labels(args.labels.as_deref().unwrap_or_default())?;

        Ok(RunnerConfigOptions {
            name,
            labels,
            work: args.work.clone(),
            runner_group: args.runner_group.clone(),
            replace: args.replace,
            ephemeral: args.ephemeral,
            disable_update: args.disable_update,
            no_default_labels: args.no_default_labels,
            allow_run_as_root: args.allow_run_as_root,
        })
    }

    fn install_signal_handlers(&self) {
        let context = self.context.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, stopping");
                context.shutdown(ShutdownReason::UserCancelled);
            }
        });

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    let context = self.context.clone();
                    tokio::spawn(async move {
                        sigterm.recv().await;
                        tracing::info!("SIGTERM received, stopping");
                        context.shutdown(ShutdownReason::OperatingSystemShutdown);
                    });
                }
                Err(e) => self
                    .trace
                    .warning(&format!("Failed to listen for SIGTERM: {e}")),
            }
        }
    }
}

/// Host name with characters the runner rejects replaced by `-`.
fn default_runner_name() -> Result<String> {
    let host = hostname::get().context("Failed to read the host name")?;
    let name: String = host
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect();
    Ok(name)
}
