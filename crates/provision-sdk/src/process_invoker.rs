use crate::command_spec::CommandSpec;
use crate::process_termination::terminate_gracefully;
use crate::supervisor::{ChildOutput, EchoFn};
use crate::trace::TraceWriter;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Error type for non-zero process exit codes.
#[derive(Debug, thiserror::Error)]
#[error("Exit code {exit_code} returned from process: file name '{file_name}', arguments '{arguments}'.")]
pub struct ProcessExitCodeError {
    pub exit_code: i32,
    pub file_name: String,
    pub arguments: String,
}

/// Runs a command to completion, echoing its merged output line by line.
///
/// Unlike the [`Supervisor`](crate::supervisor::Supervisor) there is no
/// readiness gate: the caller waits for the exit code.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
    echo: EchoFn,
}

impl ProcessInvoker {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        let echo_trace = trace.clone();
        Self {
            trace,
            echo: Arc::new(move |line: &str| echo_trace.info(line)),
        }
    }

    /// Send output lines somewhere other than the trace.
    pub fn with_echo(mut self, echo: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.echo = Arc::new(echo);
        self
    }

    /// Execute `command` and return its exit code.
    ///
    /// With `require_exit_code_zero` a non-zero exit becomes a
    /// [`ProcessExitCodeError`]. Cancelling `cancellation_token` stops the
    /// child (SIGINT, SIGTERM, SIGKILL) and returns an error.
    pub async fn execute(
        &self,
        command: &CommandSpec,
        require_exit_code_zero: bool,
        cancellation_token: CancellationToken,
    ) -> Result<i32> {
        self.trace.info("Starting process:");
        self.trace
            .info(&format!("  File name: '{}'", command.program().display()));
        self.trace
            .info(&format!("  Arguments: '{}'", command.get_args().join(" ")));
        if let Some(dir) = command.working_directory() {
            self.trace
                .info(&format!("  Working directory: '{}'", dir.display()));
        }
        self.trace.info(&format!(
            "  Require exit code zero: '{require_exit_code_zero}'"
        ));

        let start = std::time::Instant::now();
        let mut child = command
            .to_command()
            .spawn()
            .with_context(|| format!("Failed to start process '{command}'"))?;
        let pid = child.id().unwrap_or(0);
        self.trace
            .info(&format!("Process started with process id {pid}, waiting for process exit."));

        let mut output = ChildOutput::capture(&mut child, self.trace.clone());

        let mut cancelled = false;
        loop {
            tokio::select! {
                line = output.recv() => match line {
                    Some(Ok(line)) => (self.echo)(&line),
                    Some(Err(e)) => {
                        self.trace.warning(&format!("Output of process {pid} could not be read: {e}"));
                    }
                    None => break,
                },
                _ = cancellation_token.cancelled(), if !cancelled => {
                    self.trace.info("Cancellation requested.");
                    cancelled = true;
                    terminate_gracefully(&mut child, false, self.trace.as_ref()).await;
                    break;
                }
            }
        }

        let exit_code = child
            .wait()
            .await
            .context("Failed to wait for process")?
            .code()
            .unwrap_or(-1);

        self.trace.info(&format!(
            "Finished process {pid} with exit code {exit_code}, and elapsed time {:.2?}.",
            start.elapsed()
        ));

        if cancelled {
            anyhow::bail!("Process was cancelled");
        }

        if exit_code != 0 && require_exit_code_zero {
            return Err(ProcessExitCodeError {
                exit_code,
                file_name: command.program().display().to_string(),
                arguments: command.get_args().join(" "),
            }
            .into());
        }

        Ok(exit_code)
    }
}
