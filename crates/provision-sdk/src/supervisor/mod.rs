//! Readiness-gated process supervision.
//!
//! A [`Supervisor`] starts one child process, echoes its merged output line by
//! line, and watches for a readiness line. Two inactivity timeouts apply: a
//! long one while the process is not ready and a short one once it is. The
//! short silence after readiness is the success path; running out of the long
//! timeout, or the output closing before readiness, is a failure.

mod output;
mod readiness;
mod state;

pub use output::{ChildOutput, LineSource, NextLine};
pub use readiness::{ContainsText, MatchesPattern, ReadinessProbe};
pub use state::{MonitorState, Outcome, Phase, StreamEnd};

use crate::command_spec::CommandSpec;
use crate::process_termination::terminate_gracefully;
use crate::trace::TraceWriter;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default timeout while waiting for the first readiness line.
pub const DEFAULT_NOT_READY_TIMEOUT: Duration = Duration::from_secs(3600);
/// Default silence after readiness that counts as a settled start.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink for the pass-through transcript.
pub type EchoFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub not_ready_timeout: Duration,
    pub ready_timeout: Duration,
    /// Stop the child (SIGINT, SIGTERM, SIGKILL) when it fails to become ready.
    pub terminate_on_timeout: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            not_ready_timeout: DEFAULT_NOT_READY_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            terminate_on_timeout: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to start process '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read output of process {pid}: {source}")]
    Read {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Process '{program}' did not become ready: {outcome}")]
    TimedOut { program: String, outcome: Outcome },

    #[error("Supervision of process {pid} was cancelled before it became ready")]
    Cancelled { pid: u32, exit_code: i32 },
}

/// Drive `state` over `source` until the sequence ends.
///
/// Each line is echoed, then fed to `probe`; the new state's deadline bounds
/// the next read. The returned outcome carries the phase at the end.
pub async fn monitor<S>(
    source: &mut S,
    probe: &dyn ReadinessProbe,
    mut state: MonitorState,
    echo: &(dyn Fn(&str) + Send + Sync),
) -> io::Result<Outcome>
where
    S: LineSource + ?Sized,
{
    let mut lines_seen = 0u64;
    loop {
        match source.next_line(state.deadline()).await? {
            NextLine::Line(line) => {
                echo(&line);
                lines_seen += 1;

                let before = state.phase();
                state = state.observe(probe.is_ready(&line), Instant::now());
                if state.phase() != before {
                    tracing::debug!(from = %before, to = %state.phase(), "readiness phase changed");
                }
            }
            NextLine::Closed => return Ok(state.finish(StreamEnd::Closed, lines_seen)),
            NextLine::DeadlineElapsed => {
                return Ok(state.finish(StreamEnd::DeadlineElapsed, lines_seen))
            }
        }
    }
}

/// Starts a command and gates on its readiness.
pub struct Supervisor {
    options: SupervisorOptions,
    probe: Arc<dyn ReadinessProbe>,
    echo: EchoFn,
    trace: Arc<dyn TraceWriter>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        options: SupervisorOptions,
        probe: impl ReadinessProbe + 'static,
        trace: Arc<dyn TraceWriter>,
    ) -> Self {
        Self {
            options,
            probe: Arc::new(probe),
            echo: Arc::new(|line: &str| println!("{line}")),
            trace,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop waiting for readiness when `cancel` fires. The child is stopped
    /// gracefully and [`SupervisorError::Cancelled`] is returned.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the default stdout echo.
    pub fn with_echo(mut self, echo: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.echo = Arc::new(echo);
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Start `command` and return once it settled in the ready phase.
    ///
    /// On success the child keeps running; the returned [`ReadyProcess`]
    /// owns it together with the rest of its output.
    pub async fn supervise(&self, command: &CommandSpec) -> Result<ReadyProcess, SupervisorError> {
        let program = command.program().display().to_string();

        self.trace.info(&format!("Starting supervised process: {command}"));
        self.trace.info(&format!(
            "  Readiness: {}, not-ready timeout {:?}, ready timeout {:?}",
            self.probe.describe(),
            self.options.not_ready_timeout,
            self.options.ready_timeout
        ));

        let mut child = command
            .to_command()
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: program.clone(),
                source,
            })?;
        let pid = child.id().unwrap_or(0);
        self.trace.info(&format!("Process started with process id {pid}."));

        let mut output = ChildOutput::capture(&mut child, self.trace.clone());
        let state = MonitorState::new(
            self.options.not_ready_timeout,
            self.options.ready_timeout,
            Instant::now(),
        );

        let monitored = tokio::select! {
            result = monitor(&mut output, self.probe.as_ref(), state, self.echo.as_ref()) => Some(result),
            _ = self.cancel.cancelled() => None,
        };

        let outcome = match monitored {
            Some(Ok(outcome)) => outcome,
            None => {
                self.trace.info(&format!(
                    "Cancellation requested before process {pid} became ready, stopping it."
                ));
                let exit_code = terminate_gracefully(&mut child, false, self.trace.as_ref()).await;
                return Err(SupervisorError::Cancelled { pid, exit_code });
            }
            Some(Err(source)) => {
                terminate_gracefully(&mut child, true, self.trace.as_ref()).await;
                return Err(SupervisorError::Read { pid, source });
            }
        };

        if outcome.is_ready() {
            self.trace.info(&format!("Process {pid} is ready ({outcome})."));
            return Ok(ReadyProcess {
                child,
                output,
                pid,
                echo: self.echo.clone(),
                trace: self.trace.clone(),
            });
        }

        self.trace.error(&format!("Process {pid} did not become ready: {outcome}."));
        if self.options.terminate_on_timeout {
            let code = terminate_gracefully(&mut child, false, self.trace.as_ref()).await;
            self.trace.info(&format!("Process {pid} stopped with exit code {code}."));
        }
        Err(SupervisorError::TimedOut { program, outcome })
    }
}

/// A child that passed the readiness gate and is still owned by the caller.
///
/// The child keeps running only while its output is drained. Dropping this
/// value without calling [`follow`](Self::follow) or [`detach`](Self::detach)
/// closes the read end of its pipes, and the next write the child makes
/// fails with `EPIPE`/`SIGPIPE`.
pub struct ReadyProcess {
    child: Child,
    output: ChildOutput,
    pid: u32,
    echo: EchoFn,
    trace: Arc<dyn TraceWriter>,
}

impl ReadyProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Keep echoing output until the process exits and return its exit code.
    ///
    /// Cancelling `cancel` stops the process gracefully instead.
    pub async fn follow(mut self, cancel: CancellationToken) -> Result<i32, SupervisorError> {
        loop {
            tokio::select! {
                line = self.output.recv() => match line {
                    Some(Ok(line)) => (self.echo)(&line),
                    Some(Err(source)) => return Err(SupervisorError::Read { pid: self.pid, source }),
                    None => break,
                },
                _ = cancel.cancelled() => {
                    self.trace.info(&format!("Cancellation requested, stopping process {}.", self.pid));
                    let code = terminate_gracefully(&mut self.child, false, self.trace.as_ref()).await;
                    return Ok(code);
                }
            }
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|source| SupervisorError::Wait { pid: self.pid, source })?;
        let code = status.code().unwrap_or(-1);
        self.trace.info(&format!("Process {} exited with code {code}.", self.pid));
        Ok(code)
    }

    /// Drain the rest of the output on a background task.
    pub fn detach(self) -> JoinHandle<Result<i32, SupervisorError>> {
        tokio::spawn(self.follow(CancellationToken::new()))
    }
}
