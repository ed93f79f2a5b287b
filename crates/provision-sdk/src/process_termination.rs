// Graceful stop of a child process: SIGINT, then SIGTERM, then SIGKILL.

use crate::trace::TraceWriter;
use std::time::Duration;
use tokio::process::Child;

/// How long to wait after SIGINT before escalating to SIGTERM.
pub const SIGINT_TIMEOUT: Duration = Duration::from_millis(7500);
/// How long to wait after SIGTERM before escalating to SIGKILL.
pub const SIGTERM_TIMEOUT: Duration = Duration::from_millis(2500);

/// Stop `child` and reap it, returning its exit code (`-1` when killed by a
/// signal or when the status could not be read).
///
/// With `kill_immediately` the signal steps are skipped.
pub async fn terminate_gracefully(
    child: &mut Child,
    kill_immediately: bool,
    trace: &dyn TraceWriter,
) -> i32 {
    if !kill_immediately {
        if send_signal_and_wait(child, Signal::Int, SIGINT_TIMEOUT, trace).await {
            trace.info("Process stopped through SIGINT.");
            return reap(child).await;
        }

        if send_signal_and_wait(child, Signal::Term, SIGTERM_TIMEOUT, trace).await {
            trace.info("Process stopped through SIGTERM.");
            return reap(child).await;
        }
    }

    trace.info("Killing process since both interrupt and terminate signals were ignored.");
    if let Err(e) = child.kill().await {
        trace.warning(&format!("Failed to kill process: {e}"));
    }
    reap(child).await
}

async fn reap(child: &mut Child) -> i32 {
    child
        .wait()
        .await
        .map(|s| s.code().unwrap_or(-1))
        .unwrap_or(-1)
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Int,
    Term,
}

/// Returns `true` if the process exited within `timeout`.
#[cfg(unix)]
async fn send_signal_and_wait(
    child: &mut Child,
    signal: Signal,
    timeout: Duration,
    trace: &dyn TraceWriter,
) -> bool {
    let pid = match child.id() {
        Some(id) => id,
        None => return true,
    };

    let sig = match signal {
        Signal::Int => nix::sys::signal::Signal::SIGINT,
        Signal::Term => nix::sys::signal::Signal::SIGTERM,
    };

    trace.info(&format!("Sending {sig:?} to process {pid}."));
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), sig).is_err() {
        trace.info(&format!("{sig:?} could not be delivered to process {pid}."));
        return false;
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(result) => result.is_ok(),
        Err(_) => {
            trace.info(&format!(
                "Process {pid} did not honor {sig:?} within {:.1}s.",
                timeout.as_secs_f64()
            ));
            false
        }
    }
}

#[cfg(not(unix))]
async fn send_signal_and_wait(
    child: &mut Child,
    _signal: Signal,
    timeout: Duration,
    _trace: &dyn TraceWriter,
) -> bool {
    // No POSIX signals here; give the process a chance to exit on its own.
    matches!(tokio::time::timeout(timeout, child.wait()).await, Ok(Ok(_)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::trace::{CollectingTraceWriter, TraceLevel};
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn sigint_stops_a_sleeping_process() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let trace = CollectingTraceWriter::new();

        let code = terminate_gracefully(&mut child, false, &trace).await;

        assert_eq!(code, -1, "signal termination has no exit code");
        assert!(trace.contains(TraceLevel::Info, "SIGINT"));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn kill_immediately_skips_signals() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let trace = CollectingTraceWriter::new();

        terminate_gracefully(&mut child, true, &trace).await;

        assert!(!trace.contains(TraceLevel::Info, "Sending"));
        assert!(trace.contains(TraceLevel::Info, "Killing process"));
    }

    #[tokio::test]
    async fn already_exited_process_is_reaped() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();
        let trace = CollectingTraceWriter::new();

        let code = terminate_gracefully(&mut child, false, &trace).await;
        assert_eq!(code, 0);
    }
}
