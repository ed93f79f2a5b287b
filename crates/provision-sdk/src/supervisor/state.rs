use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// What the monitor believes about the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotReady,
    Ready,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::NotReady => write!(f, "not ready"),
            Phase::Ready => write!(f, "ready"),
        }
    }
}

/// How the output line sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The process closed its output (usually because it exited).
    Closed,
    /// No line arrived before the current deadline.
    DeadlineElapsed,
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Closed => write!(f, "output closed"),
            StreamEnd::DeadlineElapsed => write!(f, "no output before the deadline"),
        }
    }
}

/// Result of one supervision pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub final_phase: Phase,
    pub end: StreamEnd,
    pub lines_seen: u64,
    /// Timeout that was armed when the sequence ended.
    pub timeout: Duration,
}

impl Outcome {
    pub fn is_ready(&self) -> bool {
        self.final_phase == Phase::Ready
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} while {} after {} line(s)",
            self.end, self.final_phase, self.lines_seen
        )?;
        if self.end == StreamEnd::DeadlineElapsed {
            write!(f, " ({:.0?} timeout)", self.timeout)?;
        }
        Ok(())
    }
}

/// Phase plus the single active deadline.
///
/// Every observed line produces a new state whose deadline is
/// `now + timeout(phase)`. A matching line moves to `Ready`; any other line
/// moves back to `NotReady`, even after readiness was reached once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorState {
    phase: Phase,
    deadline: Instant,
    not_ready_timeout: Duration,
    ready_timeout: Duration,
}

impl MonitorState {
    /// Start in `NotReady` with the long timeout armed.
    pub fn new(not_ready_timeout: Duration, ready_timeout: Duration, now: Instant) -> Self {
        Self {
            phase: Phase::NotReady,
            deadline: deadline_after(now, not_ready_timeout),
            not_ready_timeout,
            ready_timeout,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Timeout belonging to the current phase.
    pub fn current_timeout(&self) -> Duration {
        self.timeout_for(self.phase)
    }

    /// Advance on one output line. `line_is_ready` is the probe's verdict.
    #[must_use]
    pub fn observe(self, line_is_ready: bool, now: Instant) -> Self {
        let phase = if line_is_ready {
            Phase::Ready
        } else {
            Phase::NotReady
        };
        Self {
            phase,
            deadline: deadline_after(now, self.timeout_for(phase)),
            ..self
        }
    }

    /// Close the pass: the phase at this instant decides the outcome.
    pub fn finish(self, end: StreamEnd, lines_seen: u64) -> Outcome {
        Outcome {
            final_phase: self.phase,
            end,
            lines_seen,
            timeout: self.current_timeout(),
        }
    }

    fn timeout_for(&self, phase: Phase) -> Duration {
        match phase {
            Phase::NotReady => self.not_ready_timeout,
            Phase::Ready => self.ready_timeout,
        }
    }
}

fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}
