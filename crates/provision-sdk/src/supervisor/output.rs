use crate::trace::TraceWriter;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Result of asking a line source for its next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextLine {
    Line(String),
    /// The stream ended.
    Closed,
    /// Nothing arrived before the deadline.
    DeadlineElapsed,
}

/// A lazy sequence of text lines read with a per-call deadline.
///
/// Implementations must be cancel safe: a read abandoned at the deadline
/// must not lose a line that arrives later.
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self, deadline: Instant) -> io::Result<NextLine>;
}

#[async_trait]
impl<R> LineSource for Lines<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self, deadline: Instant) -> io::Result<NextLine> {
        match tokio::time::timeout_at(deadline, Lines::next_line(self)).await {
            Ok(Ok(Some(line))) => Ok(NextLine::Line(line)),
            Ok(Ok(None)) => Ok(NextLine::Closed),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(NextLine::DeadlineElapsed),
        }
    }
}

/// The merged stdout + stderr of a child process, one line at a time.
///
/// Two reader tasks pump the pipes into a single channel; the sequence is
/// closed once both pipes reached end of file. Bytes that are not valid
/// UTF-8 are replaced rather than failing the read.
///
/// Order is kept within each pipe but not across them: a stderr line written
/// right after a stdout line may be delivered first.
pub struct ChildOutput {
    rx: mpsc::UnboundedReceiver<io::Result<String>>,
}

impl ChildOutput {
    /// Take the child's stdout and stderr pipes and start pumping them.
    ///
    /// Pipes that were not configured as `piped()` are skipped.
    pub fn capture(child: &mut Child, trace: Arc<dyn TraceWriter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, "STDOUT", tx.clone(), trace.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, "STDERR", tx, trace);
        }

        Self { rx }
    }

    /// Next line without a deadline. `None` once both pipes are closed.
    pub async fn recv(&mut self) -> Option<io::Result<String>> {
        self.rx.recv().await
    }
}

#[async_trait]
impl LineSource for ChildOutput {
    async fn next_line(&mut self, deadline: Instant) -> io::Result<NextLine> {
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(Ok(line))) => Ok(NextLine::Line(line)),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Ok(NextLine::Closed),
            Err(_) => Ok(NextLine::DeadlineElapsed),
        }
    }
}

fn spawn_reader<R>(
    pipe: R,
    name: &'static str,
    tx: mpsc::UnboundedSender<io::Result<String>>,
    trace: Arc<dyn TraceWriter>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(pipe).split(b'\n');
        loop {
            match segments.next_segment().await {
                Ok(Some(mut bytes)) => {
                    if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                    }
                    let line = String::from_utf8_lossy(&bytes).into_owned();
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    trace.warning(&format!("{name} read failed: {e}"));
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
        trace.verbose(&format!("{name} stream read finished."));
    });
}
