//! Spawning post-review and streaming its output.
//!
//! [`Launcher`] is the seam between the engine and the operating system. The
//! engine only needs stdout lines and an exit code, so tests substitute a
//! scripted launcher without spawning anything.

use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::Invocation;

/// How long a terminated child gets to exit before it is killed outright.
const TERM_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Failures running the external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error talking to post-review: {0}")]
    Io(#[from] io::Error),

    #[error("post-review did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Starts the external tool.
pub trait Launcher {
    fn launch(&self, invocation: &Invocation) -> Result<Box<dyn RunningTool>, ToolError>;
}

/// A started tool whose output is being read.
pub trait RunningTool {
    /// Next stdout line without its terminator, or `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<String>, ToolError>;

    /// Drain remaining output, wait for exit, and return the exit code.
    ///
    /// A process killed by a signal reports `-1`.
    fn finish(self: Box<Self>) -> Result<i32, ToolError>;
}

/// Launches real processes with an optional overall deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher {
    timeout: Option<Duration>,
}

impl ProcessLauncher {
    #[must_use]
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<Box<dyn RunningTool>, ToolError> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| {
                let program = match which::which(&invocation.program) {
                    Ok(_) => invocation.program.clone(),
                    Err(e) => format!("{} (not found: {e})", invocation.program),
                };
                ToolError::Spawn { program, source }
            })?;

        // Nothing is written; a credential prompt reads EOF instead of hanging.
        drop(child.stdin.take());

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::Io(io::Error::other("stdout was not captured")));
        };

        let (tx, lines) = mpsc::channel();
        let reader = thread::spawn(move || pump_lines(stdout, &tx));

        tracing::trace!(pid = child.id(), "Started post-review");

        Ok(Box::new(ChildTool {
            child,
            lines,
            reader: Some(reader),
            deadline: self.timeout.map(|t| Instant::now() + t),
            timeout: self.timeout.unwrap_or_default(),
            reaped: false,
        }))
    }
}

fn pump_lines(stdout: ChildStdout, tx: &mpsc::Sender<io::Result<String>>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

struct ChildTool {
    child: Child,
    lines: Receiver<io::Result<String>>,
    reader: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
    timeout: Duration,
    reaped: bool,
}

impl ChildTool {
    fn timed_out(&mut self) -> ToolError {
        tracing::warn!(
            pid = self.child.id(),
            timeout_secs = self.timeout.as_secs(),
            "post-review timed out, terminating"
        );
        self.terminate();
        ToolError::TimedOut(self.timeout)
    }

    /// Ask the child to exit, then kill it if it lingers.
    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Ok(pid) = i32::try_from(self.child.id()) {
                let _ = signal::kill(Pid::from_raw(pid), Signal::SIGTERM);
                let grace = Instant::now() + TERM_GRACE;
                while Instant::now() < grace {
                    if matches!(self.child.try_wait(), Ok(Some(_)) | Err(_)) {
                        self.reaped = true;
                        return;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
        self.reaped = true;
    }

    fn wait_for_exit(&mut self) -> Result<i32, ToolError> {
        let status = match self.deadline {
            None => self.child.wait()?,
            Some(deadline) => loop {
                if let Some(status) = self.child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    return Err(self.timed_out());
                }
                thread::sleep(POLL_INTERVAL);
            },
        };
        self.reaped = true;
        Ok(status.code().unwrap_or(-1))
    }
}

impl RunningTool for ChildTool {
    fn next_line(&mut self) -> Result<Option<String>, ToolError> {
        let received = match self.deadline {
            None => self.lines.recv().ok(),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.lines.recv_timeout(remaining) {
                    Ok(line) => Some(line),
                    Err(RecvTimeoutError::Disconnected) => None,
                    Err(RecvTimeoutError::Timeout) => return Err(self.timed_out()),
                }
            }
        };

        match received {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(ToolError::Io(e)),
            None => Ok(None),
        }
    }

    fn finish(mut self: Box<Self>) -> Result<i32, ToolError> {
        while let Some(line) = self.next_line()? {
            tracing::debug!(">> {line}");
        }
        let code = self.wait_for_exit()?;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        Ok(code)
    }
}

impl Drop for ChildTool {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
