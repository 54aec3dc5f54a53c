//! Bounded invocation of external OS tools.
//!
//! Every backend leans on helper programs (`update-mime-database`, `sips`,
//! `lsregister`, ...) that may be absent, broken, or interactive. They all go
//! through [`ToolRunner`] so that a hung tool costs at most its timeout and a
//! missing one is just an outcome, not an error.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Database refreshers and association tools
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);
/// Single image resize
pub const RESIZE_TIMEOUT: Duration = Duration::from_secs(2);
/// Quick probes
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub program: String,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl ToolCall {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: REFRESH_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Value following `flag` in the argument list
    pub fn arg_after(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(OsString::as_os_str)
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Succeeded,
    /// Exited non-zero; `None` when killed by a signal
    Failed(Option<i32>),
    TimedOut,
    /// Program not found
    Missing,
    SpawnFailed(String),
}

impl ToolOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ToolOutcome::Succeeded)
    }
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutcome::Succeeded => write!(f, "succeeded"),
            ToolOutcome::Failed(Some(code)) => write!(f, "exited with status {}", code),
            ToolOutcome::Failed(None) => write!(f, "terminated by signal"),
            ToolOutcome::TimedOut => write!(f, "timed out"),
            ToolOutcome::Missing => write!(f, "not installed"),
            ToolOutcome::SpawnFailed(e) => write!(f, "could not be started: {}", e),
        }
    }
}

pub trait ToolRunner {
    /// Whether `program` can be found on PATH
    fn is_available(&self, program: &str) -> bool;

    /// Run to completion or until `call.timeout` elapses. Never blocks longer.
    fn run(&self, call: &ToolCall) -> ToolOutcome;
}

/// Runs real child processes with null stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTools;

impl ToolRunner for SystemTools {
    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn run(&self, call: &ToolCall) -> ToolOutcome {
        let mut child = match Command::new(&call.program)
            .args(&call.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => return ToolOutcome::Missing,
            Err(e) => return ToolOutcome::SpawnFailed(e.to_string()),
        };

        let deadline = Instant::now() + call.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return ToolOutcome::Succeeded,
                Ok(Some(status)) => return ToolOutcome::Failed(status.code()),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ToolOutcome::TimedOut;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return ToolOutcome::SpawnFailed(e.to_string());
                }
            }
        }
    }
}
