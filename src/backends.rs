use std::path::Path;

use crate::config::AssociationConfig;
use crate::error::{AssocError, Result};
use crate::logs::Logger;
use crate::model::{IconPaths, Platform};
use crate::tools::{ToolCall, ToolOutcome, ToolRunner};

#[path = "platforms/windows.rs"]
pub mod windows;

#[path = "platforms/macos.rs"]
pub mod macos;

#[path = "platforms/linux.rs"]
pub mod linux;

/// Inputs of one registration attempt.
pub struct Registration<'a> {
    pub config: &'a AssociationConfig,
    pub icons: &'a IconPaths,
    pub executable: &'a Path,
    pub tools: &'a dyn ToolRunner,
    pub log: &'a Logger,
}

impl Registration<'_> {
    /// Run a tool whose absence or failure is expected on some systems.
    /// Nothing it does is an error: failures are noted at INFO, absence not
    /// at all.
    pub fn run_optional(&self, call: ToolCall) -> ToolOutcome {
        let outcome = self.tools.run(&call);
        match &outcome {
            ToolOutcome::Succeeded => self.log.info(&format!("Ran {}", call)),
            ToolOutcome::Missing => {}
            other => self.log.info(&format!("{} {}, ignoring", call.program, other)),
        }
        outcome
    }
}

pub trait AssociationBackend {
    fn platform(&self) -> Platform;

    fn register(&self, registration: &Registration<'_>) -> Result<()>;
}

pub fn backend_for(platform: Platform) -> Box<dyn AssociationBackend> {
    match platform {
        Platform::Windows => Box::new(windows::WindowsBackend),
        Platform::Linux => Box::new(linux::LinuxBackend),
        Platform::MacOs => Box::new(macos::MacBackend),
    }
}

/// Runs independent step groups, logging each failure and carrying on.
pub struct Steps<'a> {
    log: &'a Logger,
    failed: Vec<&'static str>,
}

impl<'a> Steps<'a> {
    pub fn new(log: &'a Logger) -> Self {
        Self {
            log,
            failed: Vec::new(),
        }
    }

    pub fn attempt<T>(&mut self, step: &'static str, f: impl FnOnce() -> Result<T>) -> Option<T> {
        match f() {
            Ok(value) => Some(value),
            Err(e) => {
                self.log.error(&format!("{} failed: {}", step, e));
                self.failed.push(step);
                None
            }
        }
    }

    pub fn finish(self) -> Result<()> {
        if self.failed.is_empty() {
            Ok(())
        } else {
            Err(AssocError::Partial(self.failed))
        }
    }
}
