use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::backends::{AssociationBackend, Registration, backend_for};
use crate::config::AssociationConfig;
use crate::error::{AssocError, Result};
use crate::logs::Logger;
use crate::model::{IconPaths, Platform};
use crate::tools::{SystemTools, ToolRunner};

/// Registers the configured file type with the running OS.
///
/// [`Registrar::register`] is the startup entrypoint: it never fails and
/// never panics outward, every problem ends up in the log. Use
/// [`Registrar::try_register`] to see the error instead.
pub struct Registrar<T: ToolRunner = SystemTools> {
    config: AssociationConfig,
    tools: T,
    log: Logger,
}

impl Registrar {
    pub fn new(config: AssociationConfig) -> Self {
        let log = match &config.log_file {
            Some(path) => Logger::to_file(path),
            None => Logger::for_app(&config.app.name),
        };
        Self {
            config,
            tools: SystemTools,
            log,
        }
    }
}

impl<T: ToolRunner> Registrar<T> {
    pub fn with_tools<U: ToolRunner>(self, tools: U) -> Registrar<U> {
        Registrar {
            config: self.config,
            tools,
            log: self.log,
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.log
    }

    pub fn register(&self) {
        match Platform::current() {
            Some(platform) => self.register_with(backend_for(platform).as_ref()),
            None => self.log.error(&format!(
                "File association not supported on {}",
                std::env::consts::OS
            )),
        }
    }

    /// [`Registrar::register`] with a chosen backend.
    pub fn register_with(&self, backend: &dyn AssociationBackend) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_register_with(backend))) {
            Ok(Ok(())) => self.log.info(&format!(
                "File association for {} registered on {}",
                self.config.file_type.extension,
                backend.platform().name()
            )),
            Ok(Err(e)) => self
                .log
                .error(&format!("Failed to register file association: {}", e)),
            Err(_) => self
                .log
                .error("File association registration panicked"),
        }
    }

    pub fn try_register(&self) -> Result<Platform> {
        let platform =
            Platform::current().ok_or(AssocError::Unsupported(std::env::consts::OS))?;
        self.try_register_with(backend_for(platform).as_ref())?;
        Ok(platform)
    }

    /// Run one specific backend instead of the one for this OS.
    pub fn try_register_with(&self, backend: &dyn AssociationBackend) -> Result<()> {
        self.config.validate()?;
        let executable = self.resolve_executable()?;
        let assets_dir = self.config.assets_dir.clone().unwrap_or_else(|| {
            executable
                .parent()
                .map(|dir| dir.join("Assets"))
                .unwrap_or_else(|| PathBuf::from("Assets"))
        });
        let icons = IconPaths::in_assets_dir(&assets_dir, backend.platform());

        self.log.info(&format!(
            "Registering {} for {} on {}",
            self.config.file_type.extension,
            executable.display(),
            backend.platform().name()
        ));

        backend.register(&Registration {
            config: &self.config,
            icons: &icons,
            executable: &executable,
            tools: &self.tools,
            log: &self.log,
        })
    }

    fn resolve_executable(&self) -> Result<PathBuf> {
        match &self.config.executable {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().map_err(|e| AssocError::NoExecutable(e.to_string())),
        }
    }
}

/// Register the default TuneLab project type. Safe to call on every startup.
pub fn register_file_association() {
    Registrar::new(AssociationConfig::default()).register();
}
