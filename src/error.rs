//! Error type shared by every registration step.
//!
//! Nothing here ever reaches the host application: the registrar turns each
//! error into a log line. The variants exist so that log line says what
//! failed and where.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssocError {
    /// Filesystem errors, with the path being touched
    #[error("{context} ({}): {source}", .path.display())]
    Fs {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Registry writes (Windows)
    #[error("Registry error at {key}: {source}")]
    Registry {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Property list error: {0}")]
    Plist(#[from] plist::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Native icon packing failed; callers fall back to a plain copy
    #[error("Icon conversion failed: {0}")]
    Icon(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot resolve executable path: {0}")]
    NoExecutable(String),

    #[error("Cannot resolve home directory")]
    NoHomeDirectory,

    #[error("Platform not supported: {0}")]
    Unsupported(&'static str),

    /// Some independent step groups failed; the rest went through
    #[error("Registration incomplete, failed steps: {}", .0.join(", "))]
    Partial(Vec<&'static str>),
}

impl AssocError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn icon(msg: impl Into<String>) -> Self {
        Self::Icon(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AssocError>;

/// Attach the path and an action to an `io::Error`.
pub trait FsContext<T> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> FsContext<T> for io::Result<T> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| AssocError::Fs {
            context,
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}
