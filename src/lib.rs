//! Registers a desktop application as the handler for its project file type.
//!
//! One backend per OS family: registry classes on Windows, desktop entry and
//! shared-mime-info on Linux, `Info.plist` plus Launch Services on macOS.
//! Registration is best-effort and meant to run at every startup:
//!
//! ```no_run
//! use fileassoc::{AssociationConfig, Registrar};
//!
//! Registrar::new(AssociationConfig::default()).register();
//! ```

pub mod backends;
pub mod bundle;
pub mod config;
pub mod error;
pub mod icon;
pub mod logs;
pub mod model;
pub mod registrar;
pub mod tools;

pub use backends::{AssociationBackend, Registration};
pub use config::AssociationConfig;
pub use error::{AssocError, Result};
pub use logs::Logger;
pub use model::{AppIdentity, BundleDescriptor, FileTypeDescriptor, IconPaths, Platform};
pub use registrar::{Registrar, register_file_association};
pub use tools::{SystemTools, ToolCall, ToolOutcome, ToolRunner};
