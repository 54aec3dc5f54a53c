use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AssocError, Result};
use crate::model::{AppIdentity, FileTypeDescriptor};

/// Everything the registrar needs to know up front. All fields default to
/// TuneLab's values, so a JSON config only has to name what differs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    pub file_type: FileTypeDescriptor,
    pub app: AppIdentity,
    /// Overrides `std::env::current_exe()`
    pub executable: Option<PathBuf>,
    /// Overrides `<exe dir>/Assets`
    pub assets_dir: Option<PathBuf>,
    /// Overrides the XDG data home (`~/.local/share`) on Linux
    pub data_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl AssociationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ext = &self.file_type.extension;
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(AssocError::config(format!(
                "extension must be a leading-dot name, got {:?}",
                ext
            )));
        }
        if ext.contains(['/', '\\']) || ext.chars().any(char::is_whitespace) {
            return Err(AssocError::config(format!(
                "extension contains invalid characters: {:?}",
                ext
            )));
        }
        if self.file_type.type_id.trim().is_empty() {
            return Err(AssocError::config("type id must not be empty"));
        }
        if !self.app.mime_type.contains('/') {
            return Err(AssocError::config(format!(
                "MIME type must look like media/subtype, got {:?}",
                self.app.mime_type
            )));
        }
        if self.app.desktop_id.trim().is_empty() {
            return Err(AssocError::config("desktop id must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AssociationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AssociationConfig::from_json(
            r#"{ "file_type": { "extension": ".demo" }, "data_dir": "/tmp/share" }"#,
        )
        .unwrap();
        assert_eq!(config.file_type.extension, ".demo");
        assert_eq!(config.file_type.type_id, "TuneLab.Project");
        assert_eq!(config.app.desktop_id, "tunelab");
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/share")));
    }

    #[test]
    fn test_extension_without_dot_is_rejected() {
        let err = AssociationConfig::from_json(r#"{ "file_type": { "extension": "tlp" } }"#)
            .unwrap_err();
        assert!(matches!(err, AssocError::Config(_)));
    }

    #[test]
    fn test_extension_with_separator_is_rejected() {
        let mut config = AssociationConfig::default();
        config.file_type.extension = "./x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_mime_type_is_rejected() {
        let mut config = AssociationConfig::default();
        config.app.mime_type = "tunelab".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let err = AssociationConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, AssocError::Json(_)));
    }
}
