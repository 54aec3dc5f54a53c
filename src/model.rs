use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The one document type the application claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTypeDescriptor {
    /// Leading-dot extension, e.g. `.tlp`
    pub extension: String,
    /// Registry ProgID / type key
    pub type_id: String,
    pub description: String,
    pub localized_description: String,
    /// Language tag for `localized_description`
    pub localized_lang: String,
}

impl Default for FileTypeDescriptor {
    fn default() -> Self {
        Self {
            extension: ".tlp".to_string(),
            type_id: "TuneLab.Project".to_string(),
            description: "TuneLab Project".to_string(),
            localized_description: "TuneLab 工程文件".to_string(),
            localized_lang: "zh_CN".to_string(),
        }
    }
}

impl FileTypeDescriptor {
    /// Extension without the leading dot
    pub fn bare_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Shell glob matching the extension, e.g. `*.tlp`
    pub fn glob(&self) -> String {
        format!("*.{}", self.bare_extension())
    }
}

/// How the application presents itself to each desktop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppIdentity {
    pub name: String,
    /// Base name of the desktop entry and MIME package files
    pub desktop_id: String,
    pub mime_type: String,
    /// Icon theme name for documents of this type
    pub file_icon_name: String,
    pub categories: Vec<String>,
    /// Used whenever the bundle manifest has no identifier
    pub default_bundle_id: String,
    pub version: String,
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            name: "TuneLab".to_string(),
            desktop_id: "tunelab".to_string(),
            mime_type: "application/x-tunelab-project".to_string(),
            file_icon_name: "tunelab-file".to_string(),
            categories: vec!["AudioVideo".to_string(), "Audio".to_string()],
            default_bundle_id: "com.tunelab.app".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// Source icon assets. Either may be missing; icon steps are then skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconPaths {
    pub app_icon: PathBuf,
    pub file_icon: PathBuf,
}

impl IconPaths {
    /// `app.ico`/`file.ico` for Windows, `app.png`/`file.png` everywhere else.
    pub fn in_assets_dir(assets_dir: &Path, platform: Platform) -> Self {
        let ext = match platform {
            Platform::Windows => "ico",
            Platform::Linux | Platform::MacOs => "png",
        };
        Self {
            app_icon: assets_dir.join(format!("app.{}", ext)),
            file_icon: assets_dir.join(format!("file.{}", ext)),
        }
    }

    pub fn existing_app_icon(&self) -> Option<&Path> {
        Some(self.app_icon.as_path()).filter(|p| p.is_file())
    }

    pub fn existing_file_icon(&self) -> Option<&Path> {
        Some(self.file_icon.as_path()).filter(|p| p.is_file())
    }
}

/// An application bundle found around the running executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    pub bundle_dir: PathBuf,
    pub bundle_id: String,
    pub executable_name: String,
}

impl BundleDescriptor {
    pub fn contents_dir(&self) -> PathBuf {
        self.bundle_dir.join("Contents")
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.contents_dir().join("Resources")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.contents_dir().join("Info.plist")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    /// The OS family this binary was built for, if it is one we handle.
    pub fn current() -> Option<Self> {
        if cfg!(windows) {
            Some(Platform::Windows)
        } else if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
        }
    }
}
