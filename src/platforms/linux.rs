use image::ImageFormat;
use image::imageops::FilterType;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backends::{AssociationBackend, Registration, Steps};
use crate::config::AssociationConfig;
use crate::error::{AssocError, FsContext, Result};
use crate::model::Platform;
use crate::tools::{REFRESH_TIMEOUT, ToolCall};

/// Edge of the installed MIME-type icon
const ICON_SIZE: u32 = 256;

pub struct LinuxBackend;

impl AssociationBackend for LinuxBackend {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn register(&self, registration: &Registration<'_>) -> Result<()> {
        let layout = DataLayout::new(data_home(registration.config)?);
        let config = registration.config;
        let mut steps = Steps::new(registration.log);

        steps.attempt("desktop entry", || {
            let content = desktop_entry(
                config,
                registration.executable,
                registration.icons.existing_app_icon(),
            );
            write_file(&layout.desktop_entry(config), &content)
        });

        steps.attempt("MIME definition", || {
            write_file(&layout.mime_package(config), &mime_package(config))
        });

        steps.attempt("file icon", || match registration.icons.existing_file_icon() {
            Some(source) => install_icon(source, &layout.mime_icon(config)),
            None => {
                registration.log.info("No file icon asset, skipping icon install");
                Ok(())
            }
        });

        for call in refresh_calls(&layout, config) {
            registration.run_optional(call);
        }

        steps.finish()
    }
}

/// Files under the XDG data home this backend writes to.
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn applications_dir(&self) -> PathBuf {
        self.root.join("applications")
    }

    pub fn mime_dir(&self) -> PathBuf {
        self.root.join("mime")
    }

    pub fn icon_theme_dir(&self) -> PathBuf {
        self.root.join("icons").join("hicolor")
    }

    pub fn desktop_entry(&self, config: &AssociationConfig) -> PathBuf {
        self.applications_dir()
            .join(format!("{}.desktop", config.app.desktop_id))
    }

    pub fn mime_package(&self, config: &AssociationConfig) -> PathBuf {
        self.mime_dir()
            .join("packages")
            .join(format!("{}.xml", config.app.desktop_id))
    }

    pub fn mime_icon(&self, config: &AssociationConfig) -> PathBuf {
        self.icon_theme_dir()
            .join(format!("{0}x{0}", ICON_SIZE))
            .join("mimetypes")
            .join(format!("{}.png", config.app.file_icon_name))
    }
}

fn data_home(config: &AssociationConfig) -> Result<PathBuf> {
    config
        .data_dir
        .clone()
        .or_else(dirs::data_dir)
        .ok_or(AssocError::NoHomeDirectory)
}

pub fn desktop_entry(config: &AssociationConfig, executable: &Path, app_icon: Option<&Path>) -> String {
    let file_type = &config.file_type;
    let app = &config.app;

    let icon = app_icon
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| app.desktop_id.clone());
    let categories: String = app.categories.iter().map(|c| format!("{};", c)).collect();

    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name={name}\n\
         Comment={comment}\n\
         Comment[{lang}]={localized}\n\
         Exec={exec} %f\n\
         Icon={icon}\n\
         MimeType={mime};\n\
         Categories={categories}\n\
         Terminal=false\n",
        name = app.name,
        comment = file_type.description,
        lang = file_type.localized_lang,
        localized = file_type.localized_description,
        exec = exec_argument(executable),
        icon = icon,
        mime = app.mime_type,
        categories = categories,
    )
}

/// Quote a path for an `Exec` key: argument quoting first, then the
/// key-file escaping of backslashes on top.
fn exec_argument(path: &Path) -> String {
    let quoted: String = path
        .to_string_lossy()
        .chars()
        .flat_map(|c| match c {
            '"' | '`' | '$' | '\\' => vec!['\\', c],
            c => vec![c],
        })
        .collect();
    format!("\"{}\"", quoted.replace('\\', "\\\\"))
}

pub fn mime_package(config: &AssociationConfig) -> String {
    let file_type = &config.file_type;
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mime-info xmlns="http://www.freedesktop.org/standards/shared-mime-info">
    <mime-type type="{mime}">
        <comment>{comment}</comment>
        <comment xml:lang="{lang}">{localized}</comment>
        <glob pattern="{glob}"/>
        <icon name="{icon}"/>
    </mime-type>
</mime-info>
"#,
        mime = xml_escape(&config.app.mime_type),
        comment = xml_escape(&file_type.description),
        lang = xml_escape(&file_type.localized_lang),
        localized = xml_escape(&file_type.localized_description),
        glob = xml_escape(&file_type.glob()),
        icon = xml_escape(&config.app.file_icon_name),
    )
}

fn xml_escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&apos;".to_string(),
            c => c.to_string(),
        })
        .collect()
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }
    fs::write(path, content).fs_context("writing file", path)
}

/// Copy `source` into the icon theme as a 256x256 PNG, resizing when it is
/// not one already. Non-square sources are stretched to fill the square.
/// Sources `image` cannot decode are copied verbatim.
fn install_icon(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).fs_context("creating icon directory", parent)?;
    }

    let is_png = ImageFormat::from_path(source).ok() == Some(ImageFormat::Png);
    match image::open(source) {
        Ok(img) if is_png && img.width() == ICON_SIZE && img.height() == ICON_SIZE => {
            fs::copy(source, target).fs_context("copying icon", target)?;
        }
        Ok(img) => {
            img.resize_exact(ICON_SIZE, ICON_SIZE, FilterType::Lanczos3)
                .save_with_format(target, ImageFormat::Png)?;
        }
        Err(_) => {
            fs::copy(source, target).fs_context("copying icon", target)?;
        }
    }
    Ok(())
}

fn refresh_calls(layout: &DataLayout, config: &AssociationConfig) -> Vec<ToolCall> {
    vec![
        ToolCall::new("update-mime-database")
            .arg(layout.mime_dir())
            .timeout(REFRESH_TIMEOUT),
        ToolCall::new("update-desktop-database")
            .arg(layout.applications_dir())
            .timeout(REFRESH_TIMEOUT),
        ToolCall::new("gtk-update-icon-cache")
            .arg("-f")
            .arg("-t")
            .arg(layout.icon_theme_dir())
            .timeout(REFRESH_TIMEOUT),
        ToolCall::new("xdg-mime")
            .arg("default")
            .arg(format!("{}.desktop", config.app.desktop_id))
            .arg(&config.app.mime_type)
            .timeout(REFRESH_TIMEOUT),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::Logger;
    use crate::model::IconPaths;
    use crate::tools::ToolOutcome;
    use crate::tools::fake::FakeTools;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: AssociationConfig,
        exe: PathBuf,
        icons: IconPaths,
        layout: DataLayout,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let share = dir.path().join("share");
        let assets = dir.path().join("opt").join("Assets");
        fs::create_dir_all(&assets).unwrap();

        let config = AssociationConfig {
            data_dir: Some(share.clone()),
            ..Default::default()
        };
        Fixture {
            exe: dir.path().join("opt").join("TuneLab"),
            icons: IconPaths::in_assets_dir(&assets, Platform::Linux),
            layout: DataLayout::new(share),
            config,
            _dir: dir,
        }
    }

    fn register(f: &Fixture, tools: &FakeTools) -> Result<()> {
        let log = Logger::disabled();
        LinuxBackend.register(&Registration {
            config: &f.config,
            icons: &f.icons,
            executable: &f.exe,
            tools,
            log: &log,
        })
    }

    #[test]
    fn test_desktop_entry_content() {
        let config = AssociationConfig::default();
        let entry = desktop_entry(&config, Path::new("/opt/tunelab/TuneLab"), None);

        assert!(entry.starts_with("[Desktop Entry]\n"));
        assert!(entry.contains("Exec=\"/opt/tunelab/TuneLab\" %f\n"));
        assert!(entry.contains("MimeType=application/x-tunelab-project;\n"));
        assert!(entry.contains("Categories=AudioVideo;Audio;\n"));
        assert!(entry.contains("Comment[zh_CN]=TuneLab 工程文件\n"));
        assert!(entry.contains("Icon=tunelab\n"));
        assert!(entry.contains("Terminal=false\n"));
    }

    #[test]
    fn test_exec_quoting() {
        assert_eq!(
            exec_argument(Path::new("/opt/My $App/run")),
            "\"/opt/My \\\\$App/run\""
        );
    }

    #[test]
    fn test_mime_package_content() {
        let xml = mime_package(&AssociationConfig::default());
        assert!(xml.contains(r#"<mime-type type="application/x-tunelab-project">"#));
        assert!(xml.contains(r#"<glob pattern="*.tlp"/>"#));
        assert!(xml.contains(r#"<comment xml:lang="zh_CN">TuneLab 工程文件</comment>"#));
        assert!(xml.contains(r#"<icon name="tunelab-file"/>"#));
    }

    #[test]
    fn test_mime_package_escapes_text() {
        let mut config = AssociationConfig::default();
        config.file_type.description = "Tune & <Lab>".to_string();
        let xml = mime_package(&config);
        assert!(xml.contains("<comment>Tune &amp; &lt;Lab&gt;</comment>"));
    }

    #[test]
    fn test_register_writes_all_files() {
        let f = fixture();
        image::RgbaImage::from_pixel(64, 64, image::Rgba([0, 0, 255, 255]))
            .save(&f.icons.file_icon)
            .unwrap();
        let tools = FakeTools::new();

        register(&f, &tools).unwrap();

        assert!(f.layout.desktop_entry(&f.config).is_file());
        assert!(f.layout.mime_package(&f.config).is_file());
        let icon = image::open(f.layout.mime_icon(&f.config)).unwrap();
        assert_eq!((icon.width(), icon.height()), (256, 256));
        assert_eq!(
            tools.programs(),
            vec![
                "update-mime-database",
                "update-desktop-database",
                "gtk-update-icon-cache",
                "xdg-mime",
            ]
        );
    }

    #[test]
    fn test_non_square_icon_fills_theme_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        let target = dir.path().join("256x256").join("mimetypes").join("wide.png");
        image::RgbaImage::from_pixel(512, 256, image::Rgba([200, 0, 0, 255]))
            .save(&source)
            .unwrap();

        install_icon(&source, &target).unwrap();

        let icon = image::open(&target).unwrap();
        assert_eq!((icon.width(), icon.height()), (ICON_SIZE, ICON_SIZE));
    }

    #[test]
    fn test_missing_icon_is_skipped() {
        let f = fixture();
        register(&f, &FakeTools::new()).unwrap();
        assert!(!f.layout.mime_icon(&f.config).exists());
    }

    #[test]
    fn test_second_run_overwrites() {
        let f = fixture();
        let tools = FakeTools::new();
        register(&f, &tools).unwrap();
        let first = fs::read_to_string(f.layout.desktop_entry(&f.config)).unwrap();
        register(&f, &tools).unwrap();

        let second = fs::read_to_string(f.layout.desktop_entry(&f.config)).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_dir(f.layout.applications_dir()).unwrap().count(), 1);
        assert_eq!(
            fs::read_dir(f.layout.mime_dir().join("packages")).unwrap().count(),
            1
        );
    }

    #[test]
    fn test_failed_step_does_not_block_the_rest() {
        let f = fixture();
        fs::create_dir_all(f.layout.mime_dir().parent().unwrap()).unwrap();
        // A file where the applications directory should be
        fs::write(f.layout.applications_dir(), "").unwrap();
        let tools = FakeTools::new().with("update-mime-database", |_| ToolOutcome::TimedOut);

        let result = register(&f, &tools);

        match result {
            Err(AssocError::Partial(failed)) => assert_eq!(failed, vec!["desktop entry"]),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(f.layout.mime_package(&f.config).is_file());
        assert_eq!(tools.programs().len(), 4);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_desktop_entry_parses() {
        use freedesktop_desktop_entry::DesktopEntry;

        let f = fixture();
        register(&f, &FakeTools::new()).unwrap();

        let path = f.layout.desktop_entry(&f.config);
        let content = fs::read_to_string(&path).unwrap();
        let entry = DesktopEntry::decode(&path, &content).unwrap();

        let exec = entry.exec().unwrap();
        assert!(exec.contains(&f.exe.display().to_string()));
        assert!(exec.ends_with("%f"));
        assert_eq!(entry.icon(), Some("tunelab"));
    }
}
