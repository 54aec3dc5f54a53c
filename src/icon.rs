//! PNG → `.icns` through the macOS `sips` and `iconutil` tools.

use icns::IconFamily;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AssocError, FsContext, Result};
use crate::logs::Logger;
use crate::tools::{REFRESH_TIMEOUT, RESIZE_TIMEOUT, ToolCall, ToolRunner};

pub const ICONSET_SIZES: [u32; 5] = [16, 32, 128, 256, 512];
pub const ICONSET_SCALES: [u32; 2] = [1, 2];

/// One image of an iconset: a point size at a scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconsetEntry {
    pub size: u32,
    pub scale: u32,
}

impl IconsetEntry {
    pub fn pixels(self) -> u32 {
        self.size * self.scale
    }

    /// Name `iconutil` expects, e.g. `icon_128x128@2x.png`
    pub fn file_name(self) -> String {
        match self.scale {
            1 => format!("icon_{0}x{0}.png", self.size),
            scale => format!("icon_{0}x{0}@{1}x.png", self.size, scale),
        }
    }
}

pub fn iconset_entries() -> impl Iterator<Item = IconsetEntry> {
    ICONSET_SIZES.into_iter().flat_map(|size| {
        ICONSET_SCALES
            .into_iter()
            .map(move |scale| IconsetEntry { size, scale })
    })
}

pub struct IconConverter<'a> {
    tools: &'a dyn ToolRunner,
    log: &'a Logger,
}

impl<'a> IconConverter<'a> {
    pub fn new(tools: &'a dyn ToolRunner, log: &'a Logger) -> Self {
        Self { tools, log }
    }

    /// Write a multi-resolution `.icns` for `source` to `target`.
    ///
    /// Sizes that fail to resize are left out. The temporary iconset is
    /// removed whatever happens; on error `target` does not exist.
    pub fn convert(&self, source: &Path, target: &Path) -> Result<()> {
        if let Ok((width, height)) = image::image_dimensions(source) {
            if width != height {
                self.log.warn(&format!(
                    "Icon {} is {}x{}, it will be stretched to square",
                    source.display(),
                    width,
                    height
                ));
            }
        }

        let iconset = IconsetDir::create()?;

        let resized = iconset_entries()
            .filter(|entry| {
                let px = entry.pixels().to_string();
                let resize = ToolCall::new("sips")
                    .arg("-z")
                    .arg(&px)
                    .arg(&px)
                    .arg(source)
                    .arg("--out")
                    .arg(iconset.path().join(entry.file_name()))
                    .timeout(RESIZE_TIMEOUT);
                self.tools.run(&resize).succeeded()
            })
            .count();
        self.log.info(&format!(
            "Resized {} of {} iconset images",
            resized,
            ICONSET_SIZES.len() * ICONSET_SCALES.len()
        ));

        let packer = ToolCall::new("iconutil")
            .arg("-c")
            .arg("icns")
            .arg(iconset.path())
            .arg("-o")
            .arg(target)
            .timeout(REFRESH_TIMEOUT);
        let outcome = self.tools.run(&packer);

        if !outcome.succeeded() {
            let _ = fs::remove_file(target);
            return Err(AssocError::icon(format!("iconutil {}", outcome)));
        }

        if !is_valid_icns(target) {
            let _ = fs::remove_file(target);
            return Err(AssocError::icon(format!(
                "iconutil produced no readable icon at {}",
                target.display()
            )));
        }

        Ok(())
    }
}

fn is_valid_icns(path: &Path) -> bool {
    path.metadata().map(|m| m.len() > 0).unwrap_or(false)
        && File::open(path)
            .ok()
            .and_then(|f| IconFamily::read(BufReader::new(f)).ok())
            .is_some()
}

/// Scratch `.iconset` directory, deleted on drop.
struct IconsetDir(PathBuf);

impl IconsetDir {
    fn create() -> Result<Self> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "fileassoc-{}-{}-{}.iconset",
            std::process::id(),
            nanos,
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        fs::create_dir_all(&path).fs_context("creating iconset directory", &path)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for IconsetDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::working_icon_tools;
    use super::*;
    use crate::tools::ToolOutcome;
    use crate::tools::fake::FakeTools;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn source_png(dir: &Path) -> PathBuf {
        let path = dir.join("file.png");
        image::RgbaImage::from_pixel(64, 64, image::Rgba([200, 40, 40, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_iconset_covers_sizes_and_scales() {
        let entries: Vec<_> = iconset_entries().collect();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].file_name(), "icon_16x16.png");
        assert_eq!(entries[1].file_name(), "icon_16x16@2x.png");
        assert_eq!(entries[1].pixels(), 32);
        assert_eq!(entries[9].pixels(), 1024);
    }

    #[test]
    fn test_working_tools_produce_icns_and_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_png(dir.path());
        let target = dir.path().join("Doc.icns");
        let seen = Rc::new(RefCell::new(None));
        let tools = working_icon_tools(Rc::clone(&seen));
        let log = Logger::disabled();

        IconConverter::new(&tools, &log).convert(&source, &target).unwrap();

        assert!(target.metadata().unwrap().len() > 0);
        assert_eq!(tools.calls_to("sips").len(), 10);

        let (iconset, count) = seen.borrow().clone().unwrap();
        assert_eq!(count, 10);
        assert!(iconset.to_string_lossy().ends_with(".iconset"));
        assert!(!iconset.exists());
    }

    #[test]
    fn test_missing_tools_fail_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_png(dir.path());
        let target = dir.path().join("Doc.icns");
        let tools = FakeTools::new();
        let log = Logger::disabled();

        let err = IconConverter::new(&tools, &log)
            .convert(&source, &target)
            .unwrap_err();

        assert!(matches!(err, AssocError::Icon(_)));
        assert!(!target.exists());
        assert_eq!(tools.programs().last().map(String::as_str), Some("iconutil"));
    }

    #[test]
    fn test_unreadable_packer_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_png(dir.path());
        let target = dir.path().join("Doc.icns");
        let tools = FakeTools::new().with("iconutil", |call| {
            let out = call.arg_after("-o").unwrap();
            fs::write(out, b"not an icon").unwrap();
            ToolOutcome::Succeeded
        });
        let log = Logger::disabled();

        assert!(IconConverter::new(&tools, &log).convert(&source, &target).is_err());
        assert!(!target.exists());
    }
}
