use std::fs::{File, metadata};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const SIZE_WARNING_BYTES: u64 = 5 * 1024 * 1024;

/// Append-only file log. Writing never fails loudly: registration runs at
/// startup and a broken log must not take the host down with it.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    file: Option<PathBuf>,
}

impl Logger {
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { file: None }
    }

    /// Log file under the per-user location the OS expects for `app_name`.
    pub fn for_app(app_name: &str) -> Self {
        match default_log_file(app_name) {
            Some(path) => Self::to_file(path),
            None => Self::disabled(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn info(&self, msg: &str) {
        self.write("INFO", msg);
    }

    pub fn warn(&self, msg: &str) {
        self.write("WARN", msg);
    }

    pub fn error(&self, msg: &str) {
        self.write("ERROR", msg);
    }

    fn write(&self, level: &str, msg: &str) {
        let Some(log_file) = &self.file else {
            return;
        };

        if let Some(parent) = log_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let log_entry = format!("[{}] {}: {}\n", timestamp, level, msg);

        let _ = append(log_file, &log_entry);

        if let Ok(size) = metadata(log_file).map(|m| m.len()) {
            if size > SIZE_WARNING_BYTES {
                let warning = format!(
                    "[{}] WARN: Log file is {:.1} MiB. Consider clearing it\n",
                    timestamp,
                    size as f64 / 1_048_576.0
                );
                let _ = append(log_file, &warning);
            }
        }
    }

    /// Last `lines` entries of the log, oldest first.
    pub fn recent(&self, lines: usize) -> std::io::Result<Vec<String>> {
        let Some(log_file) = self.file.as_ref().filter(|p| p.exists()) else {
            return Ok(Vec::new());
        };

        let reader = BufReader::new(File::open(log_file)?);
        let all_lines: Vec<String> = reader.lines().collect::<Result<Vec<_>, _>>()?;

        let start = all_lines.len().saturating_sub(lines);
        Ok(all_lines[start..].to_vec())
    }

    pub fn clear(&self) -> std::io::Result<()> {
        match &self.file {
            Some(log_file) if log_file.exists() => std::fs::write(log_file, ""),
            _ => Ok(()),
        }
    }
}

fn append(path: &Path, entry: &str) -> std::io::Result<()> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(entry.as_bytes()))
}

fn default_log_file(app_name: &str) -> Option<PathBuf> {
    let dir_name = app_name.to_lowercase();

    #[cfg(target_os = "macos")]
    let base = dirs::home_dir().map(|home| home.join("Library").join("Logs"));

    #[cfg(not(target_os = "macos"))]
    let base = dirs::data_dir();

    base.map(|base| base.join(&dir_name).join(format!("{}.log", dir_name)))
}
