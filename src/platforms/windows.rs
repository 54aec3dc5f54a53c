use std::path::Path;

use crate::backends::{AssociationBackend, Registration};
use crate::error::Result;
use crate::model::{FileTypeDescriptor, Platform};

#[cfg(windows)]
use crate::error::AssocError;
#[cfg(windows)]
use winreg::{RegKey, enums::*};

#[cfg(windows)]
const CLASSES_ROOT: &str = "Software\\Classes";

/// One default (unnamed) value under `HKCU\Software\Classes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub key: String,
    pub value: String,
}

/// Where the entries go. The real one is the user's registry hive.
pub trait ClassesHive {
    fn set_default(&mut self, key: &str, value: &str) -> Result<()>;
}

pub struct WindowsBackend;

impl AssociationBackend for WindowsBackend {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn register(&self, registration: &Registration<'_>) -> Result<()> {
        let entries = registry_entries(
            &registration.config.file_type,
            registration.icons.existing_file_icon(),
            registration.executable,
        );

        write_to_user_hive(&entries)?;

        registration.log.info(&format!(
            "Wrote {} registry keys for {}",
            entries.len(),
            registration.config.file_type.extension
        ));
        Ok(())
    }
}

pub fn registry_entries(
    file_type: &FileTypeDescriptor,
    file_icon: Option<&Path>,
    executable: &Path,
) -> Vec<RegistryEntry> {
    let type_id = &file_type.type_id;
    let entry = |key: String, value: String| RegistryEntry { key, value };

    let mut entries = vec![
        entry(file_type.extension.clone(), type_id.clone()),
        entry(type_id.clone(), file_type.description.clone()),
    ];
    if let Some(icon) = file_icon {
        entries.push(entry(
            format!("{}\\DefaultIcon", type_id),
            format!("\"{}\",0", icon.display()),
        ));
    }
    entries.push(entry(
        format!("{}\\shell\\open\\command", type_id),
        format!("\"{}\" \"%1\"", executable.display()),
    ));
    entries
}

/// Writes in order and stops at the first failure.
pub fn write_entries(hive: &mut dyn ClassesHive, entries: &[RegistryEntry]) -> Result<()> {
    entries
        .iter()
        .try_for_each(|entry| hive.set_default(&entry.key, &entry.value))
}

#[cfg(windows)]
struct UserClasses(RegKey);

#[cfg(windows)]
impl ClassesHive for UserClasses {
    fn set_default(&mut self, key: &str, value: &str) -> Result<()> {
        let registry_error = |source| AssocError::Registry {
            key: format!("HKCU\\{}\\{}", CLASSES_ROOT, key),
            source,
        };
        let (subkey, _) = self.0.create_subkey(key).map_err(registry_error)?;
        subkey.set_value("", &value).map_err(registry_error)
    }
}

#[cfg(windows)]
fn open_user_classes() -> Result<UserClasses> {
    RegKey::predef(HKEY_CURRENT_USER)
        .create_subkey(CLASSES_ROOT)
        .map(|(key, _)| UserClasses(key))
        .map_err(|source| AssocError::Registry {
            key: format!("HKCU\\{}", CLASSES_ROOT),
            source,
        })
}

#[cfg(windows)]
fn write_to_user_hive(entries: &[RegistryEntry]) -> Result<()> {
    write_entries(&mut open_user_classes()?, entries)?;
    notify_shell();
    Ok(())
}

#[cfg(not(windows))]
fn write_to_user_hive(_entries: &[RegistryEntry]) -> Result<()> {
    Err(crate::error::AssocError::Unsupported(
        "registry associations need Windows",
    ))
}

/// Ask Explorer to reload associations and icons.
#[cfg(windows)]
fn notify_shell() {
    use ::windows::Win32::UI::Shell::{SHCNE_ASSOCCHANGED, SHCNF_IDLIST, SHChangeNotify};

    unsafe {
        SHChangeNotify(SHCNE_ASSOCCHANGED, SHCNF_IDLIST, None, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssocError;
    use std::collections::BTreeMap;
    use std::io;
    use std::path::PathBuf;

    #[derive(Default)]
    struct MemoryHive {
        values: BTreeMap<String, String>,
        writes: usize,
        fail_on: Option<&'static str>,
    }

    impl ClassesHive for MemoryHive {
        fn set_default(&mut self, key: &str, value: &str) -> Result<()> {
            if self.fail_on == Some(key) {
                return Err(AssocError::Registry {
                    key: key.to_string(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
                });
            }
            self.writes += 1;
            self.values.insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    fn exe() -> PathBuf {
        PathBuf::from("C:\\Program Files\\TuneLab\\TuneLab.exe")
    }

    #[test]
    fn test_entries_with_icon() {
        let icon = PathBuf::from("C:\\Program Files\\TuneLab\\Assets\\file.ico");
        let entries = registry_entries(&FileTypeDescriptor::default(), Some(&icon), &exe());

        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                ".tlp",
                "TuneLab.Project",
                "TuneLab.Project\\DefaultIcon",
                "TuneLab.Project\\shell\\open\\command",
            ]
        );
        assert_eq!(entries[0].value, "TuneLab.Project");
        assert_eq!(entries[1].value, "TuneLab Project");
        assert_eq!(
            entries[2].value,
            "\"C:\\Program Files\\TuneLab\\Assets\\file.ico\",0"
        );
        assert_eq!(
            entries[3].value,
            "\"C:\\Program Files\\TuneLab\\TuneLab.exe\" \"%1\""
        );
    }

    #[test]
    fn test_icon_key_skipped_without_icon() {
        let entries = registry_entries(&FileTypeDescriptor::default(), None, &exe());
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| !e.key.ends_with("DefaultIcon")));
    }

    #[test]
    fn test_rewriting_is_idempotent() {
        let entries = registry_entries(&FileTypeDescriptor::default(), None, &exe());
        let mut hive = MemoryHive::default();

        write_entries(&mut hive, &entries).unwrap();
        let first = hive.values.clone();
        write_entries(&mut hive, &entries).unwrap();

        assert_eq!(hive.values, first);
        assert_eq!(hive.values.len(), 3);
    }

    #[test]
    fn test_first_failure_aborts_remaining_keys() {
        let entries = registry_entries(&FileTypeDescriptor::default(), None, &exe());
        let mut hive = MemoryHive {
            fail_on: Some("TuneLab.Project"),
            ..Default::default()
        };

        assert!(write_entries(&mut hive, &entries).is_err());
        assert_eq!(hive.writes, 1);
        assert!(!hive.values.contains_key("TuneLab.Project\\shell\\open\\command"));
    }
}
