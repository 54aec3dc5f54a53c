//! Finding the `.app` bundle around the running executable and reading its
//! identifier.

use plist::{Dictionary, Value};
use rs_apply::Apply;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::model::BundleDescriptor;

pub const BUNDLE_SUFFIX: &str = ".app";
const IDENTIFIER_KEY: &str = "CFBundleIdentifier";

/// Nearest ancestor of `executable` whose name ends in `.app`.
pub fn find_bundle_dir(executable: &Path) -> Option<PathBuf> {
    executable
        .ancestors()
        .skip(1)
        .find(|dir| {
            dir.file_name()
                .map(|name| name.to_string_lossy().ends_with(BUNDLE_SUFFIX))
                .unwrap_or(false)
        })
        .map(Path::to_path_buf)
}

/// Identifier declared by the manifest at `manifest_path`, if any. XML and
/// binary property lists are both parsed; anything else is scanned as text.
pub fn read_bundle_identifier(manifest_path: &Path) -> Option<String> {
    match Value::from_file(manifest_path)
        .ok()
        .and_then(Value::into_dictionary)
    {
        Some(dict) => identifier_in(&dict),
        None => std::fs::read_to_string(manifest_path)
            .ok()?
            .apply(|text| scan_identifier(&text)),
    }
}

/// Parses `text` as a property list and returns its identifier. Text that is
/// not a plist dictionary is scanned for the `<key>`/`<string>` pair instead.
pub fn bundle_identifier_from_text(text: &str) -> Option<String> {
    let parsed = Value::from_reader(Cursor::new(text.as_bytes())).ok();

    match parsed.as_ref().and_then(Value::as_dictionary) {
        Some(dict) => identifier_in(dict),
        None => scan_identifier(text),
    }
}

fn identifier_in(dict: &Dictionary) -> Option<String> {
    dict.get(IDENTIFIER_KEY)
        .and_then(Value::as_string)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

fn scan_identifier(text: &str) -> Option<String> {
    let key = format!("<key>{}</key>", IDENTIFIER_KEY);
    let after_key = &text[text.find(&key)? + key.len()..];

    // The value must be the very next element
    let value = after_key.trim_start().strip_prefix("<string>")?;
    let end = value.find("</string>")?;

    Some(value[..end].trim())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

/// Bundle around `executable`, with its identifier or `default_id`.
pub fn locate(executable: &Path, default_id: &str) -> Option<BundleDescriptor> {
    let bundle_dir = find_bundle_dir(executable)?;
    let bundle_id = read_bundle_identifier(&bundle_dir.join("Contents").join("Info.plist"))
        .unwrap_or_else(|| default_id.to_string());
    let executable_name = executable.file_name()?.to_string_lossy().into_owned();

    Some(BundleDescriptor {
        bundle_dir,
        bundle_id,
        executable_name,
    })
}
