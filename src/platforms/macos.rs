use plist::{Dictionary, Value};
use rs_apply::Apply;
use std::fs;
use std::path::Path;

use crate::backends::{AssociationBackend, Registration, Steps};
use crate::bundle;
use crate::config::AssociationConfig;
use crate::error::{FsContext, Result};
use crate::icon::IconConverter;
use crate::model::{BundleDescriptor, Platform};
use crate::tools::{REFRESH_TIMEOUT, ToolCall};

const LSREGISTER: &str = "/System/Library/Frameworks/CoreServices.framework/Frameworks/LaunchServices.framework/Support/lsregister";
const APP_ICON_STEM: &str = "AppIcon";
const DOCUMENT_TYPES_KEY: &str = "CFBundleDocumentTypes";
const TYPE_EXTENSIONS_KEY: &str = "CFBundleTypeExtensions";

pub struct MacBackend;

impl AssociationBackend for MacBackend {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn register(&self, registration: &Registration<'_>) -> Result<()> {
        let app = &registration.config.app;
        let mut steps = Steps::new(registration.log);

        // Running outside a bundle is not an error
        let bundle = bundle::locate(registration.executable, &app.default_bundle_id);
        match &bundle {
            Some(bundle) => {
                steps.attempt("app bundle", || register_bundle(registration, bundle));
            }
            None => registration
                .log
                .info("Executable is not inside an .app bundle, skipping Info.plist"),
        }

        let bundle_id = bundle
            .as_ref()
            .map_or(app.default_bundle_id.as_str(), |b| b.bundle_id.as_str());
        set_default_handler(registration, bundle_id);

        steps.finish()
    }
}

/// Rewrite the bundle's manifest to claim the document type and have Launch
/// Services pick it up.
fn register_bundle(registration: &Registration<'_>, bundle: &BundleDescriptor) -> Result<()> {
    let config = registration.config;
    let resources = bundle.resources_dir();
    fs::create_dir_all(&resources).fs_context("creating bundle resources", &resources)?;

    let app_icon = registration
        .icons
        .existing_app_icon()
        .map(|source| install_icon(registration, source, &resources, APP_ICON_STEM))
        .transpose()?;
    let document_icon = registration
        .icons
        .existing_file_icon()
        .map(|source| install_icon(registration, source, &resources, &config.app.file_icon_name))
        .transpose()?;

    let manifest_path = bundle.manifest_path();
    let existing = Value::from_file(&manifest_path)
        .ok()
        .and_then(Value::into_dictionary);

    build_manifest(
        existing,
        config,
        bundle,
        app_icon.as_deref(),
        document_icon.as_deref(),
    )
    .to_file_xml(&manifest_path)?;
    registration.log.info(&format!(
        "Wrote {} for {}",
        manifest_path.display(),
        bundle.bundle_id
    ));

    registration.run_optional(
        ToolCall::new(LSREGISTER)
            .arg("-f")
            .arg(&bundle.bundle_dir)
            .timeout(REFRESH_TIMEOUT),
    );

    Ok(())
}

/// Put an icon for `source` into `resources`, as `.icns` when the system
/// tools cooperate and as a plain copy otherwise. Returns the file name.
fn install_icon(
    registration: &Registration<'_>,
    source: &Path,
    resources: &Path,
    stem: &str,
) -> Result<String> {
    let icns_name = format!("{}.icns", stem);
    let converter = IconConverter::new(registration.tools, registration.log);

    match converter.convert(source, &resources.join(&icns_name)) {
        Ok(()) => Ok(icns_name),
        Err(e) => {
            registration
                .log
                .warn(&format!("{}, copying {} instead", e, source.display()));
            let extension = source
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_else(|| "png".to_string());
            let copy_name = format!("{}.{}", stem, extension);
            let target = resources.join(&copy_name);
            fs::copy(source, &target).fs_context("copying icon", &target)?;
            Ok(copy_name)
        }
    }
}

/// Our keys layered over whatever the manifest already holds. Other
/// document types survive; ours is replaced, never duplicated.
pub fn build_manifest(
    existing: Option<Dictionary>,
    config: &AssociationConfig,
    bundle: &BundleDescriptor,
    app_icon: Option<&str>,
    document_icon: Option<&str>,
) -> Value {
    let app = &config.app;
    let mut manifest = existing.unwrap_or_else(Dictionary::new);
    let string = |s: &str| Value::String(s.to_string());

    for (key, value) in [
        ("CFBundleIdentifier", bundle.bundle_id.as_str()),
        ("CFBundleName", app.name.as_str()),
        ("CFBundleDisplayName", app.name.as_str()),
        ("CFBundleExecutable", bundle.executable_name.as_str()),
        ("CFBundleVersion", app.version.as_str()),
        ("CFBundleShortVersionString", app.version.as_str()),
        ("CFBundlePackageType", "APPL"),
        ("CFBundleInfoDictionaryVersion", "6.0"),
    ] {
        manifest.insert(key.to_string(), string(value));
    }
    if let Some(icon) = app_icon {
        manifest.insert("CFBundleIconFile".to_string(), string(icon));
    }

    let extension = config.file_type.bare_extension();
    let mut document_types: Vec<Value> = manifest
        .remove(DOCUMENT_TYPES_KEY)
        .and_then(Value::into_array)
        .unwrap_or_default()
        .into_iter()
        .filter(|entry| !declares_extension(entry, extension))
        .collect();

    let mut document_type = Dictionary::new();
    document_type.insert(
        "CFBundleTypeName".to_string(),
        string(&config.file_type.description),
    );
    document_type.insert("CFBundleTypeRole".to_string(), string("Editor"));
    document_type.insert("LSHandlerRank".to_string(), string("Owner"));
    document_type.insert(
        TYPE_EXTENSIONS_KEY.to_string(),
        Value::Array(vec![string(extension)]),
    );
    document_type.insert(
        "CFBundleTypeMIMETypes".to_string(),
        Value::Array(vec![string(&app.mime_type)]),
    );
    if let Some(icon) = document_icon {
        document_type.insert("CFBundleTypeIconFile".to_string(), string(icon));
    }
    document_types.push(Value::Dictionary(document_type));

    manifest.insert(DOCUMENT_TYPES_KEY.to_string(), Value::Array(document_types));
    Value::Dictionary(manifest)
}

fn declares_extension(document_type: &Value, extension: &str) -> bool {
    document_type
        .as_dictionary()
        .and_then(|dict| dict.get(TYPE_EXTENSIONS_KEY))
        .and_then(Value::as_array)
        .map(|extensions| {
            extensions
                .iter()
                .filter_map(Value::as_string)
                .any(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .unwrap_or(false)
}

/// Second registration path through `duti`, when it is installed.
fn set_default_handler(registration: &Registration<'_>, bundle_id: &str) {
    if !registration.tools.is_available("duti") {
        registration.log.info("duti not installed, skipping");
        return;
    }

    ToolCall::new("duti")
        .arg("-s")
        .arg(bundle_id)
        .arg(&registration.config.file_type.extension)
        .arg("all")
        .timeout(REFRESH_TIMEOUT)
        .apply(|call| registration.run_optional(call));
}
