//! Package type, SDK and library detection.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::bundle::{ErrorBundle, PackageType};
use crate::package::{self, PackageReader};

lazy_static! {
    /// Well-known third-party libraries, by file name.
    static ref LIBRARIES: Vec<(&'static str, Regex)> = [
        ("jquery", r"(?i)(^|/)jquery([-.]\d+(\.\d+)*)?(\.min)?\.js$"),
        ("jquery-ui", r"(?i)(^|/)jquery-ui([-.]\d+(\.\d+)*)?(\.custom)?(\.min)?\.js$"),
        ("underscore", r"(?i)(^|/)underscore(-min)?(\.min)?\.js$"),
        ("prototype", r"(?i)(^|/)prototype(-\d+(\.\d+)*)?\.js$"),
        ("mootools", r"(?i)(^|/)mootools(-core)?([-.]\d+(\.\d+)*)?(-yc|-nc)?(\.min)?\.js$"),
        ("dojo", r"(?i)(^|/)dojo(\.min)?\.js$"),
        ("angular", r"(?i)(^|/)angular(\.min)?\.js$"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect();
}

/// Name of the known library a package path holds, if any.
pub fn identify_library(path: &str) -> Option<&'static str> {
    LIBRARIES
        .iter()
        .find(|(_, pattern)| pattern.is_match(path))
        .map(|(name, _)| *name)
}

/// Work out the package type when the install manifest does not say.
pub fn detect_type(package: &dyn PackageReader, declared: Option<PackageType>) -> PackageType {
    if let Some(kind) = declared {
        return kind;
    }
    if package::extension(package.name()) == "jar" {
        return PackageType::Theme;
    }
    let paths = package.paths();
    if paths
        .iter()
        .any(|p| p.starts_with("dictionaries/") && package::extension(p) == "dic")
    {
        return PackageType::Dictionary;
    }
    if package.contains("install.rdf") || package.contains("manifest.json") {
        return PackageType::Extension;
    }
    PackageType::Unknown
}

/// Mark Add-on SDK packages. Their modules each get a private scope, so
/// they never pollute a shared window.
pub fn detect_jetpack(bundle: &mut ErrorBundle, package: &dyn PackageReader) -> bool {
    if let Ok(text) = package.read_text("harness-options.json") {
        let options: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        if let Some(version) = options.get("sdkVersion").and_then(Value::as_str) {
            bundle.set_meta("jetpack_sdk_version", json!(version));
        }
        return mark_jetpack(bundle, "harness-options.json");
    }

    if package.contains("bootstrap.js") {
        if let Ok(text) = package.read_text("package.json") {
            let manifest: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            if manifest.get("main").is_some() || manifest.get("jpm").is_some() {
                return mark_jetpack(bundle, "package.json");
            }
        }
    }

    bundle.set_meta("is_jetpack", Value::Bool(false));
    false
}

fn mark_jetpack(bundle: &mut ErrorBundle, marker: &str) -> bool {
    debug!(marker, "add-on SDK package");
    bundle.set_meta("is_jetpack", Value::Bool(true));
    bundle.set_meta("framework", json!("jetpack"));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::MemoryPackage;

    #[test]
    fn test_identify_library() {
        assert_eq!(identify_library("content/lib/jquery-1.11.2.min.js"), Some("jquery"));
        assert_eq!(identify_library("jquery.js"), Some("jquery"));
        assert_eq!(identify_library("content/jquery-ui.custom.min.js"), Some("jquery-ui"));
        assert_eq!(identify_library("content/myjquery.js"), None);
        assert_eq!(identify_library("content/main.js"), None);
    }

    #[test]
    fn test_detect_type() {
        let rdf = MemoryPackage::new("a.xpi").with_file("install.rdf", "");
        assert_eq!(detect_type(&rdf, None), PackageType::Extension);
        assert_eq!(detect_type(&rdf, Some(PackageType::Multi)), PackageType::Multi);

        let theme = MemoryPackage::new("classic.jar").with_file("skin/a.css", "");
        assert_eq!(detect_type(&theme, None), PackageType::Theme);

        let dictionary = MemoryPackage::new("d.xpi").with_file("dictionaries/en-US.dic", "");
        assert_eq!(detect_type(&dictionary, None), PackageType::Dictionary);

        assert_eq!(detect_type(&MemoryPackage::new("x.xpi"), None), PackageType::Unknown);
    }

    #[test]
    fn test_detect_jetpack() {
        let mut bundle = ErrorBundle::new();
        let sdk = MemoryPackage::new("a.xpi")
            .with_file("harness-options.json", r#"{"sdkVersion": "1.17"}"#);
        assert!(detect_jetpack(&mut bundle, &sdk));
        assert!(bundle.meta_flag("is_jetpack"));
        assert_eq!(bundle.metadata["framework"], json!("jetpack"));
        assert_eq!(bundle.metadata["jetpack_sdk_version"], json!("1.17"));

        let mut bundle = ErrorBundle::new();
        let jpm = MemoryPackage::new("a.xpi")
            .with_file("bootstrap.js", "")
            .with_file("package.json", r#"{"main": "index.js"}"#);
        assert!(detect_jetpack(&mut bundle, &jpm));

        let mut bundle = ErrorBundle::new();
        let plain = MemoryPackage::new("a.xpi").with_file("package.json", r#"{"main": "index.js"}"#);
        assert!(!detect_jetpack(&mut bundle, &plain));
        assert_eq!(bundle.metadata["is_jetpack"], json!(false));
    }
}
