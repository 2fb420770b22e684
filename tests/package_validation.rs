//! Integration tests for the full validation pipeline.
//!
//! Packages are built on disk (zip archives in a temp dir, or the unpacked
//! fixture under `testdata/addon`) and validated through the public API.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;
use xpilint::config::{Overrides, ValidationConfig, VersionSpec};
use xpilint::report;
use xpilint::{validate, PackageType, Severity};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

const TARGET: &str = r#"
    <em:targetApplication>
      <Description>
        <em:id>{ec8030f7-c20a-464f-9b0e-13a3a9e97384}</em:id>
        <em:minVersion>38.0</em:minVersion>
        <em:maxVersion>45.*</em:maxVersion>
      </Description>
    </em:targetApplication>"#;

fn install_rdf(extra: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<RDF xmlns="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:em="http://www.mozilla.org/2004/em-rdf#">
  <Description about="urn:mozilla:install-manifest">
    <em:id>test@example.com</em:id>
    <em:version>1.0</em:version>
{}{}
  </Description>
</RDF>"#,
        extra, TARGET
    )
}

fn named_rdf(extra: &str) -> String {
    install_rdf(&format!("    <em:name>Test</em:name>\n{}", extra))
}

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

fn write_xpi(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, zip_bytes(files)).unwrap();
    path
}

// =============================================================================
// install.rdf
// =============================================================================

#[test]
fn test_missing_name_is_one_error() {
    let temp = TempDir::new().unwrap();
    let rdf = install_rdf("");
    let xpi = write_xpi(temp.path(), "a.xpi", &[("install.rdf", rdf.as_bytes())]);

    let bundle = validate(&xpi, &ValidationConfig::default()).unwrap();
    let found = bundle.find(&["testcases_installrdf", "_test_rdf", "missing_addon"]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, Severity::Error);
    assert!(found[0].description.iter().any(|d| d.contains("name")));
    assert!(bundle.failed(false));
}

#[test]
fn test_ignore_empty_name_override() {
    let temp = TempDir::new().unwrap();
    let rdf = install_rdf("");
    let xpi = write_xpi(temp.path(), "a.xpi", &[("install.rdf", rdf.as_bytes())]);

    let config = ValidationConfig {
        overrides: Overrides {
            ignore_empty_name: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let bundle = validate(&xpi, &config).unwrap();
    assert!(bundle
        .find(&["testcases_installrdf", "_test_rdf", "missing_addon"])
        .is_empty());
    assert!(!bundle.failed(false));
}

#[test]
fn test_unreadable_manifest_is_a_notice() {
    let temp = TempDir::new().unwrap();
    let xpi = write_xpi(temp.path(), "a.xpi", &[("install.rdf", b"<RDF><broken")]);
    let bundle = validate(&xpi, &ValidationConfig::default()).unwrap();
    assert_eq!(bundle.find(&["testcases_installrdf", "_test_rdf", "unreadable"]).len(), 1);
    assert_eq!(bundle.notices.len(), 1);
}

// =============================================================================
// Scripts inside packages
// =============================================================================

#[test]
fn test_bootstrap_flag_exempts_pollution() {
    let temp = TempDir::new().unwrap();
    let script: &[u8] = b"var a, b, c, d, e;";

    let plain = named_rdf("");
    let xpi = write_xpi(
        temp.path(),
        "plain.xpi",
        &[("install.rdf", plain.as_bytes()), ("content/a.js", script)],
    );
    let bundle = validate(&xpi, &ValidationConfig::default()).unwrap();
    assert_eq!(bundle.find(&["javascript", "traverser", "namespace_pollution"]).len(), 1);

    let bootstrapped = named_rdf("    <em:bootstrap>true</em:bootstrap>\n");
    let xpi = write_xpi(
        temp.path(),
        "bootstrapped.xpi",
        &[("install.rdf", bootstrapped.as_bytes()), ("bootstrap.js", b""), ("content/a.js", script)],
    );
    let bundle = validate(&xpi, &ValidationConfig::default()).unwrap();
    assert!(bundle
        .find(&["javascript", "traverser", "namespace_pollution"])
        .is_empty());
}

#[test]
fn test_jetpack_package_exempts_pollution() {
    let temp = TempDir::new().unwrap();
    let rdf = named_rdf("");
    let xpi = write_xpi(
        temp.path(),
        "sdk.xpi",
        &[
            ("install.rdf", rdf.as_bytes()),
            ("harness-options.json", br#"{"sdkVersion": "1.17"}"#),
            ("resources/lib/main.js", b"var a, b, c, d, e;"),
        ],
    );
    let bundle = validate(&xpi, &ValidationConfig::default()).unwrap();
    assert!(bundle.meta_flag("is_jetpack"));
    assert_eq!(bundle.metadata["framework"], json!("jetpack"));
    assert!(bundle
        .find(&["javascript", "traverser", "namespace_pollution"])
        .is_empty());
}

#[test]
fn test_version_window_from_config() {
    let temp = TempDir::new().unwrap();
    let rdf = named_rdf("");
    let files: &[(&str, &[u8])] = &[
        ("install.rdf", rdf.as_bytes()),
        ("content/db.js", b"var request = mozIndexedDB.open('db');"),
    ];
    let xpi = write_xpi(temp.path(), "a.xpi", files);

    let mut config = ValidationConfig::default();
    config.for_appversions.insert(
        "firefox".to_string(),
        VersionSpec::Range {
            from: "38.0a1".to_string(),
            to: "39.0a1".to_string(),
        },
    );
    let bundle = validate(&xpi, &config).unwrap();
    assert_eq!(bundle.find(&["testcases_regex", "javascript", "mozIndexedDB"]).len(), 1);

    config.for_appversions.insert(
        "firefox".to_string(),
        VersionSpec::Range {
            from: "50.0a1".to_string(),
            to: "51.0a1".to_string(),
        },
    );
    let bundle = validate(&xpi, &config).unwrap();
    assert!(bundle
        .find(&["testcases_regex", "javascript", "mozIndexedDB"])
        .is_empty());
}

// =============================================================================
// Nested packages
// =============================================================================

#[test]
fn test_nested_package_findings_are_prefixed() {
    let temp = TempDir::new().unwrap();
    let inner_rdf = named_rdf("");
    let inner = zip_bytes(&[
        ("install.rdf", inner_rdf.as_bytes()),
        ("content/evil.js", b"eval('x');"),
    ]);
    let outer_rdf = named_rdf("    <em:type>32</em:type>\n");
    let xpi = write_xpi(
        temp.path(),
        "multi.xpi",
        &[("install.rdf", outer_rdf.as_bytes()), ("inner.xpi", &inner)],
    );

    let bundle = validate(&xpi, &ValidationConfig::default()).unwrap();
    assert_eq!(bundle.detected_type, PackageType::Multi);
    let found = bundle.find(&["javascript", "dangerous_global", "eval"]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].file, vec!["inner.xpi", "content/evil.js"]);
    assert_eq!(bundle.metadata["sub_packages"]["inner.xpi"]["name"], json!("Test"));
    assert!(bundle.package_stack().is_empty());
}

// =============================================================================
// Fixture add-on and report
// =============================================================================

#[test]
fn test_fixture_addon() {
    let bundle = validate(&testdata_path().join("addon"), &ValidationConfig::default()).unwrap();

    assert_eq!(bundle.detected_type, PackageType::Extension);
    assert_eq!(bundle.ending_tier, 3);
    assert_eq!(bundle.find(&["markup", "script", "remote_src"]).len(), 1);
    assert_eq!(bundle.find(&["javascript", "dangerous_global", "eval"]).len(), 1);
    assert_eq!(bundle.find(&["javascript", "preference", "banned_pref_set"]).len(), 1);
    assert_eq!(bundle.find(&["testcases_css", "-moz-binding", "used"]).len(), 1);
    // the module declares four globals but has its own scope
    assert!(bundle
        .find(&["javascript", "traverser", "namespace_pollution"])
        .is_empty());
    assert!(bundle.errors.is_empty());

    assert_eq!(bundle.metadata["chrome_packages"], json!(["sidebar"]));
    assert_eq!(bundle.metadata["overlay_files"], json!(["chrome/content/overlay.xul"]));
    assert_eq!(bundle.signing_summary.high, 3);
}

#[test]
fn test_fixture_report() {
    let bundle = validate(&testdata_path().join("addon"), &ValidationConfig::default()).unwrap();
    let value = serde_json::to_value(report::build_json(&bundle, true)).unwrap();

    assert_eq!(value["detected_type"], "extension");
    assert_eq!(value["ending_tier"], 3);
    assert_eq!(value["success"], false);
    assert_eq!(value["errors"], 0);
    assert_eq!(value["warnings"], json!(bundle.warnings.len()));
    assert_eq!(value["metadata"]["name"], "Example Sidebar");
    assert_eq!(value["metadata"]["is_jetpack"], false);
    assert_eq!(value["signing_summary"]["high"], 3);
    assert_eq!(value["message_tree"]["javascript"]["dangerous_global"]["eval"]["__warnings"], 1);

    let messages = value["messages"].as_array().unwrap();
    assert_eq!(messages.len(), bundle.messages().count());
    assert!(messages.iter().all(|m| m["type"].is_string()));
}
