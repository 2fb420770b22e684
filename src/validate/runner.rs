//! Tier runner that orchestrates every check over one package.

use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

use super::detect::{detect_jetpack, detect_type, identify_library};
use super::ValidationError;
use crate::bundle::{ErrorBundle, Finding, PackageType, SigningSeverity};
use crate::config::ValidationConfig;
use crate::js::{self, EngineFault, JsOptions};
use crate::manifest::{test_install_rdf, ChromeManifest, RdfParser};
use crate::package::{self, MemoryPackage, PackageReader};
use crate::patterns::{css, markup};

const CHROME_MANIFEST: &str = "chrome.manifest";

/// Manifest `manifest` instructions followed before giving up.
const MAX_MANIFEST_INCLUDES: usize = 16;

const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsm", "mjs"];
const MARKUP_EXTENSIONS: &[&str] = &["xul", "xbl", "html", "htm", "xhtml"];
const PACKAGE_EXTENSIONS: &[&str] = &["xpi", "jar"];

/// Resource names that would shadow the application's own.
const RESERVED_RESOURCES: &[&str] = &["gre", "app"];

/// Executes all tiers against a package.
pub struct Runner<'c> {
    config: &'c ValidationConfig,
    deadline: Option<Instant>,
}

impl<'c> Runner<'c> {
    /// Create a runner; the timeout starts counting now.
    pub fn new(config: &'c ValidationConfig) -> Self {
        Self {
            config,
            deadline: config.timeout().map(|t| Instant::now() + t),
        }
    }

    /// Run every tier against a top-level package.
    pub fn run(&self, bundle: &mut ErrorBundle, package: &dyn PackageReader) -> Result<(), ValidationError> {
        self.run_tiers(bundle, package, true)
    }

    fn run_tiers(
        &self,
        bundle: &mut ErrorBundle,
        package: &dyn PackageReader,
        with_manifest: bool,
    ) -> Result<(), ValidationError> {
        bundle.set_tier(1);
        if with_manifest {
            self.test_package_type(bundle, package);
            if self.stop_after_tier(bundle) {
                return Ok(());
            }
        }

        bundle.set_tier(2);
        self.test_chrome_manifest(bundle, package);
        if self.stop_after_tier(bundle) {
            return Ok(());
        }

        bundle.set_tier(3);
        self.test_contents(bundle, package)
    }

    fn stop_after_tier(&self, bundle: &ErrorBundle) -> bool {
        let stop = bundle.failed(false) && !self.config.determined;
        if stop {
            debug!(tier = bundle.tier, "tier failed, stopping");
        }
        stop
    }

    fn check_deadline(&self) -> Result<(), ValidationError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ValidationError::Timeout),
            _ => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Tier 1: package type and install manifest
    // ---------------------------------------------------------------------

    fn test_package_type(&self, bundle: &mut ErrorBundle, package: &dyn PackageReader) {
        let jetpack = detect_jetpack(bundle, package);

        let declared = match package.read_text("install.rdf") {
            Ok(source) => match RdfParser::parse(&source) {
                Ok(rdf) => test_install_rdf(bundle, &rdf, &self.config.overrides),
                Err(e) => {
                    bundle.notice(
                        Finding::new(&["testcases_installrdf", "_test_rdf", "unreadable"], "Unreadable install manifest")
                            .description(format!("install.rdf could not be parsed: {}", e))
                            .file("install.rdf"),
                    );
                    None
                }
            },
            Err(_) if package.contains("manifest.json") || jetpack => None,
            Err(_) => {
                bundle.error(
                    Finding::new(
                        &["testcases_packagelayout", "test_layout", "missing_install_rdf"],
                        "Package has no install manifest",
                    )
                    .description("Add-on packages must contain an install.rdf or manifest.json at their root."),
                );
                None
            }
        };

        let detected = detect_type(package, declared);
        bundle.detected_type = detected;
        bundle.set_meta("type", json!(detected.as_str()));
        debug!(package = package.name(), kind = detected.as_str(), "detected package type");

        if let Some(expected) = self.config.expected_type {
            if expected != detected && detected != PackageType::Unknown {
                bundle.error(
                    Finding::new(&["main", "test_package", "unexpected_type"], "Unexpected package type")
                        .description(format!(
                            "Expected a {} but the package is a {}.",
                            expected.as_str(),
                            detected.as_str()
                        )),
                );
            }
        }
    }

    // ---------------------------------------------------------------------
    // Tier 2: chrome registrations
    // ---------------------------------------------------------------------

    fn test_chrome_manifest(&self, bundle: &mut ErrorBundle, package: &dyn PackageReader) {
        let Ok(source) = package.read_text(CHROME_MANIFEST) else {
            return;
        };
        let mut chrome = ChromeManifest::parse(&source, CHROME_MANIFEST);

        let mut included = 0;
        let mut pending: Vec<String> = chrome
            .get_entries("manifest", &[])
            .filter_map(|e| e.args.first().cloned())
            .collect();
        while let Some(path) = pending.pop() {
            included += 1;
            if included > MAX_MANIFEST_INCLUDES {
                warn!(package = package.name(), "too many chrome manifest includes");
                break;
            }
            let Ok(text) = package.read_text(&path) else {
                bundle.notice(
                    Finding::new(&["testcases_chromemanifest", "manifest", "missing_include"], "Included manifest not found")
                        .description(format!("`{}` is referenced but not in the package.", path))
                        .file(CHROME_MANIFEST),
                );
                continue;
            };
            let nested = ChromeManifest::parse(&text, &path);
            pending.extend(nested.get_entries("manifest", &[]).filter_map(|e| e.args.first().cloned()));
            chrome.extend(&text, &path);
        }

        let paths = package.paths();
        for entry in chrome.get_entries("content", &[]) {
            let Some(base) = entry.args.get(1) else {
                continue;
            };
            if base.starts_with("jar:") || base.contains("://") {
                continue;
            }
            let base = base.trim_start_matches("./").trim_start_matches('/');
            if !paths.iter().any(|p| p.starts_with(base)) {
                bundle.warning(
                    Finding::new(&["testcases_chromemanifest", "content", "missing_target"], "Registered content path is empty")
                        .description(format!("Nothing in the package lives under `{}`.", base))
                        .file(entry.file.clone())
                        .line(entry.line),
                );
            }
        }

        for entry in chrome.get_entries("resource", &[]) {
            let Some(name) = entry.args.first() else {
                continue;
            };
            if RESERVED_RESOURCES.contains(&name.as_str()) {
                bundle.error(
                    Finding::new(&["testcases_chromemanifest", "resource", "reserved_name"], "Reserved resource name")
                        .description(format!("`resource://{}/` belongs to the application.", name))
                        .file(entry.file.clone())
                        .line(entry.line)
                        .signing(SigningSeverity::High),
                );
            }
        }

        bundle.set_meta("chrome_packages", json!(chrome.content_packages()));
        let overlays: Vec<String> = chrome
            .overlays()
            .into_iter()
            .filter_map(|(_, overlay)| chrome.resolve_chrome_url(overlay))
            .filter(|target| target.archive.is_none())
            .map(|target| target.path)
            .collect();
        if !overlays.is_empty() {
            bundle.set_meta("overlay_files", json!(overlays));
        }
    }

    // ---------------------------------------------------------------------
    // Tier 3: file contents
    // ---------------------------------------------------------------------

    fn test_contents(
        &self,
        bundle: &mut ErrorBundle,
        package: &dyn PackageReader,
    ) -> Result<(), ValidationError> {
        let options = JsOptions {
            strict: self.config.strict,
            deadline: self.deadline,
            ..Default::default()
        };
        let mut identified = Map::new();

        for path in package.paths() {
            self.check_deadline()?;
            if self.config.is_path_excluded(&path) {
                debug!(file = %path, "excluded");
                continue;
            }
            let extension = package::extension(&path);

            if SCRIPT_EXTENSIONS.contains(&extension.as_str()) {
                if let Some(library) = identify_library(&path) {
                    debug!(file = %path, library, "skipping known library");
                    identified.insert(path.clone(), json!({ "library": library }));
                    continue;
                }
                let source = package.read_text(&path)?;
                let result = js::test_js_file(bundle, &path, &source, &options);
                self.recover(bundle, &path, result)?;
            } else if MARKUP_EXTENSIONS.contains(&extension.as_str()) {
                let source = package.read_text(&path)?;
                let result = markup::test_markup_file(bundle, &path, &source, &options);
                self.recover(bundle, &path, result)?;
            } else if extension == "css" {
                let source = package.read_text(&path)?;
                css::test_css_file(bundle, &path, &source);
            } else if PACKAGE_EXTENSIONS.contains(&extension.as_str()) {
                self.test_nested(bundle, package, &path)?;
            }
        }

        if !identified.is_empty() {
            bundle.set_meta("identified_files", Value::Object(identified));
        }
        Ok(())
    }

    fn test_nested(
        &self,
        bundle: &mut ErrorBundle,
        package: &dyn PackageReader,
        path: &str,
    ) -> Result<(), ValidationError> {
        let bytes = package.read(path)?;
        let nested = match MemoryPackage::from_zip(path, &bytes) {
            Ok(nested) => nested,
            Err(e) => {
                bundle.warning(
                    Finding::new(&["testcases_packagelayout", "nested", "corrupt"], "Unreadable nested package")
                        .description(format!("`{}` could not be opened: {}", path, e))
                        .file(path),
                );
                return Ok(());
            }
        };

        // chrome jars are plain containers; bundled add-ons are validated in full
        let is_addon = package::extension(path) == "xpi";

        let tier = bundle.tier;
        bundle.push_state(path);
        let result = self.run_tiers(bundle, &nested, is_addon);
        bundle.pop_state();
        bundle.tier = tier;
        result
    }

    /// Turn an engine fault into a diagnostic, unless it must propagate.
    fn recover(
        &self,
        bundle: &mut ErrorBundle,
        file: &str,
        result: Result<(), EngineFault>,
    ) -> Result<(), ValidationError> {
        let fault = match result {
            Ok(()) => return Ok(()),
            Err(EngineFault::Timeout) => return Err(ValidationError::Timeout),
            Err(fault) => fault,
        };
        if self.config.strict {
            return Err(ValidationError::Engine {
                file: file.to_string(),
                fault,
            });
        }
        warn!(file, error = %fault, "engine fault, abandoning file");
        let tier = bundle.tier;
        bundle.tier = 1;
        bundle.error(
            Finding::new(&["javascript", "traverser", "unexpected_exception"], "Unexpected error during analysis")
                .description(format!("An internal error occurred while analysing `{}`: {}", file, fault))
                .file(file),
        );
        bundle.tier = tier;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::MAX_DEPTH;

    const INSTALL_RDF: &str = r#"<RDF xmlns="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
     xmlns:em="http://www.mozilla.org/2004/em-rdf#">
  <Description about="urn:mozilla:install-manifest">
    <em:id>a@b.c</em:id><em:version>1.0</em:version><em:name>A</em:name>
    <em:targetApplication><Description>
      <em:id>{ec8030f7-c20a-464f-9b0e-13a3a9e97384}</em:id>
      <em:minVersion>38.0</em:minVersion><em:maxVersion>45.*</em:maxVersion>
    </Description></em:targetApplication>
  </Description>
</RDF>"#;

    fn addon() -> MemoryPackage {
        MemoryPackage::new("a.xpi").with_file("install.rdf", INSTALL_RDF)
    }

    fn run(package: &MemoryPackage, config: &ValidationConfig) -> Result<ErrorBundle, ValidationError> {
        let mut bundle = ErrorBundle::new();
        Runner::new(config).run(&mut bundle, package)?;
        Ok(bundle)
    }

    fn deep_script() -> String {
        let depth = MAX_DEPTH + 10;
        format!("var x = {}1{};", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn test_failing_tier_stops_the_run() {
        let package = MemoryPackage::new("a.xpi").with_file("content/a.js", "eval('x');");
        let bundle = run(&package, &ValidationConfig::default()).unwrap();
        assert_eq!(bundle.find(&["testcases_packagelayout", "test_layout", "missing_install_rdf"]).len(), 1);
        assert!(bundle.find(&["javascript", "dangerous_global", "eval"]).is_empty());
        assert_eq!(bundle.ending_tier, 1);

        let determined = ValidationConfig {
            determined: true,
            ..Default::default()
        };
        let bundle = run(&package, &determined).unwrap();
        assert_eq!(bundle.find(&["javascript", "dangerous_global", "eval"]).len(), 1);
        assert_eq!(bundle.ending_tier, 3);
    }

    #[test]
    fn test_engine_fault_becomes_one_error() {
        let package = addon()
            .with_file("content/deep.js", deep_script())
            .with_file("content/ok.js", "eval('x');");
        let bundle = run(&package, &ValidationConfig::default()).unwrap();
        let faults = bundle.find(&["javascript", "traverser", "unexpected_exception"]);
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].tier, 1);
        assert!(faults[0].description[0].contains("content/deep.js"));
        // the remaining files are still analysed
        assert_eq!(bundle.find(&["javascript", "dangerous_global", "eval"]).len(), 1);
    }

    #[test]
    fn test_strict_propagates_faults() {
        let package = addon().with_file("content/deep.js", deep_script());
        let strict = ValidationConfig {
            strict: true,
            ..Default::default()
        };
        assert!(matches!(run(&package, &strict), Err(ValidationError::Engine { .. })));
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let package = addon().with_file("content/a.js", "var a;");
        let config = ValidationConfig::default();
        let mut runner = Runner::new(&config);
        runner.deadline = Some(Instant::now());
        let mut bundle = ErrorBundle::new();
        assert!(matches!(runner.run(&mut bundle, &package), Err(ValidationError::Timeout)));
    }

    #[test]
    fn test_excluded_paths_and_libraries() {
        let package = addon()
            .with_file("content/jquery-2.1.0.min.js", "eval('x');")
            .with_file("tests/a.js", "eval('x');");
        let config = ValidationConfig {
            excluded_paths: vec!["tests/**".to_string()],
            ..Default::default()
        };
        let bundle = run(&package, &config).unwrap();
        assert!(bundle.find(&["javascript", "dangerous_global", "eval"]).is_empty());
        assert_eq!(
            bundle.metadata["identified_files"]["content/jquery-2.1.0.min.js"]["library"],
            json!("jquery")
        );
    }

    #[test]
    fn test_chrome_manifest_checks() {
        let package = addon()
            .with_file(
                "chrome.manifest",
                "content demo chrome/content/\noverlay chrome://browser/content/browser.xul chrome://demo/content/o.xul\nresource gre modules/\n",
            )
            .with_file("chrome/content/o.xul", "<overlay/>");
        let bundle = run(&package, &ValidationConfig::default()).unwrap();
        assert_eq!(bundle.find(&["testcases_chromemanifest", "resource", "reserved_name"]).len(), 1);
        assert_eq!(bundle.metadata["chrome_packages"], json!(["demo"]));
        assert_eq!(bundle.metadata["overlay_files"], json!(["chrome/content/o.xul"]));
    }

    #[test]
    fn test_missing_content_target() {
        let package = addon().with_file("chrome.manifest", "content demo chrome/content/\n");
        let bundle = run(&package, &ValidationConfig::default()).unwrap();
        let found = bundle.find(&["testcases_chromemanifest", "content", "missing_target"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, Some(1));
    }
}
