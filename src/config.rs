//! Validation configuration.
//!
//! Read from `xpilint.yaml` (or `.xpilint.yaml`) in the working directory,
//! falling back to the per-user config directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::bundle::versions::{app_guid, version_range};
use crate::bundle::{AppVersions, PackageType};

pub const CONFIG_NAMES: &[&str] = &["xpilint.yaml", ".xpilint.yaml"];

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Versions of one application: explicit, or a `[from, to)` range over the
/// known version table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum VersionSpec {
    List(Vec<String>),
    Range { from: String, to: String },
}

/// Values that replace what the manifest declares.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Overrides {
    /// Do not require `em:name`.
    #[serde(default)]
    pub ignore_empty_name: bool,
    /// App GUID to minimum version.
    #[serde(default)]
    pub targetapp_min_version: BTreeMap<String, String>,
    /// App GUID to maximum version.
    #[serde(default)]
    pub targetapp_max_version: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ValidationConfig {
    /// Applications (GUID or short name) and the versions to validate for.
    #[serde(default)]
    pub for_appversions: BTreeMap<String, VersionSpec>,
    #[serde(default)]
    pub overrides: Overrides,
    /// Whole-run limit; 0 disables it.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Keep running later tiers after a failing one.
    #[serde(default)]
    pub determined: bool,
    /// Engine faults abort the run instead of becoming diagnostics.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub expected_type: Option<PackageType>,
    /// Glob patterns of package paths that are never scanned.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            for_appversions: BTreeMap::new(),
            overrides: Overrides::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            determined: false,
            strict: false,
            expected_type: None,
            excluded_paths: Vec::new(),
        }
    }
}

impl ValidationConfig {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: ValidationConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the first configuration file found, or the defaults.
    pub fn discover() -> anyhow::Result<Self> {
        match find_config_file() {
            Some(path) => {
                debug!(path = %path.display(), "loading configuration");
                Self::parse_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// The supported-version set for the bundle. `None` when nothing is
    /// configured, meaning every gated finding is reported.
    pub fn supported_versions(&self) -> Option<AppVersions> {
        if self.for_appversions.is_empty() {
            return None;
        }
        let mut versions = AppVersions::new();
        for (app, spec) in &self.for_appversions {
            let guid = app_guid(app).unwrap_or(app.as_str());
            match spec {
                VersionSpec::List(list) => versions.insert(guid, list.clone()),
                VersionSpec::Range { from, to } => versions.extend(&version_range(guid, from, to)),
            }
        }
        Some(versions)
    }

    /// Check if a package path should be skipped.
    /// Uses globset for matching, which supports `**` for recursive directory matching.
    pub fn is_path_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|pattern| {
            globset::Glob::new(pattern)
                .map(|glob| glob.compile_matcher().is_match(path))
                .unwrap_or(false)
        })
    }
}

/// Look in the working directory, then the user config directory.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Some(path);
        }
    }
    let dirs = directories::ProjectDirs::from("", "", "xpilint")?;
    let path = dirs.config_dir().join("config.yaml");
    path.exists().then_some(path)
}
