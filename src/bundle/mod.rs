//! Diagnostic bundle: the ordered record store every check reports into.
//!
//! One bundle lives for a whole top-level validation run. Nested packages are
//! validated between `push_state(name)` and `pop_state()`, which prefix every
//! record's file with the package chain and give the sub-package its own
//! metadata, message tree and pushable resources.

mod context;
mod tree;
mod types;
pub mod versions;

pub use context::ContextGenerator;
pub use tree::{MessageTree, TreeNode};
pub use types::{
    CompatibilityType, Diagnostic, Finding, Severity, SigningSeverity, SourceContext, Uid,
};
pub use versions::{AppVersions, VersionGate};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Kind of package being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    #[default]
    Unknown,
    Extension,
    Theme,
    Dictionary,
    Langpack,
    Search,
    Multi,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Unknown => "unknown",
            PackageType::Extension => "extension",
            PackageType::Theme => "theme",
            PackageType::Dictionary => "dictionary",
            PackageType::Langpack => "langpack",
            PackageType::Search => "search",
            PackageType::Multi => "multi",
        }
    }

    /// Map an `em:type` value from install.rdf.
    pub fn from_em_type(value: &str) -> Option<Self> {
        match value.trim() {
            "2" => Some(PackageType::Extension),
            "4" => Some(PackageType::Theme),
            "8" => Some(PackageType::Langpack),
            "32" => Some(PackageType::Multi),
            "64" => Some(PackageType::Dictionary),
            _ => None,
        }
    }
}

impl std::str::FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extension" => Ok(PackageType::Extension),
            "theme" => Ok(PackageType::Theme),
            "dictionary" => Ok(PackageType::Dictionary),
            "langpack" => Ok(PackageType::Langpack),
            "search" => Ok(PackageType::Search),
            "multi" => Ok(PackageType::Multi),
            _ => Err(format!("unknown package type: {}", s)),
        }
    }
}

/// Per-category counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub notices: usize,
}

impl Summary {
    fn slot(&mut self, kind: Severity) -> &mut usize {
        match kind {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
            Severity::Notice => &mut self.notices,
        }
    }
}

/// Counts per signing severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSummary {
    pub trivial: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl SigningSummary {
    fn slot(&mut self, severity: SigningSeverity) -> &mut usize {
        match severity {
            SigningSeverity::Trivial => &mut self.trivial,
            SigningSeverity::Low => &mut self.low,
            SigningSeverity::Medium => &mut self.medium,
            SigningSeverity::High => &mut self.high,
        }
    }
}

/// State saved by `push_state` and restored by `pop_state`.
#[derive(Debug)]
struct SavedState {
    name: String,
    metadata: Map<String, Value>,
    message_tree: MessageTree,
    pushable_resources: HashMap<String, Value>,
    detected_type: PackageType,
}

/// Accumulates the findings of one validation run.
#[derive(Debug, Default)]
pub struct ErrorBundle {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub notices: Vec<Diagnostic>,
    pub message_tree: MessageTree,
    pub compat_summary: Summary,
    pub signing_summary: SigningSummary,
    pub metadata: Map<String, Value>,
    pub detected_type: PackageType,
    /// Tier currently being validated.
    pub tier: u8,
    pub ending_tier: u8,
    supported_versions: Option<AppVersions>,
    package_stack: Vec<String>,
    states: Vec<SavedState>,
    resources: HashMap<String, Value>,
    pushable_resources: HashMap<String, Value>,
}

impl ErrorBundle {
    pub fn new() -> Self {
        Self {
            tier: 1,
            ending_tier: 1,
            ..Default::default()
        }
    }

    /// Restrict compatibility findings to the given application versions.
    pub fn with_supported_versions(mut self, versions: Option<AppVersions>) -> Self {
        self.supported_versions = versions.filter(|v| !v.is_empty());
        self
    }

    pub fn supported_versions(&self) -> Option<&AppVersions> {
        self.supported_versions.as_ref()
    }

    pub fn set_tier(&mut self, tier: u8) {
        self.tier = tier;
        self.ending_tier = self.ending_tier.max(tier);
    }

    pub fn error(&mut self, finding: Finding) -> Option<Uid> {
        self.push(Severity::Error, finding)
    }

    pub fn warning(&mut self, finding: Finding) -> Option<Uid> {
        self.push(Severity::Warning, finding)
    }

    pub fn notice(&mut self, finding: Finding) -> Option<Uid> {
        self.push(Severity::Notice, finding)
    }

    /// Append a record of the given severity.
    ///
    /// Returns `None` when the record is version-gated away.
    pub fn push(&mut self, kind: Severity, finding: Finding) -> Option<Uid> {
        if !self.is_relevant(finding.for_appversions.as_ref()) {
            trace!(id = ?finding.id, "dropping finding outside supported versions");
            return None;
        }

        let uid = Uid::generate();
        let file = match finding.file {
            Some(f) => {
                let mut chain = self.package_stack.clone();
                chain.push(f);
                chain
            }
            None => Vec::new(),
        };

        let record = Diagnostic {
            uid: uid.clone(),
            kind,
            id: finding.id,
            message: finding.message,
            description: finding.description,
            file,
            line: finding.line,
            column: finding.column,
            context: finding.context,
            tier: self.tier,
            for_appversions: finding.for_appversions,
            compatibility_type: finding.compatibility_type,
            signing_severity: finding.signing_severity,
            editors_only: finding.editors_only,
        };

        debug!(kind = %kind, id = %record.id_str(), "recording finding");
        self.count(&record, true);
        self.list_mut(kind).push(record);
        Some(uid)
    }

    fn is_relevant(&self, requirement: Option<&AppVersions>) -> bool {
        match (requirement, &self.supported_versions) {
            (Some(req), Some(supported)) => req.intersects(supported),
            _ => true,
        }
    }

    fn list_mut(&mut self, kind: Severity) -> &mut Vec<Diagnostic> {
        match kind {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
            Severity::Notice => &mut self.notices,
        }
    }

    /// Update the tree and summaries for an added (or removed) record.
    fn count(&mut self, record: &Diagnostic, add: bool) {
        if add {
            self.message_tree.insert(&record.id, record.kind, &record.uid);
        } else {
            self.message_tree.remove(&record.id, record.kind, &record.uid);
        }
        if let Some(compat) = record.compatibility_type {
            let kind = match compat {
                CompatibilityType::Error => Severity::Error,
                CompatibilityType::Warning => Severity::Warning,
                CompatibilityType::Notice => Severity::Notice,
            };
            let slot = self.compat_summary.slot(kind);
            *slot = if add { *slot + 1 } else { slot.saturating_sub(1) };
        }
        if let Some(signing) = record.signing_severity {
            let slot = self.signing_summary.slot(signing);
            *slot = if add { *slot + 1 } else { slot.saturating_sub(1) };
        }
    }

    /// Retract a record proven safe by a later analysis step.
    pub fn drop(&mut self, uid: &Uid) -> bool {
        for kind in [Severity::Error, Severity::Warning, Severity::Notice] {
            let list = self.list_mut(kind);
            if let Some(pos) = list.iter().position(|d| &d.uid == uid) {
                let record = list.remove(pos);
                self.count(&record, false);
                debug!(id = %record.id_str(), "retracted finding");
                return true;
            }
        }
        false
    }

    /// Whether the run failed: any error, or any warning when asked.
    pub fn failed(&self, fail_on_warnings: bool) -> bool {
        !self.errors.is_empty() || (fail_on_warnings && !self.warnings.is_empty())
    }

    /// All records in error, warning, notice order.
    pub fn messages(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.notices.iter())
    }

    /// Records whose identifier equals `id`.
    pub fn find(&self, id: &[&str]) -> Vec<&Diagnostic> {
        self.messages().filter(|d| d.has_id(id)).collect()
    }

    // ---------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------

    /// Store a value shared across test phases. Pushable resources belong to
    /// the current (sub-)package and are swapped out by `push_state`.
    pub fn save_resource(&mut self, name: &str, value: Value, pushable: bool) {
        if pushable {
            self.pushable_resources.insert(name.to_string(), value);
        } else {
            self.resources.insert(name.to_string(), value);
        }
    }

    pub fn get_resource(&self, name: &str) -> Option<&Value> {
        self.pushable_resources
            .get(name)
            .or_else(|| self.resources.get(name))
    }

    pub fn resource_flag(&self, name: &str) -> bool {
        matches!(self.get_resource(name), Some(Value::Bool(true)))
    }

    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    pub fn meta_flag(&self, key: &str) -> bool {
        matches!(self.metadata.get(key), Some(Value::Bool(true)))
    }

    // ---------------------------------------------------------------------
    // Package stack
    // ---------------------------------------------------------------------

    /// Descend into a nested package.
    pub fn push_state(&mut self, name: &str) {
        debug!(package = name, "entering sub-package");
        self.states.push(SavedState {
            name: name.to_string(),
            metadata: std::mem::take(&mut self.metadata),
            message_tree: std::mem::take(&mut self.message_tree),
            pushable_resources: std::mem::take(&mut self.pushable_resources),
            detected_type: self.detected_type,
        });
        self.package_stack.push(name.to_string());
        self.detected_type = PackageType::Unknown;
    }

    /// Return from a nested package. Returns false when the stack is empty.
    pub fn pop_state(&mut self) -> bool {
        let Some(saved) = self.states.pop() else {
            return false;
        };
        self.package_stack.pop();

        let sub_metadata = std::mem::replace(&mut self.metadata, saved.metadata);
        let sub_tree = std::mem::replace(&mut self.message_tree, saved.message_tree);
        self.message_tree.merge(&sub_tree);
        self.pushable_resources = saved.pushable_resources;
        self.detected_type = saved.detected_type;

        let subs = self
            .metadata
            .entry("sub_packages")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = subs {
            map.insert(saved.name.clone(), Value::Object(sub_metadata));
        }
        debug!(package = %saved.name, "left sub-package");
        true
    }

    /// Names of the packages currently being descended into.
    pub fn package_stack(&self) -> &[String] {
        &self.package_stack
    }

    pub fn is_nested(&self) -> bool {
        !self.package_stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_and_counts() {
        let mut bundle = ErrorBundle::new();
        bundle.error(Finding::new(&["a", "b"], "bad"));
        bundle.warning(Finding::new(&["a", "c"], "meh").signing(SigningSeverity::High));
        bundle.notice(Finding::new(&["d"], "fyi").compatibility(CompatibilityType::Warning));

        assert_eq!(bundle.errors.len(), 1);
        assert_eq!(bundle.warnings.len(), 1);
        assert_eq!(bundle.notices.len(), 1);
        assert_eq!(bundle.signing_summary.high, 1);
        assert_eq!(bundle.compat_summary.warnings, 1);
        assert_eq!(bundle.message_tree.counts(&["a"]), (1, 1, 0));
        assert!(bundle.failed(false));
    }

    #[test]
    fn test_failed_on_warnings_only_when_asked() {
        let mut bundle = ErrorBundle::new();
        bundle.warning(Finding::new(&["w"], "warn"));
        assert!(!bundle.failed(false));
        assert!(bundle.failed(true));
    }

    #[test]
    fn test_version_gating_discards() {
        let mut supported = AppVersions::new();
        supported.insert("firefox", vec!["40.0".to_string()]);
        let mut bundle = ErrorBundle::new().with_supported_versions(Some(supported));

        let fx38 = VersionGate::firefox("38.0a1", "39.0a1").expand();
        let uid = bundle.warning(Finding::new(&["compat"], "old").for_appversions(fx38));
        assert!(uid.is_none());
        assert!(bundle.warnings.is_empty());

        let fx40 = VersionGate::firefox("40.0a1", "41.0a1").expand();
        assert!(bundle
            .warning(Finding::new(&["compat"], "new").for_appversions(fx40))
            .is_some());
    }

    #[test]
    fn test_no_supported_versions_keeps_everything() {
        let mut bundle = ErrorBundle::new();
        let fx38 = VersionGate::firefox("38.0a1", "39.0a1").expand();
        assert!(bundle
            .warning(Finding::new(&["compat"], "old").for_appversions(fx38))
            .is_some());
    }

    #[test]
    fn test_drop_reverts_counters() {
        let mut bundle = ErrorBundle::new();
        let uid = bundle
            .warning(Finding::new(&["p", "q"], "x").signing(SigningSeverity::Medium))
            .unwrap();
        assert!(bundle.drop(&uid));
        assert!(bundle.warnings.is_empty());
        assert_eq!(bundle.signing_summary.medium, 0);
        assert!(bundle.message_tree.is_empty());
        assert!(!bundle.drop(&uid));
    }

    #[test]
    fn test_package_stack_prefix() {
        let mut bundle = ErrorBundle::new();
        bundle.set_meta("name", json!("outer"));
        bundle.push_state("inner.xpi");
        bundle.set_meta("name", json!("inner"));
        bundle.warning(Finding::new(&["x"], "y").file("content/main.js"));
        assert!(bundle.pop_state());
        assert!(!bundle.pop_state());

        assert_eq!(bundle.warnings[0].file, vec!["inner.xpi", "content/main.js"]);
        assert_eq!(bundle.metadata["name"], json!("outer"));
        assert_eq!(bundle.metadata["sub_packages"]["inner.xpi"]["name"], json!("inner"));
        assert_eq!(bundle.message_tree.counts(&["x"]), (0, 1, 0));
    }

    #[test]
    fn test_pushable_resources_are_scoped() {
        let mut bundle = ErrorBundle::new();
        bundle.save_resource("em:bootstrap", json!(true), true);
        bundle.save_resource("shared", json!(1), false);
        bundle.push_state("sub.xpi");
        assert!(!bundle.resource_flag("em:bootstrap"));
        assert_eq!(bundle.get_resource("shared"), Some(&json!(1)));
        bundle.pop_state();
        assert!(bundle.resource_flag("em:bootstrap"));
    }
}
