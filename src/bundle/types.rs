//! Core types for diagnostic records.

use serde::{Deserialize, Serialize};

use super::versions::AppVersions;

/// Severity class of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Notice,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "notice" => Ok(Severity::Notice),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Risk tier attached to findings relevant to automated signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningSeverity {
    Trivial,
    Low,
    Medium,
    High,
}

impl SigningSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningSeverity::Trivial => "trivial",
            SigningSeverity::Low => "low",
            SigningSeverity::Medium => "medium",
            SigningSeverity::High => "high",
        }
    }
}

impl std::fmt::Display for SigningSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a compatibility finding should be counted in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityType {
    Error,
    Warning,
    Notice,
}

/// Unique identifier of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    pub fn generate() -> Self {
        Uid(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source lines around a finding: the line above, the line itself, the line below.
pub type SourceContext = [Option<String>; 3];

/// A finding as submitted by a check, before the bundle stamps it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Finding {
    /// Hierarchical identifier, e.g. `["javascript", "dangerous_global", "eval"]`.
    pub id: Vec<String>,
    pub message: String,
    pub description: Vec<String>,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub context: Option<SourceContext>,
    pub for_appversions: Option<AppVersions>,
    pub compatibility_type: Option<CompatibilityType>,
    pub signing_severity: Option<SigningSeverity>,
    pub editors_only: bool,
}

impl Finding {
    pub fn new<S: AsRef<str>>(id: &[S], message: impl Into<String>) -> Self {
        Self {
            id: id.iter().map(|s| s.as_ref().to_string()).collect(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, line: impl Into<String>) -> Self {
        self.description.push(line.into());
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    pub fn context(mut self, context: SourceContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn for_appversions(mut self, versions: AppVersions) -> Self {
        self.for_appversions = Some(versions);
        self
    }

    pub fn compatibility(mut self, kind: CompatibilityType) -> Self {
        self.compatibility_type = Some(kind);
        self
    }

    pub fn signing(mut self, severity: SigningSeverity) -> Self {
        self.signing_severity = Some(severity);
        self
    }

    pub fn editors_only(mut self) -> Self {
        self.editors_only = true;
        self
    }
}

/// A record held by the bundle. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub uid: Uid,
    #[serde(rename = "type")]
    pub kind: Severity,
    pub id: Vec<String>,
    pub message: String,
    pub description: Vec<String>,
    /// Containing package chain followed by the file name; empty when the
    /// record is not tied to a file.
    pub file: Vec<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub context: Option<SourceContext>,
    pub tier: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_appversions: Option<AppVersions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_type: Option<CompatibilityType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_severity: Option<SigningSeverity>,
    pub editors_only: bool,
}

impl Diagnostic {
    /// Dotted form of the identifier, handy in logs and assertions.
    pub fn id_str(&self) -> String {
        self.id.join(".")
    }

    /// Check whether the identifier equals the given tuple.
    pub fn has_id(&self, id: &[&str]) -> bool {
        self.id.len() == id.len() && self.id.iter().zip(id).all(|(a, b)| a == b)
    }

    /// File name without the package chain.
    pub fn file_name(&self) -> Option<&str> {
        self.file.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_roundtrip() {
        assert_eq!("Warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("fatal".parse::<Severity>().is_err());
        assert_eq!(Severity::Notice.to_string(), "notice");
    }

    #[test]
    fn test_signing_order() {
        assert!(SigningSeverity::High > SigningSeverity::Medium);
        assert!(SigningSeverity::Low > SigningSeverity::Trivial);
    }

    #[test]
    fn test_finding_builder() {
        let f = Finding::new(&["javascript", "dangerous_global", "eval"], "eval is dangerous")
            .description("avoid it")
            .file("main.js")
            .line(3)
            .signing(SigningSeverity::High);
        assert_eq!(f.id, vec!["javascript", "dangerous_global", "eval"]);
        assert_eq!(f.line, Some(3));
        assert_eq!(f.signing_severity, Some(SigningSeverity::High));
        assert_eq!(f.description.len(), 1);
    }

    #[test]
    fn test_uid_unique() {
        assert_ne!(Uid::generate(), Uid::generate());
    }
}
