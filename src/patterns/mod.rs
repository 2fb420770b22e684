//! Regex batteries tested against raw files and string literals.
//!
//! Each battery is glommed into one [`RegexSet`] so a line (or literal) is
//! scanned once; only the members that hit are re-run individually to find
//! match positions.

mod batteries;
pub mod css;
pub mod markup;

use lazy_static::lazy_static;
use regex::{Regex, RegexSet};
use tracing::trace;

use crate::bundle::{
    CompatibilityType, ContextGenerator, ErrorBundle, Finding, Severity, SigningSeverity,
    VersionGate,
};

/// One pattern with the diagnostic it raises.
#[derive(Debug, Clone, Copy)]
pub struct RegexTest {
    pub pattern: &'static str,
    pub id: &'static [&'static str],
    pub severity: Severity,
    pub message: &'static str,
    pub description: Option<&'static str>,
    pub signing: Option<SigningSeverity>,
    pub compatibility: Option<(CompatibilityType, VersionGate)>,
    pub editors_only: bool,
}

impl RegexTest {
    const fn new(
        severity: Severity,
        pattern: &'static str,
        id: &'static [&'static str],
        message: &'static str,
    ) -> Self {
        Self {
            pattern,
            id,
            severity,
            message,
            description: None,
            signing: None,
            compatibility: None,
            editors_only: false,
        }
    }

    pub const fn warning(pattern: &'static str, id: &'static [&'static str], message: &'static str) -> Self {
        Self::new(Severity::Warning, pattern, id, message)
    }

    pub const fn notice(pattern: &'static str, id: &'static [&'static str], message: &'static str) -> Self {
        Self::new(Severity::Notice, pattern, id, message)
    }

    pub const fn error(pattern: &'static str, id: &'static [&'static str], message: &'static str) -> Self {
        Self::new(Severity::Error, pattern, id, message)
    }

    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub const fn signing(mut self, severity: SigningSeverity) -> Self {
        self.signing = Some(severity);
        self
    }

    /// Only report while the validated versions overlap `gate`.
    pub const fn compat(mut self, kind: CompatibilityType, gate: VersionGate) -> Self {
        self.compatibility = Some((kind, gate));
        self
    }

    pub const fn editors_only(mut self) -> Self {
        self.editors_only = true;
        self
    }

    /// Add this test's optional fields to a finding.
    pub fn decorate(&self, mut finding: Finding) -> Finding {
        if let Some(description) = self.description {
            finding = finding.description(description);
        }
        if let Some(signing) = self.signing {
            finding = finding.signing(signing);
        }
        if let Some((kind, gate)) = self.compatibility {
            finding = finding.compatibility(kind).for_appversions(gate.expand());
        }
        if self.editors_only {
            finding = finding.editors_only();
        }
        finding
    }
}

/// A compiled set of tests.
pub struct RegexBattery {
    tests: &'static [RegexTest],
    set: RegexSet,
    regexes: Vec<Regex>,
}

impl RegexBattery {
    pub fn new(tests: &'static [RegexTest]) -> Result<Self, regex::Error> {
        let set = RegexSet::new(tests.iter().map(|t| t.pattern))?;
        let regexes = tests
            .iter()
            .map(|t| Regex::new(t.pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            tests,
            set,
            regexes,
        })
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Tests matching anywhere in `text`.
    pub fn matching(&self, text: &str) -> Vec<&'static RegexTest> {
        let tests = self.tests;
        self.set
            .matches(text)
            .into_iter()
            .map(|i| &tests[i])
            .collect()
    }

    /// Scan a file line by line, reporting every match.
    pub fn run(&self, bundle: &mut ErrorBundle, filename: &str, text: &str) {
        let lines = ContextGenerator::new(text);
        for (index, line) in text.lines().enumerate() {
            let hits = self.set.matches(line);
            if !hits.matched_any() {
                continue;
            }
            let line_number = index + 1;
            for i in hits.into_iter() {
                let test = &self.tests[i];
                for m in self.regexes[i].find_iter(line) {
                    trace!(file = filename, line = line_number, pattern = test.pattern, "pattern hit");
                    let finding = test.decorate(
                        Finding::new(test.id, test.message)
                            .file(filename)
                            .line(line_number)
                            .column(m.start())
                            .context(lines.get_context(line_number, m.start())),
                    );
                    bundle.push(test.severity, finding);
                }
            }
        }
    }
}

lazy_static! {
    static ref JS_RAW: RegexBattery = RegexBattery::new(batteries::JS_RAW).unwrap();
    static ref STRING_LITERALS: RegexBattery = RegexBattery::new(batteries::STRING_LITERALS).unwrap();
}

/// Run the raw-source battery over a script.
pub fn test_js_raw(bundle: &mut ErrorBundle, filename: &str, source: &str) {
    JS_RAW.run(bundle, filename, source);
}

/// Tests a string literal's decoded content matches.
pub fn string_literal_matches(literal: &str) -> Vec<&'static RegexTest> {
    if literal.is_empty() {
        return Vec::new();
    }
    STRING_LITERALS.matching(literal)
}
