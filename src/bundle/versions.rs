//! Application version sets used to gate compatibility findings.
//!
//! Versions follow the toolkit comparison rules: each dot-separated part is
//! read as `<number-a><string-b><number-c><string-d>`, a missing string part
//! sorts after any present one (so `38.0a1 < 38.0`), and missing parts count
//! as zero.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const FIREFOX_GUID: &str = "{ec8030f7-c20a-464f-9b0e-13a3a9e97384}";
pub const THUNDERBIRD_GUID: &str = "{3550f703-e582-4d05-9a08-453d09bdfdc6}";
pub const SEAMONKEY_GUID: &str = "{92650c4d-4b8e-4d2a-b7eb-24ecf4f6b63a}";
pub const ANDROID_GUID: &str = "{aa3c5121-dab2-40e2-81ca-7ea25febc110}";

const KNOWN_GUIDS: [&str; 4] = [FIREFOX_GUID, THUNDERBIRD_GUID, SEAMONKEY_GUID, ANDROID_GUID];

/// Oldest and newest major versions in the known version table.
const FIRST_MAJOR: u32 = 3;
const LAST_MAJOR: u32 = 60;

/// Map from application GUID to a list of version strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppVersions(pub BTreeMap<String, Vec<String>>);

impl AppVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, app: &str, versions: Vec<String>) {
        let guid = app_guid(app).unwrap_or(app).to_string();
        self.0.entry(guid).or_default().extend(versions);
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_empty())
    }

    /// True if any application shares at least one version with `other`.
    pub fn intersects(&self, other: &AppVersions) -> bool {
        self.0.iter().any(|(guid, mine)| {
            other.0.get(guid).is_some_and(|theirs| {
                mine.iter().any(|a| {
                    theirs
                        .iter()
                        .any(|b| compare_versions(a, b) == Ordering::Equal)
                })
            })
        })
    }

    /// Merge another set into this one.
    pub fn extend(&mut self, other: &AppVersions) {
        for (guid, versions) in &other.0 {
            let entry = self.0.entry(guid.clone()).or_default();
            for v in versions {
                if !entry.contains(v) {
                    entry.push(v.clone());
                }
            }
        }
    }
}

/// A static version window, expanded into an `AppVersions` on demand.
///
/// `from` is inclusive, `to` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGate {
    pub app: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

impl VersionGate {
    pub const fn firefox(from: &'static str, to: &'static str) -> Self {
        Self {
            app: FIREFOX_GUID,
            from,
            to,
        }
    }

    pub fn expand(&self) -> AppVersions {
        version_range(self.app, self.from, self.to)
    }
}

/// Resolve a short application name (`firefox`, `fx`, ...) to its GUID.
pub fn app_guid(name: &str) -> Option<&'static str> {
    match name.to_lowercase().as_str() {
        "firefox" | "fx" => Some(FIREFOX_GUID),
        "thunderbird" | "tb" => Some(THUNDERBIRD_GUID),
        "seamonkey" | "sm" => Some(SEAMONKEY_GUID),
        "android" | "fennec" => Some(ANDROID_GUID),
        _ => KNOWN_GUIDS.into_iter().find(|g| *g == name),
    }
}

/// Every version in the known table for any application.
pub fn known_versions() -> Vec<String> {
    let mut versions = Vec::new();
    for major in FIRST_MAJOR..=LAST_MAJOR {
        versions.push(format!("{}.0a1", major));
        versions.push(format!("{}.0a2", major));
        versions.push(format!("{}.0", major));
        versions.push(format!("{}.0.1", major));
    }
    versions
}

/// All known versions of `app` in `[from, to)`.
pub fn version_range(app: &str, from: &str, to: &str) -> AppVersions {
    let mut result = AppVersions::new();
    let Some(guid) = app_guid(app) else {
        return result;
    };
    let versions = known_versions()
        .into_iter()
        .filter(|v| {
            compare_versions(v, from) != Ordering::Less
                && compare_versions(v, to) == Ordering::Less
        })
        .collect();
    result.0.insert(guid.to_string(), versions);
    result
}

/// One parsed dot-separated version part.
#[derive(Debug, PartialEq, Eq)]
struct VersionPart {
    a: i64,
    b: String,
    c: i64,
    d: String,
}

fn parse_part(part: &str) -> VersionPart {
    if part == "*" {
        return VersionPart {
            a: i64::MAX,
            b: String::new(),
            c: 0,
            d: String::new(),
        };
    }

    fn take_number(s: &str) -> (i64, &str) {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        (s[..end].parse().unwrap_or(0), &s[end..])
    }
    fn take_string(s: &str) -> (String, &str) {
        let end = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
        (s[..end].to_string(), &s[end..])
    }

    let (a, rest) = take_number(part);
    let (b, rest) = take_string(rest);
    let (c, rest) = take_number(rest);
    // "1.0+" means "1.1pre"
    if b == "+" {
        return VersionPart {
            a: a + 1,
            b: "pre".to_string(),
            c: 0,
            d: String::new(),
        };
    }
    VersionPart {
        a,
        b,
        c,
        d: rest.to_string(),
    }
}

fn compare_strings(x: &str, y: &str) -> Ordering {
    match (x.is_empty(), y.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.cmp(y),
    }
}

/// Compare two version strings with toolkit semantics.
pub fn compare_versions(x: &str, y: &str) -> Ordering {
    let xs: Vec<&str> = x.split('.').collect();
    let ys: Vec<&str> = y.split('.').collect();
    let len = xs.len().max(ys.len());
    for i in 0..len {
        let px = parse_part(xs.get(i).copied().unwrap_or("0"));
        let py = parse_part(ys.get(i).copied().unwrap_or("0"));
        let ord = px
            .a
            .cmp(&py.a)
            .then_with(|| compare_strings(&px.b, &py.b))
            .then_with(|| px.c.cmp(&py.c))
            .then_with(|| compare_strings(&px.d, &py.d));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
