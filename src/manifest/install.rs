//! Checks over the install manifest (`install.rdf`).

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use super::rdf::{em, RdfObject, RdfParser, EM_NS, INSTALL_ROOT};
use crate::bundle::versions::compare_versions;
use crate::bundle::{ErrorBundle, Finding, PackageType, SigningSeverity};
use crate::config::Overrides;

const FILE: &str = "install.rdf";

const REQUIRED: &[&str] = &["id", "version", "name", "targetApplication"];

/// Predicates that may appear more than once.
const REPEATABLE: &[&str] = &[
    "targetApplication",
    "localized",
    "developer",
    "translator",
    "contributor",
    "targetPlatform",
    "requires",
    "file",
    "otherAuthors",
];

/// Predicates understood on the root description besides the required ones.
const KNOWN: &[&str] = &[
    "type",
    "description",
    "creator",
    "homepageURL",
    "iconURL",
    "icon64URL",
    "optionsURL",
    "optionsType",
    "aboutURL",
    "updateURL",
    "updateKey",
    "bootstrap",
    "unpack",
    "skinnable",
    "strictCompatibility",
    "multiprocessCompatible",
    "hasEmbeddedWebExtension",
    "internalName",
    "hidden",
];

lazy_static! {
    static ref ADDON_ID: Regex = Regex::new(
        r"(?i)^(\{[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\}|[a-z0-9\-._]*@[a-z0-9\-._]+)$"
    )
    .unwrap();
    static ref VERSION: Regex = Regex::new(r"^[-+*.\w]{1,32}$").unwrap();
}

fn finding(test: &str, name: &str, message: impl Into<String>, line: Option<usize>) -> Finding {
    let mut finding = Finding::new(&["testcases_installrdf", test, name], message).file(FILE);
    if let Some(line) = line {
        finding = finding.line(line);
    }
    finding
}

/// Run the install manifest tests. Returns the type declared by `em:type`.
pub fn test_install_rdf(
    bundle: &mut ErrorBundle,
    rdf: &RdfParser,
    overrides: &Overrides,
) -> Option<PackageType> {
    if !rdf.has_subject(INSTALL_ROOT) {
        bundle.error(
            finding("_test_rdf", "no_root", "Install manifest has no add-on description", None)
                .description(format!("No description with `about=\"{}\"` was found.", INSTALL_ROOT)),
        );
        return None;
    }

    test_predicates(bundle, rdf, overrides);
    test_id(bundle, rdf);
    test_version(bundle, rdf);
    test_target_applications(bundle, rdf, overrides);

    for key in ["name", "id", "version", "description"] {
        if let Some(value) = rdf.literal(INSTALL_ROOT, &em(key)) {
            bundle.set_meta(key, json!(value));
        }
    }

    if rdf.literal(INSTALL_ROOT, &em("bootstrap")) == Some("true") {
        debug!("bootstrapped add-on");
        bundle.save_resource("em:bootstrap", Value::Bool(true), true);
    }

    let declared = rdf
        .literal(INSTALL_ROOT, &em("type"))
        .and_then(PackageType::from_em_type);
    if let Some(kind) = declared {
        debug!(kind = kind.as_str(), "install manifest declares type");
    }
    declared
}

fn test_predicates(bundle: &mut ErrorBundle, rdf: &RdfParser, overrides: &Overrides) {
    let mut seen: HashSet<&str> = HashSet::new();
    for triple in rdf.predicates(INSTALL_ROOT) {
        let Some(local) = triple.predicate.strip_prefix(EM_NS) else {
            continue;
        };
        let first = seen.insert(local);
        if !first && !REPEATABLE.contains(&local) {
            bundle.error(
                finding("_test_rdf", "duplicate_element", format!("Duplicate `em:{}` element", local), Some(triple.line))
                    .description("This element may only appear once in the install manifest."),
            );
        }
        if first && !REQUIRED.contains(&local) && !REPEATABLE.contains(&local) && !KNOWN.contains(&local) {
            bundle.notice(
                finding("_test_rdf", "unrecognized_element", format!("Unrecognized `em:{}` element", local), Some(triple.line))
                    .description("The element is not part of the install manifest format and is ignored."),
            );
        }
        match local {
            "hidden" => {
                bundle.error(
                    finding("_test_rdf", "hidden", "Add-ons may not be hidden", Some(triple.line))
                        .description("`em:hidden` hides the add-on from the add-ons manager.")
                        .signing(SigningSeverity::Medium),
                );
            }
            "updateURL" | "updateKey" => {
                bundle.warning(
                    finding("_test_rdf", "update_url", format!("`em:{}` is not allowed", local), Some(triple.line))
                        .description("Hosted add-ons are updated by the hosting site.")
                        .signing(SigningSeverity::Low),
                );
            }
            _ => {}
        }
    }

    let missing: Vec<&str> = REQUIRED
        .iter()
        .copied()
        .filter(|name| !(overrides.ignore_empty_name && *name == "name"))
        .filter(|name| {
            rdf.literal(INSTALL_ROOT, &em(name))
                .map_or(true, str::is_empty)
        })
        .collect();
    if !missing.is_empty() {
        bundle.error(
            finding("_test_rdf", "missing_addon", "Missing elements in install manifest", None)
                .description("Some elements required by the install manifest are missing.")
                .description(format!("Missing elements: {}", missing.join(", "))),
        );
    }
}

fn test_id(bundle: &mut ErrorBundle, rdf: &RdfParser) {
    let Some(id) = rdf.literal(INSTALL_ROOT, &em("id")) else {
        return;
    };
    if id.is_empty() || ADDON_ID.is_match(id) {
        return;
    }
    bundle.error(
        finding("_test_id", "invalid", "Invalid add-on ID", line_of(rdf, "id"))
            .description(format!("`{}` is neither a GUID nor an email-style ID.", id)),
    );
}

fn test_version(bundle: &mut ErrorBundle, rdf: &RdfParser) {
    let Some(version) = rdf.literal(INSTALL_ROOT, &em("version")) else {
        return;
    };
    if version.is_empty() || VERSION.is_match(version) {
        return;
    }
    bundle.warning(
        finding("_test_version", "invalid_format", "Malformed version string", line_of(rdf, "version"))
            .description(format!(
                "`{}` should contain at most 32 letters, digits and `.+-*_` characters.",
                version
            )),
    );
}

fn test_target_applications(bundle: &mut ErrorBundle, rdf: &RdfParser, overrides: &Overrides) {
    let mut applications = Map::new();
    for object in rdf.get_objects(INSTALL_ROOT, &em("targetApplication")) {
        let RdfObject::Node(app) = object else {
            continue;
        };
        let Some(guid) = rdf.literal(app, &em("id")) else {
            continue;
        };
        let min = overrides
            .targetapp_min_version
            .get(guid)
            .map(String::as_str)
            .or_else(|| rdf.literal(app, &em("minVersion")));
        let max = overrides
            .targetapp_max_version
            .get(guid)
            .map(String::as_str)
            .or_else(|| rdf.literal(app, &em("maxVersion")));

        match (min, max) {
            (Some(min), Some(max)) => {
                if compare_versions(min, max) == Ordering::Greater {
                    bundle.error(
                        finding("_test_targetapplication", "invalid_min_max", "Minimum version above maximum", None)
                            .description(format!("`{}` requires {} but allows at most {}.", guid, min, max)),
                    );
                }
            }
            _ => {
                bundle.warning(
                    finding("_test_targetapplication", "missing_minmax", "Incomplete target application", None)
                        .description(format!("`{}` needs both `em:minVersion` and `em:maxVersion`.", guid)),
                );
            }
        }
        applications.insert(guid.to_string(), json!({ "min_version": min, "max_version": max }));
    }
    if !applications.is_empty() {
        bundle.set_meta("applications", Value::Object(applications));
    }
}

fn line_of(rdf: &RdfParser, local: &str) -> Option<usize> {
    let predicate = em(local);
    rdf.predicates(INSTALL_ROOT)
        .find(|t| t.predicate == predicate)
        .map(|t| t.line)
}
