//! End-to-end scenarios for the JavaScript engine.
//!
//! Each test feeds a script through `test_js_file` and checks the findings
//! recorded in the bundle.

use serde_json::Value;
use xpilint::bundle::versions::{version_range, FIREFOX_GUID};
use xpilint::js::{entities, parse, Traverser};
use xpilint::{test_js_file, ErrorBundle, JsOptions, SigningSeverity};

fn check(source: &str) -> ErrorBundle {
    let mut bundle = ErrorBundle::new();
    check_into(&mut bundle, source);
    bundle
}

fn check_into(bundle: &mut ErrorBundle, source: &str) {
    test_js_file(bundle, "content/test.js", source, &JsOptions::default())
        .expect("script should be analysed");
}

fn pollution(bundle: &ErrorBundle) -> usize {
    bundle
        .find(&["javascript", "traverser", "namespace_pollution"])
        .len()
}

// =============================================================================
// Dangerous globals and setAttribute
// =============================================================================

#[test]
fn test_eval_reports_one_warning() {
    let bundle = check(r#"eval("doEvilStuff()");"#);
    assert_eq!(bundle.find(&["javascript", "dangerous_global", "eval"]).len(), 1);
    assert_eq!(bundle.warnings.len(), 1);
}

#[test]
fn test_set_attribute_only_flags_event_handlers() {
    let bundle = check(r#"x.setAttribute("onclick", "bar");"#);
    assert_eq!(bundle.find(&["javascript", "setAttribute", "setting_on*"]).len(), 1);

    let bundle = check(r#"x.setAttribute("foo", "bar");"#);
    assert!(bundle.warnings.is_empty());
}

// =============================================================================
// XPCOM type propagation
// =============================================================================

#[test]
fn test_create_instance_exposes_interface_members() {
    let source = r#"
        var req = Components.classes[""].createInstance(Components.interfaces.nsIXMLHttpRequest);
        req.open("GET", "http://example.com/data", true);
    "#;
    let tree = parse(source).unwrap();
    let mut bundle = ErrorBundle::new();
    let registry = entities::standard();
    let mut t = Traverser::new(&mut bundle, registry, "a.js", source, JsOptions::default());
    t.run(&tree).unwrap();

    let req = t.global("req").expect("req is declared");
    assert!(registry.resolve(req.hooks, "open").is_some());
    drop(t);
    // a plain-http open on the typed request is recognised
    assert_eq!(bundle.find(&["javascript", "xhr", "insecure_url"]).len(), 1);
}

// =============================================================================
// Preferences
// =============================================================================

#[test]
fn test_banned_pref_write_counts_as_high_signing() {
    let bundle = check(r#"Services.prefs.setCharPref('browser.startup.homepage', '42');"#);
    let found = bundle.find(&["javascript", "preference", "banned_pref_set"]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].signing_severity, Some(SigningSeverity::High));
    assert_eq!(bundle.warnings.len(), 1);
    assert_eq!(bundle.signing_summary.high, 1);
}

#[test]
fn test_standalone_pref_literal_warns() {
    let bundle = check(r#"var name = "browser.startup.homepage";"#);
    assert_eq!(bundle.find(&["javascript", "preference", "literal_pref"]).len(), 1);
    assert_eq!(bundle.warnings.len(), 1);
}

#[test]
fn test_pref_literal_through_variable_warns_twice() {
    let bundle = check(
        r#"
        var name = "browser.startup.homepage";
        Preferences.set(name);
    "#,
    );
    assert_eq!(bundle.find(&["javascript", "preference", "literal_pref"]).len(), 1);
    assert_eq!(bundle.find(&["javascript", "preference", "banned_pref_set"]).len(), 1);
    assert_eq!(bundle.warnings.len(), 2);
}

#[test]
fn test_inline_pref_literal_warns_once() {
    let bundle = check(r#"Preferences.set("browser.startup.homepage");"#);
    assert!(bundle.find(&["javascript", "preference", "literal_pref"]).is_empty());
    assert_eq!(bundle.find(&["javascript", "preference", "banned_pref_set"]).len(), 1);
    assert_eq!(bundle.warnings.len(), 1);
}

#[test]
fn test_pref_reads_are_silent() {
    let bundle = check(r#"Services.prefs.getCharPref("browser.startup.homepage");"#);
    assert!(bundle.warnings.is_empty());
}

// =============================================================================
// Namespace pollution
// =============================================================================

#[test]
fn test_three_globals_are_tolerated() {
    let bundle = check("var a = 1, b = 2;\nc = 3;");
    assert_eq!(pollution(&bundle), 0);
}

#[test]
fn test_four_globals_pollute_once() {
    let bundle = check("var a = 1, b = 2;\nc = 3;\nfunction d() {}\ne = 5;");
    assert_eq!(pollution(&bundle), 1);
}

#[test]
fn test_reads_of_unknown_names_do_not_pollute() {
    let bundle = check("var a = 1;\nfoo(bar, baz, qux);");
    assert_eq!(pollution(&bundle), 0);
}

#[test]
fn test_jetpack_modules_never_pollute() {
    let mut bundle = ErrorBundle::new();
    bundle.set_meta("is_jetpack", Value::Bool(true));
    check_into(&mut bundle, "var a, b, c, d, e;");
    assert_eq!(pollution(&bundle), 0);
}

#[test]
fn test_bootstrapped_addons_never_pollute() {
    let mut bundle = ErrorBundle::new();
    bundle.save_resource("em:bootstrap", Value::Bool(true), true);
    check_into(&mut bundle, "var a, b, c, d, e;");
    assert_eq!(pollution(&bundle), 0);
}

#[test]
fn test_js_modules_never_pollute() {
    let mut bundle = ErrorBundle::new();
    test_js_file(&mut bundle, "modules/a.jsm", "var a, b, c, d, e;", &JsOptions::default()).unwrap();
    assert_eq!(pollution(&bundle), 0);
}

// =============================================================================
// Wildcard entities
// =============================================================================

#[test]
fn test_event_handler_wildcard_matches_any_depth() {
    let bundle = check(r#"foo.onclick = "str";"#);
    assert_eq!(bundle.find(&["javascript", "on_event", "string_assignment"]).len(), 1);

    let bundle = check(r#"bar.baz.onhover = "str";"#);
    assert_eq!(bundle.find(&["javascript", "on_event", "string_assignment"]).len(), 1);
}

#[test]
fn test_event_handler_wildcard_ignores_reads_and_functions() {
    let bundle = check("var handler = foo.onclick;");
    assert!(bundle.find(&["javascript", "on_event", "string_assignment"]).is_empty());

    let bundle = check("foo.onclick = function () {};");
    assert!(bundle.find(&["javascript", "on_event", "string_assignment"]).is_empty());
}

// =============================================================================
// Version gating
// =============================================================================

#[test]
fn test_removed_api_only_reported_for_affected_versions() {
    let source = "var request = mozIndexedDB.open('db');";

    let mut bundle =
        ErrorBundle::new().with_supported_versions(Some(version_range(FIREFOX_GUID, "38.0a1", "38.0")));
    check_into(&mut bundle, source);
    assert_eq!(bundle.find(&["testcases_regex", "javascript", "mozIndexedDB"]).len(), 1);

    let mut bundle =
        ErrorBundle::new().with_supported_versions(Some(version_range(FIREFOX_GUID, "50.0a1", "52.0")));
    check_into(&mut bundle, source);
    assert!(bundle.find(&["testcases_regex", "javascript", "mozIndexedDB"]).is_empty());
}

// =============================================================================
// Robustness
// =============================================================================

#[test]
fn test_cyclic_objects_do_not_hang() {
    let bundle = check("var a = {}; var b = {a: a}; a.b = b; var s = '' + a;");
    assert!(bundle.errors.is_empty());
}

#[test]
fn test_message_tree_tracks_categories() {
    let bundle = check(r#"eval("a"); eval("b"); x.setAttribute("onload", "c");"#);
    let (errors, warnings, notices) = bundle.message_tree.counts(&["javascript"]);
    assert_eq!((errors, warnings, notices), (0, 3, 0));
    assert_eq!(bundle.message_tree.counts(&["javascript", "dangerous_global"]).1, 2);
}
