use super::RegexTest;
use crate::bundle::{CompatibilityType, SigningSeverity, VersionGate};

const FX38: VersionGate = VersionGate::firefox("38.0a1", "39.0a1");
const FX44: VersionGate = VersionGate::firefox("44.0a1", "45.0a1");
const FX48: VersionGate = VersionGate::firefox("48.0a1", "49.0a1");

/// Patterns searched for in the raw text of every script.
pub(super) static JS_RAW: &[RegexTest] = &[
    RegexTest::warning(
        r"\bmozIndexedDB\b",
        &["testcases_regex", "javascript", "mozIndexedDB"],
        "`mozIndexedDB` has been removed",
    )
    .describe("Use the unprefixed `indexedDB` instead.")
    .compat(CompatibilityType::Error, FX38),
    RegexTest::notice(
        r"\b__define[GS]etter__\b",
        &["testcases_regex", "javascript", "define_accessor"],
        "Deprecated accessor definition",
    )
    .describe("Use `Object.defineProperty` instead of `__defineGetter__`/`__defineSetter__`."),
    RegexTest::error(
        r#"loadSubScript\(\s*["']https?://"#,
        &["testcases_regex", "javascript", "remote_subscript"],
        "Loading a script from a remote source",
    )
    .describe("All code run with chrome privileges must ship inside the package.")
    .signing(SigningSeverity::High),
    RegexTest::warning(
        r"\bgBrowser\.contentDocument\b|\bcontent\.document\b",
        &["testcases_regex", "javascript", "content_document"],
        "Direct access to content documents",
    )
    .describe("Content documents live in a separate process; use a frame script.")
    .compat(CompatibilityType::Warning, FX48),
    RegexTest::notice(
        r"\bnsIDOMWindowInternal\b",
        &["testcases_regex", "javascript", "nsIDOMWindowInternal"],
        "`nsIDOMWindowInternal` no longer exists",
    )
    .describe("Use `nsIDOMWindow`."),
    RegexTest::warning(
        r"\bmozRequestAnimationFrame\b",
        &["testcases_regex", "javascript", "mozRequestAnimationFrame"],
        "Prefixed `mozRequestAnimationFrame` has been removed",
    )
    .describe("Use the unprefixed `requestAnimationFrame`.")
    .compat(CompatibilityType::Error, FX44),
];

/// Patterns tested against the decoded content of each string literal.
pub(super) static STRING_LITERALS: &[RegexTest] = &[
    RegexTest::warning(
        r"(?i)^(https?:)?//[^\s]+\.js(\?.*)?$",
        &["testcases_regex", "string", "remote_script"],
        "Reference to a remote script",
    )
    .describe("Scripts must be loaded from the package, not from the network.")
    .signing(SigningSeverity::High),
    RegexTest::notice(
        r"^resource://gre/modules/devtools/",
        &["testcases_regex", "string", "devtools_modules"],
        "Developer tools modules have moved",
    )
    .describe("Modules under `resource://gre/modules/devtools/` moved to `resource://devtools/`.")
    .compat(CompatibilityType::Warning, FX44),
    RegexTest::warning(
        r"^chrome://browser/content/browser\.xul$",
        &["testcases_regex", "string", "browser_xul"],
        "Reference to the main browser window document",
    )
    .describe("Overlaying or loading `browser.xul` directly is unsupported.")
    .editors_only(),
];
