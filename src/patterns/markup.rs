//! XUL/HTML checks: script tags and inline event handlers.
//!
//! Script bodies and `on*` attribute values are handed to the JavaScript
//! engine as snippets, padded so their line numbers match the document.

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

use crate::bundle::{ContextGenerator, ErrorBundle, Finding, SigningSeverity};
use crate::js::{self, EngineFault, JsOptions};

lazy_static! {
    static ref SCRIPT: Regex =
        Regex::new(r"(?is)<script\b([^>]*?)(?:/>|>(.*?)</script\s*>)").unwrap();
    static ref SRC: Regex = Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref EVENT_ATTR: Regex =
        Regex::new(r#"(?i)\s(on[a-z]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
    static ref CDATA: Regex = Regex::new(r"<!\[CDATA\[|\]\]>").unwrap();
}

fn is_remote(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("//")
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Place a fragment at its position in the document.
fn padded(line: usize, column: usize, code: &str) -> String {
    let mut out = "\n".repeat(line.saturating_sub(1));
    out.push_str(&" ".repeat(column));
    out.push_str(code);
    out
}

/// Check one markup document.
pub fn test_markup_file(
    bundle: &mut ErrorBundle,
    filename: &str,
    source: &str,
    options: &JsOptions,
) -> Result<(), EngineFault> {
    let lines = ContextGenerator::new(source);
    let snippet = JsOptions {
        snippet: true,
        ..options.clone()
    };
    let mut script_bodies: Vec<Range<usize>> = Vec::new();

    for caps in SCRIPT.captures_iter(source) {
        let (Some(tag), Some(attrs)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(body) = caps.get(2) {
            script_bodies.push(body.range());
        }

        if let Some(src) = SRC.captures(attrs.as_str()).and_then(|c| c.get(1)) {
            if is_remote(src.as_str()) {
                let line = lines.get_line(tag.start());
                let column = lines.get_column(tag.start());
                bundle.warning(
                    Finding::new(&["markup", "script", "remote_src"], "Script loaded from a remote source")
                        .description(format!("`{}` is loaded over the network.", src.as_str()))
                        .file(filename)
                        .line(line)
                        .column(column)
                        .context(lines.get_context(line, column))
                        .signing(SigningSeverity::High),
                );
            }
            continue;
        }

        let Some(body) = caps.get(2) else {
            continue;
        };
        let code = CDATA.replace_all(body.as_str(), |caps: &regex::Captures<'_>| " ".repeat(caps[0].len()));
        if code.trim().is_empty() {
            continue;
        }
        let line = lines.get_line(body.start());
        let column = lines.get_column(body.start());
        js::test_js_file(bundle, filename, &padded(line, column, &code), &snippet)?;
    }

    for caps in EVENT_ATTR.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if script_bodies.iter().any(|r| r.contains(&whole.start())) {
            continue;
        }
        let Some(value) = caps.get(2).or_else(|| caps.get(3)) else {
            continue;
        };
        let code = decode_entities(value.as_str());
        if code.trim().is_empty() {
            continue;
        }
        let line = lines.get_line(value.start());
        let column = lines.get_column(value.start());
        js::test_js_file(bundle, filename, &padded(line, column, &code), &snippet)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> ErrorBundle {
        let mut bundle = ErrorBundle::new();
        test_markup_file(&mut bundle, "content/a.xul", source, &JsOptions::default()).unwrap();
        bundle
    }

    #[test]
    fn test_remote_script_src() {
        let bundle = check(r#"<window><script src="https://cdn.example/x.js"></script></window>"#);
        assert_eq!(bundle.find(&["markup", "script", "remote_src"]).len(), 1);
        let bundle = check(r#"<window><script src="chrome://x/content/x.js"></script></window>"#);
        assert!(bundle.warnings.is_empty());
    }

    #[test]
    fn test_self_closing_script_does_not_swallow_the_next() {
        let bundle = check(
            "<overlay>\n<script src=\"chrome://x/content/a.js\"/>\n<script src=\"http://evil.example/b.js\"></script>\n</overlay>",
        );
        let found = bundle.find(&["markup", "script", "remote_src"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, Some(3));
    }

    #[test]
    fn test_inline_script_is_analysed_in_place() {
        let bundle = check("<window>\n<script><![CDATA[\neval('1');\n]]></script>\n</window>");
        let found = bundle.find(&["javascript", "dangerous_global", "eval"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, Some(3));
    }

    #[test]
    fn test_inline_script_globals_pollute() {
        let bundle = check("<window><script>var a = 1, b = 2, c = 3, d = 4, e = 5;</script></window>");
        assert_eq!(bundle.find(&["javascript", "traverser", "namespace_pollution"]).len(), 1);

        let bundle = check("<window><script>var a = 1, b = 2, c = 3;</script></window>");
        assert!(bundle.find(&["javascript", "traverser", "namespace_pollution"]).is_empty());
    }

    #[test]
    fn test_event_attributes_are_analysed() {
        let bundle = check(r#"<button oncommand="eval(&quot;x&quot;)"/>"#);
        assert_eq!(bundle.find(&["javascript", "dangerous_global", "eval"]).len(), 1);
    }
}
