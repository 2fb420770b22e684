//! Stylesheet checks.

use lazy_static::lazy_static;
use regex::Regex;

use crate::bundle::{ContextGenerator, ErrorBundle, Finding, SigningSeverity};

lazy_static! {
    static ref MOZ_BINDING: Regex =
        Regex::new(r#"(?i)-moz-binding\s*:\s*url\(\s*["']?([^"')\s]*)"#).unwrap();
    static ref COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("//")
}

/// Blank out comments, keeping newlines so offsets still map to lines.
fn strip_comments(source: &str) -> String {
    COMMENT
        .replace_all(source, |caps: &regex::Captures<'_>| {
            caps[0]
                .chars()
                .map(|c| if c == '\n' { '\n' } else { ' ' })
                .collect::<String>()
        })
        .into_owned()
}

/// Check one stylesheet.
pub fn test_css_file(bundle: &mut ErrorBundle, filename: &str, source: &str) {
    let source = strip_comments(source);
    let lines = ContextGenerator::new(&source);
    for caps in MOZ_BINDING.captures_iter(&source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let url = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let line = lines.get_line(whole.start());
        let column = lines.get_column(whole.start());
        let context = lines.get_context(line, column);

        if is_remote(url) {
            bundle.warning(
                Finding::new(&["testcases_css", "-moz-binding", "remote"], "Remote XBL binding")
                    .description(format!("`{}` loads an XBL binding from the network.", url))
                    .file(filename)
                    .line(line)
                    .column(column)
                    .context(context)
                    .signing(SigningSeverity::High),
            );
        } else {
            bundle.notice(
                Finding::new(&["testcases_css", "-moz-binding", "used"], "Use of `-moz-binding`")
                    .description("XBL bindings are deprecated and will be removed.")
                    .file(filename)
                    .line(line)
                    .column(column)
                    .context(context),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_binding_warns() {
        let mut bundle = ErrorBundle::new();
        test_css_file(
            &mut bundle,
            "skin/a.css",
            "a {\n  -moz-binding: url('http://evil.example/b.xml#x');\n}",
        );
        assert_eq!(bundle.warnings.len(), 1);
        assert_eq!(bundle.warnings[0].line, Some(2));
        assert_eq!(bundle.signing_summary.high, 1);
    }

    #[test]
    fn test_local_binding_is_notice() {
        let mut bundle = ErrorBundle::new();
        test_css_file(&mut bundle, "a.css", "b { -moz-binding: url(chrome://x/content/b.xml#y) }");
        assert!(bundle.warnings.is_empty());
        assert_eq!(bundle.notices.len(), 1);
    }

    #[test]
    fn test_commented_binding_ignored() {
        let mut bundle = ErrorBundle::new();
        test_css_file(&mut bundle, "a.css", "/* -moz-binding: url(http://x/y) */\nb {}");
        assert!(bundle.messages().next().is_none());
    }
}
