//! JavaScript analysis.
//!
//! Sources are parsed with tree-sitter and walked by a [`Traverser`], which
//! evaluates each node to a [`JsWrapper`] and consults the entity registry at
//! every member access, assignment and call.
//!
//! ```text
//! source ─► tree-sitter ─► Traverser ─┬─ nodes (dispatch table)
//!                                     ├─ actions / calls
//!                                     ├─ value + operators
//!                                     └─ entities (registry) ─► ErrorBundle
//! ```

pub mod actions;
pub mod calls;
pub mod entities;
pub mod nodes;
pub mod operators;
pub mod traverser;
pub mod value;

pub use traverser::{EngineFault, JsOptions, Traverser, MAX_DEPTH};
pub use value::JsWrapper;

use std::path::Path;
use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, Tree};

use crate::bundle::{ContextGenerator, ErrorBundle, Finding};
use crate::patterns;

/// Module scripts declare their exports by assigning this name.
const EXPORTED_SYMBOLS_QUERY: &str = r#"
(assignment_expression
  left: (identifier) @name
  (#eq? @name "EXPORTED_SYMBOLS"))
(variable_declarator
  name: (identifier) @name
  (#eq? @name "EXPORTED_SYMBOLS"))
"#;

const MODULE_EXTENSIONS: &[&str] = &["jsm", "mjs"];

fn language() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

/// Parse JavaScript source. The tree may contain error nodes.
pub fn parse(source: &str) -> Result<Tree, EngineFault> {
    let mut parser = Parser::new();
    parser
        .set_language(&language())
        .map_err(|e| EngineFault::Parse(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| EngineFault::Parse("parser returned no tree".to_string()))
}

/// Whether a script runs as a module with its own global scope.
pub fn is_module(filename: &str, tree: &Tree, source: &str) -> Result<bool, EngineFault> {
    let by_extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MODULE_EXTENSIONS.contains(&e.to_lowercase().as_str()));
    if by_extension {
        return Ok(true);
    }

    let query = Query::new(&language(), EXPORTED_SYMBOLS_QUERY)
        .map_err(|e| EngineFault::Parse(e.to_string()))?;
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), source.as_bytes());
    while let Some(m) = matches.next() {
        for capture in m.captures {
            if capture.node.utf8_text(source.as_bytes()).unwrap_or("") == "EXPORTED_SYMBOLS" {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// Run every JavaScript check over one file: the raw-source pattern
/// battery, then the traversal engine.
pub fn test_js_file(
    bundle: &mut ErrorBundle,
    filename: &str,
    source: &str,
    options: &JsOptions,
) -> Result<(), EngineFault> {
    let source = source.trim_start_matches('\u{feff}');
    if !options.snippet {
        patterns::test_js_raw(bundle, filename, source);
    }

    let tree = parse(source)?;
    let mut options = options.clone();
    if !options.is_module {
        options.is_module = is_module(filename, &tree, source)?;
    }

    if let Some(error) = first_error(tree.root_node()) {
        let pos = error.start_position();
        let lines = ContextGenerator::new(source);
        bundle.notice(
            Finding::new(&["javascript", "parse", "syntax_error"], "JavaScript syntax error")
                .description(
                    "The file could not be parsed completely; analysis continued over the \
                     recoverable parts.",
                )
                .file(filename)
                .line(pos.row + 1)
                .column(pos.column)
                .context(lines.get_context(pos.row + 1, pos.column)),
        );
    }

    debug!(file = filename, module = options.is_module, "traversing script");
    let mut traverser = Traverser::new(bundle, entities::standard(), filename, source, options);
    traverser.run(&tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::SigningSeverity;

    fn run(source: &str) -> ErrorBundle {
        let mut bundle = ErrorBundle::new();
        test_js_file(&mut bundle, "test.js", source, &JsOptions::default()).unwrap();
        bundle
    }

    fn traverse<'a>(bundle: &'a mut ErrorBundle, source: &'a str, tree: &Tree) -> Traverser<'a> {
        let mut t = Traverser::new(
            bundle,
            entities::standard(),
            "test.js",
            source,
            JsOptions::default(),
        );
        t.run(tree).unwrap();
        t
    }

    #[test]
    fn test_eval_is_flagged_once() {
        let bundle = run(r#"eval("doEvilStuff()");"#);
        let found = bundle.find(&["javascript", "dangerous_global", "eval"]);
        assert_eq!(found.len(), 1);
        assert_eq!(bundle.warnings.len(), 1);
        assert_eq!(found[0].signing_severity, Some(SigningSeverity::High));
    }

    #[test]
    fn test_set_attribute_event_handler() {
        let bundle = run(r#"x.setAttribute("onclick", "bar");"#);
        assert_eq!(bundle.find(&["javascript", "setAttribute", "setting_on*"]).len(), 1);
        let bundle = run(r#"x.setAttribute("foo", "bar");"#);
        assert!(bundle.warnings.is_empty());
    }

    #[test]
    fn test_create_instance_types_result() {
        let source = r#"
            var req = Components.classes[""].createInstance(Components.interfaces.nsIXMLHttpRequest);
            req.open("GET", "https://example.com/", true);
        "#;
        let tree = parse(source).unwrap();
        let mut bundle = ErrorBundle::new();
        let t = traverse(&mut bundle, source, &tree);
        let req = t.global("req").unwrap();
        let open = t.registry.resolve(req.hooks, "open");
        assert!(open.is_some());
        assert_eq!(t.registry.path(open.unwrap()), "Components.interfaces.nsIXMLHttpRequest.open");
    }

    #[test]
    fn test_shortcut_aliases_type_results() {
        let source = r#"
            const Cc = Components.classes, Ci = Components.interfaces;
            let p = Cc["@mozilla.org/process/util;1"].createInstance(Ci.nsIProcess);
            p.run(false, [], 0);
        "#;
        let mut bundle = ErrorBundle::new();
        test_js_file(&mut bundle, "test.js", source, &JsOptions::default()).unwrap();
        let found = bundle.find(&["javascript", "dangerous_global", "run"]);
        assert_eq!(found.len(), 1);
        assert!(bundle.find(&["javascript", "traverser", "global_overwrite"]).is_empty());
    }

    #[test]
    fn test_strict_mode_rejects_retraversal() {
        let source = "var a = 1;";
        let tree = parse(source).unwrap();
        let mut bundle = ErrorBundle::new();
        let options = JsOptions {
            strict: true,
            ..Default::default()
        };
        let mut t = Traverser::new(&mut bundle, entities::standard(), "a.js", source, options);
        t.run(&tree).unwrap();
        let err = t.traverse_node(tree.root_node()).unwrap_err();
        assert!(matches!(err, EngineFault::Retraversal { .. }));
    }

    #[test]
    fn test_retraversal_returns_cached_result() {
        let source = r#"eval("x");"#;
        let tree = parse(source).unwrap();
        let mut bundle = ErrorBundle::new();
        let mut t = traverse(&mut bundle, source, &tree);
        t.traverse_node(tree.root_node()).unwrap();
        drop(t);
        assert_eq!(bundle.warnings.len(), 1);
    }

    #[test]
    fn test_module_detection() {
        let source = "var EXPORTED_SYMBOLS = ['Foo'];";
        let tree = parse(source).unwrap();
        assert!(is_module("lib.js", &tree, source).unwrap());
        let plain = "var exported = 1;";
        let tree = parse(plain).unwrap();
        assert!(!is_module("lib.js", &tree, plain).unwrap());
        assert!(is_module("lib.jsm", &tree, plain).unwrap());
    }

    #[test]
    fn test_syntax_error_is_a_notice() {
        let bundle = run("var = ;\neval('x');");
        assert_eq!(bundle.find(&["javascript", "parse", "syntax_error"]).len(), 1);
    }

    #[test]
    fn test_values_flow_through_variables() {
        let source = r#"
            var tag = "scr" + "ipt";
            var el = document.createElement(tag);
        "#;
        let bundle = run(source);
        assert_eq!(bundle.find(&["javascript", "createElement", "script_creation"]).len(), 1);
    }

    #[test]
    fn test_reading_content_window_warns() {
        let bundle = run("var win = gBrowser.contentWindow;\nwin.alert('hi');");
        assert_eq!(bundle.find(&["javascript", "cpow", "content_window"]).len(), 1);

        let bundle = run("var tabs = gBrowser.tabs;");
        assert!(bundle.find(&["javascript", "cpow", "content_window"]).is_empty());
    }

    #[test]
    fn test_location_may_be_navigated_but_not_replaced() {
        let overwrite = &["javascript", "traverser", "global_overwrite"];
        let bundle = run("location = 'about:blank';\ndocument.location = 'about:home';");
        assert!(bundle.find(overwrite).is_empty());

        let bundle = run("document.location = { href: 'about:blank' };");
        assert_eq!(bundle.find(overwrite).len(), 1);

        let bundle = run("location = 42;");
        assert_eq!(bundle.find(overwrite).len(), 1);
    }
}
