//! Dispatch table mapping tree-sitter node kinds to traversal behavior.

use phf::phf_map;
use tree_sitter::Node;

use super::actions;
use super::calls;
use super::traverser::{EngineFault, Traverser};
use super::value::JsWrapper;

/// Produces a node's value in place of generic branch traversal.
pub type Action = fn(&mut Traverser<'_>, Node<'_>) -> Result<JsWrapper, EngineFault>;

/// How the traverser handles one node kind.
#[derive(Clone, Copy)]
pub struct NodeDefinition {
    /// Fields to recurse into, in order; `*` means every named child.
    pub branches: &'static [&'static str],
    /// Opens a function-like scope.
    pub dynamic: bool,
    /// Opens a block scope.
    pub is_block: bool,
    pub action: Option<Action>,
    /// Whether the node's value is passed to its parent.
    pub returns: bool,
}

const ALL: &[&str] = &["*"];

const fn statement(branches: &'static [&'static str]) -> NodeDefinition {
    NodeDefinition {
        branches,
        dynamic: false,
        is_block: false,
        action: None,
        returns: false,
    }
}

const fn block(branches: &'static [&'static str]) -> NodeDefinition {
    NodeDefinition {
        branches,
        dynamic: false,
        is_block: true,
        action: None,
        returns: false,
    }
}

const fn expression(action: Action) -> NodeDefinition {
    NodeDefinition {
        branches: ALL,
        dynamic: false,
        is_block: false,
        action: Some(action),
        returns: true,
    }
}

const fn control(action: Action) -> NodeDefinition {
    NodeDefinition {
        branches: ALL,
        dynamic: false,
        is_block: false,
        action: Some(action),
        returns: false,
    }
}

const fn scoped(action: Action, dynamic: bool, returns: bool) -> NodeDefinition {
    NodeDefinition {
        branches: ALL,
        dynamic,
        is_block: !dynamic,
        action: Some(action),
        returns,
    }
}

const fn passthrough() -> NodeDefinition {
    NodeDefinition {
        branches: ALL,
        dynamic: false,
        is_block: false,
        action: None,
        returns: true,
    }
}

static NODES: phf::Map<&'static str, NodeDefinition> = phf_map! {
    // statements
    "program" => statement(ALL),
    "expression_statement" => statement(ALL),
    "statement_block" => block(ALL),
    "if_statement" => control(actions::if_statement),
    "else_clause" => statement(ALL),
    "while_statement" => statement(&["condition", "body"]),
    "do_statement" => statement(&["body", "condition"]),
    "for_statement" => block(&["initializer", "condition", "increment", "body"]),
    "for_in_statement" => scoped(actions::for_in, false, false),
    "try_statement" => statement(&["body", "handler", "finalizer"]),
    "catch_clause" => scoped(actions::catch_clause, false, false),
    "finally_clause" => statement(&["body"]),
    "switch_statement" => statement(&["value", "body"]),
    "switch_body" => block(ALL),
    "switch_case" => statement(&["value", "body"]),
    "switch_default" => statement(&["body"]),
    "with_statement" => block(&["object", "body"]),
    "labeled_statement" => statement(&["body"]),
    "return_statement" => statement(ALL),
    "throw_statement" => statement(ALL),
    "break_statement" => statement(&[]),
    "continue_statement" => statement(&[]),
    "debugger_statement" => statement(&[]),
    "empty_statement" => statement(&[]),
    "export_statement" => statement(&["declaration", "value"]),
    "import_statement" => control(actions::import_statement),
    "variable_declaration" => expression(actions::variable_declaration),
    "lexical_declaration" => expression(actions::lexical_declaration),

    // functions and classes
    "function_declaration" => scoped(actions::function_declaration, true, true),
    "generator_function_declaration" => scoped(actions::function_declaration, true, true),
    "function_expression" => scoped(actions::function_expression, true, true),
    "function" => scoped(actions::function_expression, true, true),
    "generator_function" => scoped(actions::function_expression, true, true),
    "arrow_function" => scoped(actions::arrow_function, true, true),
    "method_definition" => scoped(actions::method_definition, true, true),
    "class_declaration" => expression(actions::class_declaration),
    "class" => expression(actions::class_expression),
    "class_heritage" => passthrough(),
    "class_body" => block(ALL),
    "field_definition" => statement(&["value"]),
    "class_static_block" => block(&["body"]),

    // literals
    "identifier" => expression(actions::identifier),
    "this" => expression(actions::this),
    "super" => expression(actions::dirty),
    "number" => expression(actions::number),
    "string" => expression(actions::string),
    "template_string" => expression(actions::template_string),
    "regex" => expression(actions::regex),
    "true" => expression(actions::boolean),
    "false" => expression(actions::boolean),
    "null" => expression(actions::null),
    "undefined" => expression(actions::undefined),
    "object" => expression(actions::object),
    "array" => expression(actions::array),

    // expressions
    "assignment_expression" => expression(actions::assignment),
    "augmented_assignment_expression" => expression(actions::augmented_assignment),
    "update_expression" => expression(actions::update),
    "binary_expression" => expression(actions::binary),
    "unary_expression" => expression(actions::unary),
    "ternary_expression" => expression(actions::ternary),
    "parenthesized_expression" => passthrough(),
    "sequence_expression" => passthrough(),
    "template_substitution" => passthrough(),
    "computed_property_name" => passthrough(),
    "spread_element" => expression(actions::dirty),
    "await_expression" => expression(actions::dirty),
    "yield_expression" => expression(actions::dirty),
    "call_expression" => expression(calls::call_expression),
    "new_expression" => expression(calls::new_expression),
    "member_expression" => expression(calls::member_expression),
    "subscript_expression" => expression(calls::subscript_expression),

    // error recovery keeps whatever the parser salvaged
    "ERROR" => statement(ALL),
};

/// Look up the handling for a node kind.
pub fn definition(kind: &str) -> Option<&'static NodeDefinition> {
    NODES.get(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_kinds_are_dynamic() {
        for kind in ["function_declaration", "function_expression", "arrow_function", "method_definition"] {
            let def = definition(kind).unwrap();
            assert!(def.dynamic, "{}", kind);
            assert!(!def.is_block, "{}", kind);
        }
    }

    #[test]
    fn test_blocks() {
        assert!(definition("statement_block").unwrap().is_block);
        assert!(definition("catch_clause").unwrap().is_block);
        assert!(!definition("if_statement").unwrap().is_block);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(definition("jsx_element").is_none());
    }
}
