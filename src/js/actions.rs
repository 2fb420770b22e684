//! Node actions: declarations, literals and expressions.
//!
//! Member access, calls and assignment targets live in `calls`.

use tree_sitter::Node;

use super::calls::{self, LValue};
use super::entities;
use super::operators;
use super::traverser::{DeclKind, EngineFault, Traverser};
use super::value::{number_to_string, str_to_float, JsWrapper, Literal, Value};
use crate::patterns;

type ActionResult = Result<JsWrapper, EngineFault>;

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn new_function(t: &mut Traverser<'_>) -> JsWrapper {
    let id = t.heap.new_object();
    JsWrapper::function(id)
}

// -------------------------------------------------------------------------
// Literals
// -------------------------------------------------------------------------

pub fn identifier(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let name = t.text(node);
    Ok(match name {
        "undefined" => JsWrapper::undefined(),
        "NaN" => JsWrapper::number(f64::NAN),
        "Infinity" => JsWrapper::number(f64::INFINITY),
        _ => t.seek_variable(name, node),
    })
}

pub fn this(t: &mut Traverser<'_>, _node: Node<'_>) -> ActionResult {
    Ok(t.this_value())
}

/// Traverse children for their side effects; the value is unknown.
pub fn dirty(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    t.traverse_branches(node, &["*"])?;
    Ok(JsWrapper::dirty())
}

pub fn boolean(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    Ok(JsWrapper::boolean(t.text(node) == "true"))
}

pub fn null(_t: &mut Traverser<'_>, _node: Node<'_>) -> ActionResult {
    Ok(JsWrapper::null())
}

pub fn undefined(_t: &mut Traverser<'_>, _node: Node<'_>) -> ActionResult {
    Ok(JsWrapper::undefined())
}

pub fn regex(t: &mut Traverser<'_>, _node: Node<'_>) -> ActionResult {
    let id = t.heap.new_object();
    Ok(JsWrapper::object(id))
}

pub fn number(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    Ok(JsWrapper::number(parse_number_literal(t.text(node))))
}

/// Numeric literal source text to its value.
pub fn parse_number_literal(text: &str) -> f64 {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let cleaned = cleaned.strip_suffix('n').unwrap_or(&cleaned);
    // legacy octal: 017
    if cleaned.len() > 1
        && cleaned.starts_with('0')
        && cleaned.chars().all(|c| ('0'..='7').contains(&c))
    {
        return u64::from_str_radix(&cleaned[1..], 8)
            .map(|v| v as f64)
            .unwrap_or(f64::NAN);
    }
    str_to_float(cleaned)
}

pub fn string(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let content = string_content(t, node);
    let mut value = JsWrapper::string(content.clone());
    value.provisional = entities::check_pref_literal(t, &content, node);
    for test in patterns::string_literal_matches(&content) {
        let finding = test.decorate(t.finding(test.id, test.message, node));
        t.bundle.push(test.severity, finding);
    }
    Ok(value)
}

/// Decoded content of a string literal node.
pub fn string_content(t: &Traverser<'_>, node: Node<'_>) -> String {
    let start = node.start_byte() + 1;
    let end = node.end_byte().saturating_sub(1);
    if end <= start {
        return String::new();
    }
    let mut out = String::new();
    let mut pos = start;
    for child in named_children(node) {
        if child.kind() != "escape_sequence" {
            continue;
        }
        out.push_str(t.slice(pos, child.start_byte()));
        out.push_str(&decode_escape(t.text(child)));
        pos = child.end_byte();
    }
    out.push_str(t.slice(pos, end));
    out
}

/// Decode one backslash escape sequence.
pub fn decode_escape(seq: &str) -> String {
    let body = seq.strip_prefix('\\').unwrap_or(seq);
    let mut chars = body.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest = chars.as_str();
    let from_hex = |digits: &str| {
        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
    };
    let decoded = match first {
        'n' => Some("\n".to_string()),
        't' => Some("\t".to_string()),
        'r' => Some("\r".to_string()),
        'b' => Some("\u{8}".to_string()),
        'f' => Some("\u{c}".to_string()),
        'v' => Some("\u{b}".to_string()),
        '\n' | '\r' | '\u{2028}' | '\u{2029}' => Some(String::new()),
        'x' => from_hex(rest),
        'u' => match rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            Some(braced) => from_hex(braced),
            None => from_hex(rest),
        },
        '0'..='7' => u32::from_str_radix(body, 8)
            .ok()
            .and_then(char::from_u32)
            .map(String::from),
        _ => None,
    };
    decoded.unwrap_or_else(|| body.to_string())
}

pub fn template_string(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let start = node.start_byte() + 1;
    let end = node.end_byte().saturating_sub(1).max(start);
    let mut out = String::new();
    let mut pos = start;
    let mut dirty = false;
    for child in named_children(node) {
        match child.kind() {
            "template_substitution" => {
                out.push_str(t.slice(pos, child.start_byte()));
                let value = t.traverse_node(child)?;
                if value.is_dirty() {
                    dirty = true;
                } else {
                    out.push_str(&value.as_str(&t.heap));
                }
                pos = child.end_byte();
            }
            "escape_sequence" => {
                out.push_str(t.slice(pos, child.start_byte()));
                out.push_str(&decode_escape(t.text(child)));
                pos = child.end_byte();
            }
            _ => {}
        }
    }
    out.push_str(t.slice(pos, end));
    if dirty {
        return Ok(JsWrapper {
            value: Value::Literal(Literal::String(out)),
            dirty: true,
            ..Default::default()
        });
    }
    Ok(JsWrapper::string(out))
}

fn property_key(t: &mut Traverser<'_>, key: Node<'_>) -> Result<String, EngineFault> {
    Ok(match key.kind() {
        "string" => string_content(t, key),
        "number" => number_to_string(parse_number_literal(t.text(key))),
        "computed_property_name" => {
            let value = t.traverse_node(key)?;
            if value.is_dirty() {
                "*".to_string()
            } else {
                value.as_str(&t.heap)
            }
        }
        _ => t.text(key).to_string(),
    })
}

pub fn object(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let id = t.heap.new_object();
    for child in named_children(node) {
        match child.kind() {
            "pair" => {
                let Some(key) = child.child_by_field_name("key") else {
                    continue;
                };
                let name = property_key(t, key)?;
                let value = match child.child_by_field_name("value") {
                    Some(v) => t.traverse_node(v)?,
                    None => JsWrapper::undefined(),
                };
                t.heap.set(id, &name, value);
            }
            "shorthand_property_identifier" => {
                let name = t.text(child);
                let value = t.seek_variable(name, child);
                t.heap.set(id, name, value);
            }
            "method_definition" => {
                let value = t.traverse_node(child)?;
                if let Some(key) = child.child_by_field_name("name") {
                    let name = property_key(t, key)?;
                    t.heap.set(id, &name, value);
                }
            }
            _ => {
                t.traverse_node(child)?;
            }
        }
    }
    Ok(JsWrapper::object(id))
}

pub fn array(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let mut elements = Vec::new();
    for child in named_children(node) {
        if child.kind() == "comment" {
            continue;
        }
        let value = t.traverse_node(child)?;
        elements.push(value);
    }
    let id = t.heap.new_array(elements);
    Ok(JsWrapper::object(id))
}

// -------------------------------------------------------------------------
// Declarations
// -------------------------------------------------------------------------

pub fn variable_declaration(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    declarators(t, node, DeclKind::Var)
}

pub fn lexical_declaration(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let kind = match node.child_by_field_name("kind").map(|k| k.kind()) {
        Some("const") => DeclKind::Const,
        _ => DeclKind::Let,
    };
    declarators(t, node, kind)
}

fn declarators(t: &mut Traverser<'_>, node: Node<'_>, kind: DeclKind) -> ActionResult {
    for declarator in named_children(node) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name) = declarator.child_by_field_name("name") else {
            continue;
        };
        let value = match declarator.child_by_field_name("value") {
            Some(v) => Some(t.traverse_node(v)?),
            None => None,
        };
        if name.kind() != "identifier" {
            bind_pattern(t, name, Some(kind))?;
            continue;
        }
        let ident = t.text(name);
        match value {
            Some(value) => t.declare_checked(ident, value, kind, name),
            // `var x;` keeps an earlier value
            None if kind == DeclKind::Var && t.is_declared_here(ident) => {}
            None => t.declare_checked(ident, JsWrapper::undefined(), kind, name),
        }
    }
    Ok(JsWrapper::undefined())
}

/// Bind every name in a pattern to an unknown value. `kind` is `None` for
/// destructuring assignment.
pub fn bind_pattern(
    t: &mut Traverser<'_>,
    node: Node<'_>,
    kind: Option<DeclKind>,
) -> Result<(), EngineFault> {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            let name = t.text(node);
            match kind {
                Some(kind) => t.declare(name, JsWrapper::dirty(), kind),
                None => t.set_variable(name, JsWrapper::dirty(), node),
            }
        }
        "assignment_pattern" | "object_assignment_pattern" => {
            if let Some(right) = node.child_by_field_name("right") {
                t.traverse_node(right)?;
            }
            if let Some(left) = node.child_by_field_name("left") {
                bind_pattern(t, left, kind)?;
            }
        }
        "pair_pattern" => {
            if let Some(key) = node.child_by_field_name("key") {
                if key.kind() == "computed_property_name" {
                    t.traverse_node(key)?;
                }
            }
            if let Some(value) = node.child_by_field_name("value") {
                bind_pattern(t, value, kind)?;
            }
        }
        "object_pattern" | "array_pattern" | "rest_pattern" => {
            for child in named_children(node) {
                bind_pattern(t, child, kind)?;
            }
        }
        "member_expression" | "subscript_expression" if kind.is_none() => {
            let target = calls::resolve_lvalue(t, node)?;
            t.assign(&target, JsWrapper::dirty(), node);
        }
        _ => {}
    }
    Ok(())
}

fn bind_parameters(t: &mut Traverser<'_>, node: Node<'_>) -> Result<(), EngineFault> {
    if let Some(param) = node.child_by_field_name("parameter") {
        bind_pattern(t, param, Some(DeclKind::Var))?;
    }
    if let Some(params) = node.child_by_field_name("parameters") {
        for param in named_children(params) {
            bind_pattern(t, param, Some(DeclKind::Var))?;
        }
    }
    Ok(())
}

fn traverse_body(t: &mut Traverser<'_>, node: Node<'_>) -> Result<(), EngineFault> {
    if let Some(body) = node.child_by_field_name("body") {
        t.traverse_node(body)?;
    }
    Ok(())
}

pub fn function_declaration(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let func = new_function(t);
    if let Some(name) = node.child_by_field_name("name") {
        let name = t.text(name);
        t.declare_hoisted(name, func.clone());
    }
    bind_parameters(t, node)?;
    traverse_body(t, node)?;
    Ok(func)
}

pub fn function_expression(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let func = new_function(t);
    if let Some(name) = node.child_by_field_name("name") {
        let name = t.text(name);
        t.declare(name, func.clone(), DeclKind::Var);
    }
    bind_parameters(t, node)?;
    traverse_body(t, node)?;
    Ok(func)
}

pub fn arrow_function(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let func = new_function(t);
    bind_parameters(t, node)?;
    traverse_body(t, node)?;
    Ok(func)
}

pub fn method_definition(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let func = new_function(t);
    if let Some(name) = node.child_by_field_name("name") {
        if name.kind() == "computed_property_name" {
            t.traverse_node(name)?;
        }
    }
    bind_parameters(t, node)?;
    traverse_body(t, node)?;
    Ok(func)
}

fn class_members(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let name = node.child_by_field_name("name");
    for child in named_children(node) {
        if Some(child.id()) == name.map(|n| n.id()) {
            continue;
        }
        t.traverse_node(child)?;
    }
    Ok(new_function(t))
}

pub fn class_declaration(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let class = class_members(t, node)?;
    if let Some(name) = node.child_by_field_name("name") {
        let name = t.text(name);
        t.declare(name, class.clone(), DeclKind::Let);
    }
    Ok(class)
}

pub fn class_expression(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    class_members(t, node)
}

/// `else if` ladders are walked in a loop, so a long ladder costs one level
/// of nesting rather than two per branch.
pub fn if_statement(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let mut current = node;
    loop {
        for field in ["condition", "consequence"] {
            if let Some(child) = current.child_by_field_name(field) {
                t.traverse_node(child)?;
            }
        }
        let Some(alternative) = current.child_by_field_name("alternative") else {
            break;
        };
        let next = named_children(alternative)
            .into_iter()
            .find(|c| c.kind() != "comment");
        match next {
            Some(next) if next.kind() == "if_statement" => current = next,
            _ => {
                t.traverse_node(alternative)?;
                break;
            }
        }
    }
    Ok(JsWrapper::undefined())
}

pub fn for_in(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    if let Some(right) = node.child_by_field_name("right") {
        t.traverse_node(right)?;
    }
    if let Some(left) = node.child_by_field_name("left") {
        let kind = match node.child_by_field_name("kind").map(|k| k.kind()) {
            Some("var") => Some(DeclKind::Var),
            Some("let") => Some(DeclKind::Let),
            Some("const") => Some(DeclKind::Const),
            _ => None,
        };
        bind_pattern(t, left, kind)?;
    }
    traverse_body(t, node)?;
    Ok(JsWrapper::undefined())
}

pub fn catch_clause(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    if let Some(param) = node.child_by_field_name("parameter") {
        bind_pattern(t, param, Some(DeclKind::Let))?;
    }
    traverse_body(t, node)?;
    Ok(JsWrapper::undefined())
}

pub fn import_statement(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    for clause in named_children(node) {
        if clause.kind() != "import_clause" {
            continue;
        }
        for binding in import_bindings(clause) {
            let name = t.text(binding);
            t.declare(name, JsWrapper::dirty(), DeclKind::Let);
        }
    }
    Ok(JsWrapper::undefined())
}

fn import_bindings(clause: Node<'_>) -> Vec<Node<'_>> {
    let mut bindings = Vec::new();
    for child in named_children(clause) {
        match child.kind() {
            "identifier" => bindings.push(child),
            "namespace_import" => {
                bindings.extend(named_children(child).into_iter().filter(|c| c.kind() == "identifier"));
            }
            "named_imports" => {
                for spec in named_children(child) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    if let Some(local) = spec
                        .child_by_field_name("alias")
                        .or_else(|| spec.child_by_field_name("name"))
                    {
                        bindings.push(local);
                    }
                }
            }
            _ => {}
        }
    }
    bindings
}

// -------------------------------------------------------------------------
// Expressions
// -------------------------------------------------------------------------

pub fn assignment(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let (Some(left), Some(right)) = (
        node.child_by_field_name("left"),
        node.child_by_field_name("right"),
    ) else {
        return dirty(t, node);
    };
    let target = calls::resolve_lvalue(t, left)?;
    let value = t.traverse_node(right)?;
    t.assign(&target, value.clone(), node);
    Ok(value)
}

pub fn augmented_assignment(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let (Some(left), Some(right)) = (
        node.child_by_field_name("left"),
        node.child_by_field_name("right"),
    ) else {
        return dirty(t, node);
    };
    let op = node
        .child_by_field_name("operator")
        .map(|o| o.kind())
        .unwrap_or("=");
    let target = calls::resolve_lvalue(t, left)?;
    let current = t.read_lvalue(&target, left);
    let rhs = t.traverse_node(right)?;
    let result = operators::binary(operators::augmented_operator(op), &current, &rhs, &t.heap);
    t.assign(&target, result.clone(), node);
    Ok(result)
}

pub fn update(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let Some(argument) = node.child_by_field_name("argument") else {
        return dirty(t, node);
    };
    let operator = node.child_by_field_name("operator");
    let target = calls::resolve_lvalue(t, argument)?;
    let current = t.read_lvalue(&target, argument);
    if matches!(target, LValue::Unknown | LValue::Pattern) {
        return Ok(JsWrapper::dirty());
    }
    let old = if current.is_dirty() {
        JsWrapper::dirty()
    } else {
        JsWrapper::number(current.as_float(&t.heap))
    };
    let step = match operator.map(|o| o.kind()) {
        Some("--") => -1.0,
        _ => 1.0,
    };
    let new = if old.is_dirty() {
        JsWrapper::dirty()
    } else {
        JsWrapper::number(old.as_float(&t.heap) + step)
    };
    t.assign(&target, new.clone(), node);
    let prefix = operator.is_some_and(|o| o.start_byte() < argument.start_byte());
    Ok(if prefix { new } else { old })
}

/// Left-nested chains (`a + b + c + ...`) are folded in a loop instead of
/// recursing once per operator.
pub fn binary(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let mut spine = vec![node];
    let mut leftmost = node.child_by_field_name("left");
    while let Some(left) = leftmost.filter(|l| l.kind() == "binary_expression") {
        spine.push(left);
        leftmost = left.child_by_field_name("left");
    }

    let mut value = match leftmost {
        Some(l) => t.traverse_node(l)?,
        None => JsWrapper::dirty(),
    };
    for link in spine.iter().rev() {
        let op = link
            .child_by_field_name("operator")
            .map(|o| o.kind())
            .unwrap_or("");
        let right = match link.child_by_field_name("right") {
            Some(r) => t.traverse_node(r)?,
            None => JsWrapper::dirty(),
        };
        value = operators::binary(op, &value, &right, &t.heap);
    }
    Ok(value)
}

pub fn unary(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let op = node
        .child_by_field_name("operator")
        .map(|o| o.kind())
        .unwrap_or("");
    let operand = match node.child_by_field_name("argument") {
        Some(a) => t.traverse_node(a)?,
        None => JsWrapper::dirty(),
    };
    Ok(operators::unary(op, &operand, &t.heap))
}

pub fn ternary(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let mut branch = |field: &str| -> ActionResult {
        match node.child_by_field_name(field) {
            Some(n) => t.traverse_node(n),
            None => Ok(JsWrapper::dirty()),
        }
    };
    let condition = branch("condition")?;
    let consequence = branch("consequence")?;
    let alternative = branch("alternative")?;
    if condition.is_dirty() {
        return Ok(JsWrapper::dirty());
    }
    Ok(if condition.as_bool() {
        consequence
    } else {
        alternative
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_literals() {
        assert_eq!(parse_number_literal("0x1F"), 31.0);
        assert_eq!(parse_number_literal("017"), 15.0);
        assert_eq!(parse_number_literal("019"), 19.0);
        assert_eq!(parse_number_literal("1_000"), 1000.0);
        assert_eq!(parse_number_literal("10n"), 10.0);
        assert_eq!(parse_number_literal(".5"), 0.5);
        assert_eq!(parse_number_literal("0b101"), 5.0);
    }

    #[test]
    fn test_decode_escape() {
        assert_eq!(decode_escape("\\n"), "\n");
        assert_eq!(decode_escape("\\x41"), "A");
        assert_eq!(decode_escape("\\u0042"), "B");
        assert_eq!(decode_escape("\\u{1F600}"), "\u{1F600}");
        assert_eq!(decode_escape("\\'"), "'");
        assert_eq!(decode_escape("\\0"), "\0");
        assert_eq!(decode_escape("\\\n"), "");
    }
}
