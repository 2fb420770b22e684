//! Member access, assignment targets and calls.
//!
//! These are the points where plain values meet registry entities: a read
//! resolves the property against the base's entity, a write runs set hooks
//! and readonly checks, and a call runs the danger check and call hook.

use tree_sitter::Node;

use super::actions::bind_pattern;
use super::entities::{Danger, DiagMeta, EntityId, EntityValue, HookOutcome};
use super::traverser::{EngineFault, Traverser};
use super::value::{JsWrapper, Literal, Value};

type ActionResult = Result<JsWrapper, EngineFault>;

/// A call of an entity.
pub struct CallSite<'t> {
    pub node: Node<'t>,
    pub entity: EntityId,
    pub this: JsWrapper,
    pub args: Vec<JsWrapper>,
    pub arg_nodes: Vec<Node<'t>>,
}

impl<'t> CallSite<'t> {
    pub fn arg(&self, index: usize) -> Option<&JsWrapper> {
        self.args.get(index)
    }

    /// Whether an argument was written inline as a string literal.
    pub fn arg_is_literal(&self, index: usize) -> bool {
        self.arg_nodes
            .get(index)
            .is_some_and(|n| n.kind() == "string")
    }
}

/// A property read that resolved to an entity.
pub struct GetSite<'t> {
    pub node: Node<'t>,
    pub entity: EntityId,
    pub base: JsWrapper,
    pub name: String,
}

/// A property write that resolved to an entity.
pub struct SetSite<'t> {
    pub node: Node<'t>,
    pub entity: EntityId,
    pub base: JsWrapper,
    pub name: String,
    pub value: JsWrapper,
}

/// Where an assignment stores its value.
#[derive(Debug, Clone)]
pub enum LValue {
    Variable(String),
    Member { base: JsWrapper, name: String },
    /// Destructuring; names were bound when the target was resolved.
    Pattern,
    Unknown,
}

/// Property name for a computed key. Unknown keys read as `*`.
fn key_name(t: &Traverser<'_>, key: &JsWrapper) -> String {
    if key.is_dirty() {
        return "*".to_string();
    }
    key.as_str(&t.heap)
}

fn property_name<'s>(t: &Traverser<'s>, node: Node<'_>) -> &'s str {
    match node.child_by_field_name("property") {
        Some(property) => t.text(property).trim_start_matches('#'),
        None => "",
    }
}

impl<'a> Traverser<'a> {
    /// The value of a registry entity, with aliases followed.
    pub fn wrap_entity(&mut self, entity: EntityId, node: Node<'_>) -> JsWrapper {
        let registry = self.registry;
        let target = registry.dealias(entity);
        let behavior = registry.behavior(target);
        if behavior.dangerous_on_read {
            self.report(Some(target), DiagMeta::new(), node);
        }
        let mut value = match behavior.value {
            Some(EntityValue::Thunk(thunk)) => thunk(self),
            _ => JsWrapper::entity(target),
        };
        value.callable |= behavior.is_callable();
        value.is_const = behavior.is_const;
        value
    }

    /// Read `base[name]`.
    pub fn get_member(&mut self, base: &JsWrapper, name: &str, node: Node<'_>) -> JsWrapper {
        let registry = self.registry;
        if let Some(parent) = base.hooks {
            if let Some(entity) = registry.resolve(Some(parent), name) {
                return self.read_entity_property(entity, base, name, node);
            }
        }
        if let Some(id) = base.object_id() {
            if let Some(value) = self.heap.get(id, name) {
                return value;
            }
        }
        if name == "length" {
            if let Value::Literal(Literal::String(s)) = &base.value {
                if !base.dirty {
                    return JsWrapper::number(s.encode_utf16().count() as f64);
                }
            }
        }
        if base.hooks.is_none() {
            if let Some(entity) = registry.deep(name) {
                return self.read_entity_property(entity, base, name, node);
            }
        }
        JsWrapper {
            unwrapped: base.unwrapped,
            ..JsWrapper::dirty()
        }
    }

    fn read_entity_property(
        &mut self,
        entity: EntityId,
        base: &JsWrapper,
        name: &str,
        node: Node<'_>,
    ) -> JsWrapper {
        let registry = self.registry;
        let behavior = registry.behavior(entity);
        let mut value = match behavior.on_get {
            Some(hook) => {
                let site = GetSite {
                    node,
                    entity,
                    base: base.clone(),
                    name: name.to_string(),
                };
                match hook(self, &site) {
                    HookOutcome::Value(value) => value,
                    HookOutcome::Flag(meta) => {
                        self.report(Some(entity), meta, node);
                        self.wrap_entity(entity, node)
                    }
                    HookOutcome::Silent => self.wrap_entity(entity, node),
                }
            }
            None => self.wrap_entity(entity, node),
        };
        if behavior.on_set.is_some() {
            value.setter = Some(entity);
        }
        value
    }

    /// Write `base[name] = value`.
    pub fn set_member(&mut self, base: &JsWrapper, name: &str, value: JsWrapper, node: Node<'_>) {
        let registry = self.registry;
        if base.unwrapped {
            self.report(
                None,
                DiagMeta::new()
                    .id(&["javascript", "unwrapped", "property_set"])
                    .warning()
                    .message("Setting a property of an unwrapped object")
                    .description(
                        "Objects reached through `wrappedJSObject` belong to content; writing to \
                         them exposes privileged values.",
                    ),
                node,
            );
        }

        let existing = base.object_id().and_then(|id| self.heap.get(id, name));
        let entity = registry
            .resolve(base.hooks, name)
            .or_else(|| existing.and_then(|v| v.setter));

        if let Some(entity) = entity {
            if let Some(hook) = registry.behavior(entity).on_set {
                let site = SetSite {
                    node,
                    entity,
                    base: base.clone(),
                    name: name.to_string(),
                    value: value.clone(),
                };
                if let HookOutcome::Flag(meta) = hook(self, &site) {
                    self.report(Some(entity), meta, node);
                }
            }
        }

        // properties of the global object are globals
        if base.hooks.is_some_and(|id| registry.behavior(id).global_scope) {
            self.set_variable(name, value, node);
            return;
        }
        if let (Some(entity), Some(_)) = (entity, base.hooks) {
            self.check_overwrite(entity, name, &value, node, false);
        }
        if let Some(id) = base.object_id() {
            self.heap.set(id, name, value);
        }
    }

    /// Current value of an assignment target.
    pub fn read_lvalue(&mut self, target: &LValue, node: Node<'_>) -> JsWrapper {
        match target {
            LValue::Variable(name) => self.seek_variable(name, node),
            LValue::Member { base, name } => self.get_member(base, name, node),
            LValue::Pattern | LValue::Unknown => JsWrapper::dirty(),
        }
    }

    /// Store a value through an assignment target.
    pub fn assign(&mut self, target: &LValue, value: JsWrapper, node: Node<'_>) {
        match target {
            LValue::Variable(name) => self.set_variable(name, value, node),
            LValue::Member { base, name } => self.set_member(base, name, value, node),
            LValue::Pattern | LValue::Unknown => {}
        }
    }

    /// Call a value. Only entities do anything; every other call produces
    /// an unknown result.
    pub fn call(
        &mut self,
        callee: &JsWrapper,
        this: JsWrapper,
        args: Vec<JsWrapper>,
        arg_nodes: Vec<Node<'_>>,
        node: Node<'_>,
    ) -> JsWrapper {
        let Some(entity) = callee.hooks else {
            return JsWrapper::dirty();
        };
        let registry = self.registry;
        let behavior = registry.behavior(entity);
        let site = CallSite {
            node,
            entity,
            this,
            args,
            arg_nodes,
        };

        match behavior.dangerous {
            Some(Danger::Always) => {
                self.report(Some(entity), DiagMeta::new(), node);
            }
            Some(Danger::Check(check)) => {
                if let Some(meta) = check(self, &site) {
                    self.report(Some(entity), meta, node);
                }
            }
            None => {}
        }

        match behavior.on_call.map(|hook| hook(self, &site)) {
            Some(HookOutcome::Value(value)) => value,
            Some(HookOutcome::Flag(meta)) => {
                self.report(Some(entity), meta, node);
                JsWrapper::dirty()
            }
            Some(HookOutcome::Silent) | None => JsWrapper::dirty(),
        }
    }
}

/// Resolve the target of an assignment, evaluating its base expression.
pub fn resolve_lvalue(t: &mut Traverser<'_>, node: Node<'_>) -> Result<LValue, EngineFault> {
    match node.kind() {
        "identifier" => Ok(LValue::Variable(t.text(node).to_string())),
        "member_expression" => {
            let base = match node.child_by_field_name("object") {
                Some(object) => t.traverse_node(object)?,
                None => JsWrapper::dirty(),
            };
            let name = property_name(t, node).to_string();
            Ok(LValue::Member { base, name })
        }
        "subscript_expression" => {
            let base = match node.child_by_field_name("object") {
                Some(object) => t.traverse_node(object)?,
                None => JsWrapper::dirty(),
            };
            let key = match node.child_by_field_name("index") {
                Some(index) => t.traverse_node(index)?,
                None => JsWrapper::dirty(),
            };
            let name = key_name(t, &key);
            Ok(LValue::Member { base, name })
        }
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let inner = node.named_children(&mut cursor).next();
            match inner {
                Some(inner) => resolve_lvalue(t, inner),
                None => Ok(LValue::Unknown),
            }
        }
        "object_pattern" | "array_pattern" => {
            bind_pattern(t, node, None)?;
            Ok(LValue::Pattern)
        }
        _ => {
            t.traverse_node(node)?;
            Ok(LValue::Unknown)
        }
    }
}

fn arguments<'t>(
    t: &mut Traverser<'_>,
    node: Node<'t>,
) -> Result<(Vec<JsWrapper>, Vec<Node<'t>>), EngineFault> {
    let mut args = Vec::new();
    let mut arg_nodes = Vec::new();
    let Some(list) = node.child_by_field_name("arguments") else {
        return Ok((args, arg_nodes));
    };
    if list.kind() == "template_string" {
        // tagged template
        args.push(t.traverse_node(list)?);
        arg_nodes.push(list);
        return Ok((args, arg_nodes));
    }
    let mut cursor = list.walk();
    let children: Vec<Node<'t>> = list.named_children(&mut cursor).collect();
    for child in children {
        if child.kind() == "comment" {
            continue;
        }
        let value = t.traverse_node(child)?;
        args.push(value);
        arg_nodes.push(child);
    }
    Ok((args, arg_nodes))
}

pub fn call_expression(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let Some(function) = node.child_by_field_name("function") else {
        t.traverse_branches(node, &["*"])?;
        return Ok(JsWrapper::dirty());
    };

    // a member callee is evaluated here so its base becomes `this`
    let (callee, this) = match function.kind() {
        "member_expression" | "subscript_expression" => {
            let target = resolve_lvalue(t, function)?;
            match target {
                LValue::Member { base, name } => {
                    let callee = t.get_member(&base, &name, function);
                    (callee, base)
                }
                _ => (JsWrapper::dirty(), JsWrapper::dirty()),
            }
        }
        _ => (t.traverse_node(function)?, JsWrapper::undefined()),
    };

    let (args, arg_nodes) = arguments(t, node)?;
    Ok(t.call(&callee, this, args, arg_nodes, node))
}

pub fn new_expression(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let constructor = match node.child_by_field_name("constructor") {
        Some(c) => t.traverse_node(c)?,
        None => JsWrapper::dirty(),
    };
    let (args, arg_nodes) = arguments(t, node)?;
    if constructor.hooks.is_some() {
        let instance = t.heap.new_object();
        let this = JsWrapper::object(instance);
        return Ok(t.call(&constructor, this, args, arg_nodes, node));
    }
    let id = t.heap.new_object();
    Ok(JsWrapper::object(id))
}

pub fn member_expression(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let base = match node.child_by_field_name("object") {
        Some(object) => t.traverse_node(object)?,
        None => JsWrapper::dirty(),
    };
    let name = property_name(t, node);
    Ok(t.get_member(&base, name, node))
}

pub fn subscript_expression(t: &mut Traverser<'_>, node: Node<'_>) -> ActionResult {
    let base = match node.child_by_field_name("object") {
        Some(object) => t.traverse_node(object)?,
        None => JsWrapper::dirty(),
    };
    let key = match node.child_by_field_name("index") {
        Some(index) => t.traverse_node(index)?,
        None => JsWrapper::dirty(),
    };
    let name = key_name(t, &key);
    Ok(t.get_member(&base, &name, node))
}
