//! The traversal engine: node dispatch, scope stack and variable resolution.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, trace};
use tree_sitter::{Node, Tree};

use super::entities::{DiagMeta, EntityId, EntityRegistry, Readonly};
use super::nodes;
use super::value::{JsWrapper, ObjectHeap};
use crate::bundle::{ContextGenerator, ErrorBundle, Finding, Severity, Uid};

/// Deepest AST nesting the engine follows before giving up on a file.
pub const MAX_DEPTH: usize = 200;

/// More distinct globals than this in one script is pollution.
const POLLUTION_THRESHOLD: usize = 3;

/// Shortcuts every chrome script is expected to define.
const POLLUTION_EXEMPT: &[&str] = &["Cc", "Ci", "Cu", "Cr"];

/// Nodes visited between two deadline checks.
const DEADLINE_INTERVAL: usize = 256;

/// Internal failures while traversing one file.
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("node `{kind}` on line {line} was traversed twice")]
    Retraversal { kind: &'static str, line: usize },

    #[error("maximum nesting depth of {0} exceeded")]
    DepthExceeded(usize),

    #[error("could not parse JavaScript: {0}")]
    Parse(String),

    #[error("validation timed out")]
    Timeout,
}

/// Per-file switches for the engine.
#[derive(Debug, Clone, Default)]
pub struct JsOptions {
    /// Re-traversing a node is a fault instead of a cache hit.
    pub strict: bool,
    /// The file is a module with its own global scope.
    pub is_module: bool,
    /// The source is an inline fragment (markup attribute or script tag).
    pub snippet: bool,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Function-like scope; receives `var` and function declarations.
    Default,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

/// One entry of the scope stack.
#[derive(Debug)]
pub struct ScopeContext {
    pub kind: ContextKind,
    pub vars: IndexMap<String, JsWrapper>,
}

impl ScopeContext {
    fn new(kind: ContextKind) -> Self {
        Self {
            kind,
            vars: IndexMap::new(),
        }
    }
}

/// Walks one JavaScript tree, reporting into a bundle.
pub struct Traverser<'a> {
    pub bundle: &'a mut ErrorBundle,
    pub registry: &'a EntityRegistry,
    pub heap: ObjectHeap,
    pub filename: String,
    source: &'a str,
    lines: ContextGenerator,
    options: JsOptions,
    contexts: Vec<ScopeContext>,
    this_stack: Vec<JsWrapper>,
    results: HashMap<usize, JsWrapper>,
    depth: usize,
    visited: usize,
}

impl<'a> Traverser<'a> {
    pub fn new(
        bundle: &'a mut ErrorBundle,
        registry: &'a EntityRegistry,
        filename: &str,
        source: &'a str,
        options: JsOptions,
    ) -> Self {
        let window = match registry.global("window") {
            Some(id) => JsWrapper::entity(id),
            None => JsWrapper::dirty(),
        };
        Self {
            bundle,
            registry,
            heap: ObjectHeap::new(),
            filename: filename.to_string(),
            source,
            lines: ContextGenerator::new(source),
            options,
            contexts: vec![ScopeContext::new(ContextKind::Default)],
            this_stack: vec![window],
            results: HashMap::new(),
            depth: 0,
            visited: 0,
        }
    }

    /// Traverse a whole program, then run the end-of-file checks.
    pub fn run(&mut self, tree: &Tree) -> Result<(), EngineFault> {
        self.check_deadline()?;
        self.traverse_node(tree.root_node())?;
        self.check_pollution();
        debug!(
            file = %self.filename,
            nodes = self.visited,
            objects = self.heap.len(),
            "traversal finished"
        );
        Ok(())
    }

    pub fn options(&self) -> &JsOptions {
        &self.options
    }

    /// Evaluate one node. Results are cached per node, so a second visit is
    /// a read of the first result (or a fault in strict mode).
    pub fn traverse_node(&mut self, node: Node<'_>) -> Result<JsWrapper, EngineFault> {
        if let Some(cached) = self.results.get(&node.id()) {
            if self.options.strict {
                return Err(EngineFault::Retraversal {
                    kind: node.kind(),
                    line: node.start_position().row + 1,
                });
            }
            trace!(kind = node.kind(), "re-using cached result");
            return Ok(cached.clone());
        }
        if is_comment(node) {
            return Ok(JsWrapper::undefined());
        }

        self.visited += 1;
        if self.visited % DEADLINE_INTERVAL == 0 {
            self.check_deadline()?;
        }
        if self.depth >= MAX_DEPTH {
            return Err(EngineFault::DepthExceeded(MAX_DEPTH));
        }

        self.depth += 1;
        let result = self.dispatch(node);
        self.depth -= 1;

        let result = result?;
        self.results.insert(node.id(), result.clone());
        Ok(result)
    }

    fn dispatch(&mut self, node: Node<'_>) -> Result<JsWrapper, EngineFault> {
        let Some(def) = nodes::definition(node.kind()) else {
            self.traverse_branches(node, &["*"])?;
            return Ok(JsWrapper::dirty());
        };

        let binds_this = def.dynamic && node.kind() != "arrow_function";
        if def.dynamic {
            self.push_context(ContextKind::Default);
            if binds_this {
                self.this_stack.push(JsWrapper::dirty());
            }
        } else if def.is_block {
            self.push_context(ContextKind::Block);
        }

        let result = match def.action {
            Some(action) => action(self, node),
            None => self.traverse_branches(node, def.branches),
        };

        if def.dynamic || def.is_block {
            self.pop_context();
        }
        if binds_this {
            self.this_stack.pop();
        }

        let value = result?;
        Ok(if def.returns {
            value
        } else {
            JsWrapper::undefined()
        })
    }

    /// Traverse the named branches of a node (`*` for every named child),
    /// returning the last value produced.
    pub fn traverse_branches(
        &mut self,
        node: Node<'_>,
        branches: &[&str],
    ) -> Result<JsWrapper, EngineFault> {
        let mut last = JsWrapper::undefined();
        for branch in branches {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = if *branch == "*" {
                node.named_children(&mut cursor).collect()
            } else {
                node.children_by_field_name(branch, &mut cursor).collect()
            };
            for child in children {
                if !child.is_named() || is_comment(child) {
                    continue;
                }
                last = self.traverse_node(child)?;
            }
        }
        Ok(last)
    }

    fn check_deadline(&self) -> Result<(), EngineFault> {
        match self.options.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EngineFault::Timeout),
            _ => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Source helpers
    // ---------------------------------------------------------------------

    /// Source text of a node.
    pub fn text(&self, node: Node<'_>) -> &'a str {
        let source: &'a str = self.source;
        source.get(node.start_byte()..node.end_byte()).unwrap_or("")
    }

    /// Source text between two byte offsets.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let source: &'a str = self.source;
        source.get(start..end).unwrap_or("")
    }

    /// A finding located at a node.
    pub fn finding<S: AsRef<str>>(&self, id: &[S], message: impl Into<String>, node: Node<'_>) -> Finding {
        let pos = node.start_position();
        let line = pos.row + 1;
        Finding::new(id, message)
            .file(self.filename.clone())
            .line(line)
            .column(pos.column)
            .context(self.lines.get_context(line, pos.column))
    }

    /// Report a diagnostic for an entity (or for a hook with no entity),
    /// merging `meta` over the entity's inherited metadata.
    pub fn report(&mut self, entity: Option<EntityId>, meta: DiagMeta, node: Node<'_>) -> Option<Uid> {
        let registry = self.registry;
        let (meta, path) = match entity {
            Some(id) => (meta.merged_over(&registry.meta(id)), registry.path(id)),
            None => (meta, String::new()),
        };

        let id: Vec<String> = match meta.err_id {
            Some(id) => id.iter().map(|s| s.to_string()).collect(),
            None => vec![
                "javascript".to_string(),
                "dangerous_global".to_string(),
                registry_name(&path),
            ],
        };
        let message = meta
            .message
            .map(|m| m.into_owned())
            .unwrap_or_else(|| format!("Potentially dangerous use of `{}`", path));

        let mut finding = self.finding(id.as_slice(), message, node);
        if let Some(description) = meta.description {
            finding = finding.description(description.into_owned());
        }
        if let Some(signing) = meta.signing_severity {
            finding = finding.signing(signing);
        }
        if meta.editors_only == Some(true) {
            finding = finding.editors_only();
        }
        if let Some(kind) = meta.compatibility_type {
            finding = finding.compatibility(kind);
        }
        if let Some(gate) = meta.for_appversions {
            finding = finding.for_appversions(gate.expand());
        }
        self.bundle
            .push(meta.severity.unwrap_or(Severity::Warning), finding)
    }

    /// Retract the speculative finding a value carries.
    pub fn drop_provisional(&mut self, value: &JsWrapper) -> bool {
        match &value.provisional {
            Some(uid) => self.bundle.drop(uid),
            None => false,
        }
    }

    // ---------------------------------------------------------------------
    // Scope stack
    // ---------------------------------------------------------------------

    pub fn push_context(&mut self, kind: ContextKind) {
        self.contexts.push(ScopeContext::new(kind));
    }

    pub fn pop_context(&mut self) {
        // the global context is never popped
        if self.contexts.len() > 1 {
            self.contexts.pop();
        }
    }

    pub fn this_value(&self) -> JsWrapper {
        self.this_stack.last().cloned().unwrap_or_else(JsWrapper::dirty)
    }

    /// The value of the global `window`.
    pub fn window(&self) -> JsWrapper {
        self.this_stack.first().cloned().unwrap_or_else(JsWrapper::dirty)
    }

    fn nearest_default(&self, below: usize) -> usize {
        self.contexts[..below]
            .iter()
            .rposition(|c| c.kind == ContextKind::Default)
            .unwrap_or(0)
    }

    /// Declare a name: `var` goes to the nearest function-like context,
    /// `let`/`const` to the innermost one.
    pub fn declare(&mut self, name: &str, value: JsWrapper, kind: DeclKind) {
        let index = match kind {
            DeclKind::Var => self.nearest_default(self.contexts.len()),
            DeclKind::Let | DeclKind::Const => self.contexts.len() - 1,
        };
        self.declare_at(index, name, value, kind);
    }

    /// `declare`, warning when a top-level declaration replaces a read-only
    /// global.
    pub fn declare_checked(&mut self, name: &str, value: JsWrapper, kind: DeclKind, node: Node<'_>) {
        let index = match kind {
            DeclKind::Var => self.nearest_default(self.contexts.len()),
            DeclKind::Let | DeclKind::Const => self.contexts.len() - 1,
        };
        if index == 0 {
            if let Some(entity) = self.registry.global(name) {
                self.check_overwrite(entity, name, &value, node, true);
            }
        }
        self.declare_at(index, name, value, kind);
    }

    /// Declare a function name in the scope enclosing the function's own.
    pub fn declare_hoisted(&mut self, name: &str, value: JsWrapper) {
        let below = self.contexts.len().saturating_sub(1).max(1);
        let index = self.nearest_default(below);
        self.declare_at(index, name, value, DeclKind::Var);
    }

    fn declare_at(&mut self, index: usize, name: &str, mut value: JsWrapper, kind: DeclKind) {
        value.inferred = false;
        value.is_const = kind == DeclKind::Const;
        trace!(name, ?kind, context = index, "declare");
        self.contexts[index].vars.insert(name.to_string(), value);
    }

    /// Whether a name is declared in the context a `var` would go to.
    pub fn is_declared_here(&self, name: &str) -> bool {
        let index = self.nearest_default(self.contexts.len());
        self.contexts[index].vars.contains_key(name)
    }

    /// Look a name up through the scope stack, then the global entity table.
    /// Unknown names become inferred dirty globals.
    pub fn seek_variable(&mut self, name: &str, node: Node<'_>) -> JsWrapper {
        for context in self.contexts.iter().rev() {
            if let Some(value) = context.vars.get(name) {
                return value.clone();
            }
        }
        if let Some(entity) = self.registry.global(name) {
            return self.wrap_entity(entity, node);
        }
        let placeholder = JsWrapper {
            inferred: true,
            ..JsWrapper::dirty()
        };
        self.contexts[0]
            .vars
            .insert(name.to_string(), placeholder.clone());
        placeholder
    }

    /// Assign to a name, creating an implicit global when it is undeclared.
    pub fn set_variable(&mut self, name: &str, mut value: JsWrapper, node: Node<'_>) {
        value.inferred = false;
        value.is_const = false;
        for index in (0..self.contexts.len()).rev() {
            let Some(slot) = self.contexts[index].vars.get_mut(name) else {
                continue;
            };
            let was_const = slot.is_const;
            value.is_const = was_const;
            *slot = value;
            if was_const {
                let finding = self.finding(
                    &["javascript", "traverser", "const_overwrite"],
                    format!("Assignment to constant `{}`", name),
                    node,
                );
                self.bundle.warning(finding);
            }
            return;
        }
        if let Some(entity) = self.registry.global(name) {
            self.check_overwrite(entity, name, &value, node, false);
        }
        self.contexts[0].vars.insert(name.to_string(), value);
    }

    /// Warn when a readonly global or property is overwritten.
    pub fn check_overwrite(
        &mut self,
        entity: EntityId,
        name: &str,
        value: &JsWrapper,
        node: Node<'_>,
        declaring: bool,
    ) {
        let behavior = self.registry.behavior(entity);
        if declaring && behavior.overwriteable {
            return;
        }
        let readonly = match behavior.readonly {
            Readonly::No => false,
            Readonly::Yes => true,
            Readonly::Check(check) => check(value),
        };
        if readonly {
            self.report(
                Some(entity),
                DiagMeta::new()
                    .id(&["javascript", "traverser", "global_overwrite"])
                    .warning()
                    .message(format!("Overwriting the read-only `{}`", name))
                    .description("Built-in and host objects must not be replaced by add-on code."),
                node,
            );
        }
    }

    /// A declared global, for inspection after a run.
    pub fn global(&self, name: &str) -> Option<&JsWrapper> {
        self.contexts[0].vars.get(name)
    }

    /// Names in the global context, in declaration order.
    pub fn global_names(&self) -> impl Iterator<Item = (&String, &JsWrapper)> {
        self.contexts[0].vars.iter()
    }

    fn check_pollution(&mut self) {
        if self.options.is_module
            || self.bundle.meta_flag("is_jetpack")
            || self.bundle.resource_flag("em:bootstrap")
        {
            return;
        }
        let names: Vec<String> = self
            .contexts[0]
            .vars
            .iter()
            .filter(|(name, value)| !value.inferred && !POLLUTION_EXEMPT.contains(&name.as_str()))
            .map(|(name, _)| name.clone())
            .collect();
        if names.len() <= POLLUTION_THRESHOLD {
            return;
        }
        debug!(file = %self.filename, count = names.len(), "namespace pollution");
        let finding = Finding::new(
            &["javascript", "traverser", "namespace_pollution"],
            "Global namespace pollution detected",
        )
        .description(
            "Scripts sharing a window scope should keep their state in a single namespace object.",
        )
        .description(format!("Global names: {}", names.join(", ")))
        .file(self.filename.clone());
        self.bundle.warning(finding);
    }
}

fn registry_name(path: &str) -> String {
    path.rsplit('.').next().unwrap_or(path).to_string()
}

fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "html_comment" | "hash_bang_line")
}
