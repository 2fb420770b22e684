//! Entity registry: the catalogue of known host APIs.
//!
//! An entity is a node in a tree of dotted property paths (`window`,
//! `Components.classes.*.createInstance`, ...). Each carries a [`Behavior`]
//! saying what happens when the path is read, written or called, and the
//! diagnostic metadata to report with. Paths starting with `**` apply to a
//! property of that name on any object.
//!
//! The registry is assembled once by [`build_standard`], which runs each rule
//! module's `register` function in a fixed order, and is read-only afterwards.

mod globals;
mod instance;
mod interfaces;
mod prefs;

pub use interfaces::typed_by_interface;
pub use prefs::{banned_pref, check_literal as check_pref_literal, BannedPref};

use globset::{Glob, GlobMatcher};
use once_cell::sync::OnceCell;
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;

use super::calls::{CallSite, GetSite, SetSite};
use super::traverser::Traverser;
use super::value::JsWrapper;
use crate::bundle::{CompatibilityType, Severity, SigningSeverity, VersionGate};

/// Errors raised while assembling a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("entity `{0}` registered twice")]
    Duplicate(String),

    #[error("invalid property pattern `{pattern}`: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("alias at `{from}` points to unknown entity `{to}`")]
    UnknownAlias { from: String, to: String },

    #[error("empty entity path")]
    EmptyPath,
}

/// Handle of an entity inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(u32);

pub type CallHook = fn(&mut Traverser<'_>, &CallSite<'_>) -> HookOutcome;
pub type GetHook = fn(&mut Traverser<'_>, &GetSite<'_>) -> HookOutcome;
pub type SetHook = fn(&mut Traverser<'_>, &SetSite<'_>) -> HookOutcome;
pub type DangerCheck = fn(&mut Traverser<'_>, &CallSite<'_>) -> Option<DiagMeta>;
pub type ValueThunk = fn(&mut Traverser<'_>) -> JsWrapper;
pub type ReadonlyCheck = fn(&JsWrapper) -> bool;

/// What a hook decided.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    Silent,
    /// Report against the site, merging these fields over the entity's own.
    Flag(DiagMeta),
    /// Replace the result of the access.
    Value(JsWrapper),
}

/// How an entity's value is produced when it is read.
#[derive(Debug, Clone, Copy)]
pub enum EntityValue {
    /// Another entity, by absolute path.
    Alias(&'static [&'static str]),
    /// Computed against the running traverser.
    Thunk(ValueThunk),
}

#[derive(Debug, Clone, Copy)]
pub enum Danger {
    Always,
    /// Decides from the call's arguments; `None` means safe.
    Check(DangerCheck),
}

#[derive(Debug, Clone, Copy, Default)]
pub enum Readonly {
    #[default]
    No,
    Yes,
    /// Readonly only for the assigned values the predicate accepts.
    Check(ReadonlyCheck),
}

/// Diagnostic fields an entity (or a hook result) contributes.
///
/// Unset fields inherit from the entity's ancestors.
#[derive(Debug, Clone, Default)]
pub struct DiagMeta {
    pub err_id: Option<&'static [&'static str]>,
    pub severity: Option<Severity>,
    pub message: Option<Cow<'static, str>>,
    pub description: Option<Cow<'static, str>>,
    pub signing_severity: Option<SigningSeverity>,
    pub editors_only: Option<bool>,
    pub compatibility_type: Option<CompatibilityType>,
    pub for_appversions: Option<VersionGate>,
}

impl DiagMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: &'static [&'static str]) -> Self {
        self.err_id = Some(id);
        self
    }

    pub fn error(mut self) -> Self {
        self.severity = Some(Severity::Error);
        self
    }

    pub fn warning(mut self) -> Self {
        self.severity = Some(Severity::Warning);
        self
    }

    pub fn notice(mut self) -> Self {
        self.severity = Some(Severity::Notice);
        self
    }

    pub fn message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn signing(mut self, severity: SigningSeverity) -> Self {
        self.signing_severity = Some(severity);
        self
    }

    pub fn editors_only(mut self) -> Self {
        self.editors_only = Some(true);
        self
    }

    pub fn compat(mut self, kind: CompatibilityType, gate: VersionGate) -> Self {
        self.compatibility_type = Some(kind);
        self.for_appversions = Some(gate);
        self
    }

    /// Field-wise merge: fields set on `self` win over `parent`.
    pub fn merged_over(self, parent: &DiagMeta) -> DiagMeta {
        DiagMeta {
            err_id: self.err_id.or(parent.err_id),
            severity: self.severity.or(parent.severity),
            message: self.message.or_else(|| parent.message.clone()),
            description: self.description.or_else(|| parent.description.clone()),
            signing_severity: self.signing_severity.or(parent.signing_severity),
            editors_only: self.editors_only.or(parent.editors_only),
            compatibility_type: self.compatibility_type.or(parent.compatibility_type),
            for_appversions: self.for_appversions.or(parent.for_appversions),
        }
    }
}

/// Everything an entity does.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub value: Option<EntityValue>,
    pub on_call: Option<CallHook>,
    pub on_get: Option<GetHook>,
    pub on_set: Option<SetHook>,
    pub dangerous: Option<Danger>,
    /// Report on every read, not only on calls.
    pub dangerous_on_read: bool,
    pub readonly: Readonly,
    pub overwriteable: bool,
    pub is_const: bool,
    /// Unknown properties fall back to the global table (`window.eval`).
    pub global_scope: bool,
    /// Unknown properties resolve back to this entity
    /// (`Components.classes[...]`, whose contract ids are open-ended).
    pub xpcom_wildcard: bool,
    pub meta: DiagMeta,
}

impl Behavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(path: &'static [&'static str]) -> Self {
        Self {
            value: Some(EntityValue::Alias(path)),
            ..Self::default()
        }
    }

    pub fn thunk(f: ValueThunk) -> Self {
        Self {
            value: Some(EntityValue::Thunk(f)),
            ..Self::default()
        }
    }

    pub fn on_call(mut self, hook: CallHook) -> Self {
        self.on_call = Some(hook);
        self
    }

    pub fn on_get(mut self, hook: GetHook) -> Self {
        self.on_get = Some(hook);
        self
    }

    pub fn on_set(mut self, hook: SetHook) -> Self {
        self.on_set = Some(hook);
        self
    }

    pub fn dangerous(mut self) -> Self {
        self.dangerous = Some(Danger::Always);
        self
    }

    pub fn dangerous_if(mut self, check: DangerCheck) -> Self {
        self.dangerous = Some(Danger::Check(check));
        self
    }

    pub fn dangerous_on_read(mut self) -> Self {
        self.dangerous_on_read = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = Readonly::Yes;
        self
    }

    pub fn readonly_if(mut self, check: ReadonlyCheck) -> Self {
        self.readonly = Readonly::Check(check);
        self
    }

    pub fn overwriteable(mut self) -> Self {
        self.overwriteable = true;
        self
    }

    pub fn constant(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn global_scope(mut self) -> Self {
        self.global_scope = true;
        self
    }

    pub fn xpcom_wildcard(mut self) -> Self {
        self.xpcom_wildcard = true;
        self
    }

    pub fn meta(mut self, meta: DiagMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Whether a value built from this entity can be called.
    pub fn is_callable(&self) -> bool {
        self.on_call.is_some() || self.dangerous.is_some()
    }
}

/// One node of the entity tree.
#[derive(Debug)]
pub struct Entity {
    pub name: String,
    pub parent: Option<EntityId>,
    pub behavior: Behavior,
    children: HashMap<String, EntityId>,
    wildcard: Option<EntityId>,
    registered: bool,
}

#[derive(Debug)]
struct DeepEntry {
    pattern: String,
    matcher: GlobMatcher,
    id: EntityId,
}

/// Immutable path-indexed table of host APIs.
#[derive(Debug)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    deep: Vec<DeepEntry>,
}

const ROOT: EntityId = EntityId(0);

impl EntityRegistry {
    pub fn get(&self, id: EntityId) -> &Entity {
        &self.entities[id.0 as usize]
    }

    pub fn behavior(&self, id: EntityId) -> &Behavior {
        &self.get(id).behavior
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.len() <= 1 && self.deep.is_empty()
    }

    /// A top-level global.
    pub fn global(&self, name: &str) -> Option<EntityId> {
        self.child(ROOT, name)
    }

    /// Direct child of `parent`: a concrete name beats the `*` wildcard.
    pub fn child(&self, parent: EntityId, name: &str) -> Option<EntityId> {
        let entity = self.get(parent);
        entity.children.get(name).copied().or(entity.wildcard)
    }

    /// Handler registered under `**` for this property name.
    pub fn deep(&self, name: &str) -> Option<EntityId> {
        self.deep
            .iter()
            .find(|d| d.matcher.is_match(name))
            .map(|d| d.id)
    }

    /// Resolve the entity reached by reading `name` from a value whose
    /// entity is `parent` (or which carries no entity at all).
    pub fn resolve(&self, parent: Option<EntityId>, name: &str) -> Option<EntityId> {
        if let Some(parent) = parent {
            if let Some(child) = self.child(parent, name) {
                return Some(child);
            }
            if self.behavior(parent).global_scope {
                if let Some(global) = self.global(name) {
                    return Some(global);
                }
            }
            if let Some(deep) = self.deep(name) {
                return Some(deep);
            }
            if self.behavior(parent).xpcom_wildcard {
                return Some(parent);
            }
            return None;
        }
        self.deep(name)
    }

    /// Walk an absolute path from the global table.
    pub fn lookup_path(&self, path: &[&str]) -> Option<EntityId> {
        let mut current = ROOT;
        for segment in path {
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    /// Follow aliases until a concrete entity is reached.
    pub fn dealias(&self, mut id: EntityId) -> EntityId {
        // Aliases are checked for existence at build time; the bound keeps a
        // cyclic alias from hanging.
        for _ in 0..8 {
            match self.behavior(id).value {
                Some(EntityValue::Alias(path)) => match self.lookup_path(path) {
                    Some(target) if target != id => id = target,
                    _ => break,
                },
                _ => break,
            }
        }
        id
    }

    /// Dotted path of an entity, for messages.
    pub fn path(&self, id: EntityId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ROOT {
                break;
            }
            let entity = self.get(c);
            parts.push(entity.name.as_str());
            current = entity.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Diagnostic metadata with ancestor fields filled in.
    pub fn meta(&self, id: EntityId) -> DiagMeta {
        let mut meta = self.behavior(id).meta.clone();
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            meta = meta.merged_over(&self.behavior(parent).meta);
            current = self.get(parent).parent;
        }
        meta
    }

    /// Whether the entity is one of the `Components.interfaces` members.
    pub fn is_interface(&self, id: EntityId) -> bool {
        let Some(interfaces) = self.lookup_path(&["Components", "interfaces"]) else {
            return false;
        };
        self.get(id).parent == Some(interfaces)
    }
}

/// Accumulates registrations, then freezes into an [`EntityRegistry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    registry: EntityRegistry,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        let root = Entity {
            name: String::new(),
            parent: None,
            behavior: Behavior::default(),
            children: HashMap::new(),
            wildcard: None,
            registered: true,
        };
        Self {
            registry: EntityRegistry {
                entities: vec![root],
                deep: Vec::new(),
            },
        }
    }

    fn alloc(&mut self, name: &str, parent: EntityId) -> EntityId {
        let id = EntityId(self.registry.entities.len() as u32);
        self.registry.entities.push(Entity {
            name: name.to_string(),
            parent: Some(parent),
            behavior: Behavior::default(),
            children: HashMap::new(),
            wildcard: None,
            registered: false,
        });
        let parent = &mut self.registry.entities[parent.0 as usize];
        if name == "*" {
            parent.wildcard = Some(id);
        } else {
            parent.children.insert(name.to_string(), id);
        }
        id
    }

    fn child_or_alloc(&mut self, parent: EntityId, name: &str) -> EntityId {
        let entity = &self.registry.entities[parent.0 as usize];
        let existing = if name == "*" {
            entity.wildcard
        } else {
            entity.children.get(name).copied()
        };
        match existing {
            Some(id) => id,
            None => self.alloc(name, parent),
        }
    }

    /// Attach a behavior at a path. Intermediate segments are created as
    /// empty entities; registering the same concrete path twice fails.
    pub fn register(&mut self, path: &[&str], behavior: Behavior) -> Result<EntityId, RegistryError> {
        let (last, parents) = path.split_last().ok_or(RegistryError::EmptyPath)?;

        if parents.first() == Some(&"**") {
            return self.register_deep(path, behavior);
        }

        let mut current = ROOT;
        for segment in parents {
            current = self.child_or_alloc(current, segment);
        }
        let id = self.child_or_alloc(current, last);
        let entity = &mut self.registry.entities[id.0 as usize];
        if entity.registered {
            return Err(RegistryError::Duplicate(path.join(".")));
        }
        entity.registered = true;
        entity.behavior = behavior;
        Ok(id)
    }

    fn register_deep(&mut self, path: &[&str], behavior: Behavior) -> Result<EntityId, RegistryError> {
        let pattern = path[1..].join(".");
        if self.registry.deep.iter().any(|d| d.pattern == pattern) {
            return Err(RegistryError::Duplicate(path.join(".")));
        }
        let matcher = Glob::new(&pattern)
            .map_err(|source| RegistryError::BadPattern {
                pattern: pattern.clone(),
                source,
            })?
            .compile_matcher();

        let id = EntityId(self.registry.entities.len() as u32);
        self.registry.entities.push(Entity {
            name: pattern.clone(),
            parent: None,
            behavior,
            children: HashMap::new(),
            wildcard: None,
            registered: true,
        });
        self.registry.deep.push(DeepEntry { pattern, matcher, id });
        Ok(id)
    }

    /// Check aliases and freeze.
    pub fn build(self) -> Result<EntityRegistry, RegistryError> {
        let registry = self.registry;
        for (index, entity) in registry.entities.iter().enumerate() {
            if let Some(EntityValue::Alias(path)) = entity.behavior.value {
                if registry.lookup_path(path).is_none() {
                    return Err(RegistryError::UnknownAlias {
                        from: registry.path(EntityId(index as u32)),
                        to: path.join("."),
                    });
                }
            }
        }
        Ok(registry)
    }
}

static STANDARD: OnceCell<EntityRegistry> = OnceCell::new();

/// The built-in catalogue, built on first use.
pub fn standard() -> &'static EntityRegistry {
    STANDARD.get_or_init(|| build_standard().expect("built-in entity catalogue is consistent"))
}

/// Run every rule module against a fresh builder.
pub fn build_standard() -> Result<EntityRegistry, RegistryError> {
    let mut builder = RegistryBuilder::new();
    globals::register(&mut builder)?;
    interfaces::register(&mut builder)?;
    prefs::register(&mut builder)?;
    instance::register(&mut builder)?;
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalogue_builds() {
        let registry = build_standard().unwrap();
        assert!(registry.global("eval").is_some());
        assert!(registry.global("window").is_some());
        assert!(registry.lookup_path(&["Components", "interfaces", "nsIXMLHttpRequest"]).is_some());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut builder = RegistryBuilder::new();
        builder.register(&["a", "b"], Behavior::new()).unwrap();
        assert!(matches!(
            builder.register(&["a", "b"], Behavior::new()),
            Err(RegistryError::Duplicate(_))
        ));
        // an intermediate placeholder may still be filled in once
        builder.register(&["a"], Behavior::new()).unwrap();
        assert!(builder.register(&["**", "on*"], Behavior::new()).is_ok());
        assert!(builder.register(&["**", "on*"], Behavior::new()).is_err());
    }

    #[test]
    fn test_concrete_beats_wildcard() {
        let mut builder = RegistryBuilder::new();
        let star = builder.register(&["c", "*"], Behavior::new()).unwrap();
        let named = builder.register(&["c", "named"], Behavior::new()).unwrap();
        let registry = builder.build().unwrap();
        let c = registry.global("c").unwrap();
        assert_eq!(registry.resolve(Some(c), "named"), Some(named));
        assert_eq!(registry.resolve(Some(c), "other"), Some(star));
    }

    #[test]
    fn test_deep_matches_any_base() {
        let mut builder = RegistryBuilder::new();
        let on = builder.register(&["**", "on*"], Behavior::new()).unwrap();
        builder.register(&["foo"], Behavior::new()).unwrap();
        let registry = builder.build().unwrap();
        let foo = registry.global("foo");
        assert_eq!(registry.resolve(foo, "onclick"), Some(on));
        assert_eq!(registry.resolve(None, "onhover"), Some(on));
        assert_eq!(registry.resolve(None, "click"), None);
    }

    #[test]
    fn test_meta_merges_field_wise() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                &["iface"],
                Behavior::new().meta(DiagMeta::new().warning().message("parent").signing(SigningSeverity::Low)),
            )
            .unwrap();
        let method = builder
            .register(&["iface", "method"], Behavior::new().meta(DiagMeta::new().message("child")))
            .unwrap();
        let registry = builder.build().unwrap();
        let meta = registry.meta(method);
        assert_eq!(meta.message.as_deref(), Some("child"));
        assert_eq!(meta.severity, Some(Severity::Warning));
        assert_eq!(meta.signing_severity, Some(SigningSeverity::Low));
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(&["x"], Behavior::alias(&["nowhere"])).unwrap();
        assert!(matches!(builder.build(), Err(RegistryError::UnknownAlias { .. })));
    }

    #[test]
    fn test_path_and_dealias() {
        let registry = standard();
        let ci = registry.global("Ci").unwrap();
        let target = registry.dealias(ci);
        assert_eq!(registry.path(target), "Components.interfaces");
    }
}
