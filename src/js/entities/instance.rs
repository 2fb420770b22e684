//! Handlers for properties and methods of any object (`**` paths): DOM
//! members whose misuse is risky whatever object they are reached through.

use super::{Behavior, DiagMeta, HookOutcome, RegistryBuilder, RegistryError};
use crate::bundle::SigningSeverity;
use crate::js::calls::{CallSite, GetSite, SetSite};
use crate::js::traverser::Traverser;
use crate::js::value::JsWrapper;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EVENT_ATTRIBUTE: Regex = Regex::new(r"(?i)<[^>]+\son[a-z]+\s*=").unwrap();
}

fn event_handler_set(_t: &mut Traverser<'_>, site: &SetSite<'_>) -> HookOutcome {
    if !site.value.is_string() {
        return HookOutcome::Silent;
    }
    HookOutcome::Flag(
        DiagMeta::new()
            .id(&["javascript", "on_event", "string_assignment"])
            .warning()
            .message(format!("`{}` attribute set to a string", site.name))
            .description(
                "Event handlers must be functions; strings assigned to `on*` properties are \
                 evaluated as code.",
            ),
    )
}

fn markup_set(t: &mut Traverser<'_>, site: &SetSite<'_>) -> HookOutcome {
    if site.value.is_dirty() {
        return HookOutcome::Flag(
            DiagMeta::new()
                .id(&["javascript", "innerHTML", "variable_assignment"])
                .warning()
                .message(format!("Markup should not be passed to `{}` dynamically", site.name))
                .description(
                    "Building markup from variables invites injection; create nodes with DOM \
                     methods or sanitize the input.",
                )
                .signing(SigningSeverity::Medium),
        );
    }
    let markup = site.value.as_str(&t.heap);
    if EVENT_ATTRIBUTE.is_match(&markup) {
        return HookOutcome::Flag(
            DiagMeta::new()
                .id(&["javascript", "innerHTML", "event_assignment"])
                .warning()
                .message(format!("Event handler attributes assigned through `{}`", site.name))
                .description("Inline event handlers in markup are evaluated as code."),
        );
    }
    HookOutcome::Silent
}

fn exposed_props_set(_t: &mut Traverser<'_>, _site: &SetSite<'_>) -> HookOutcome {
    HookOutcome::Flag(
        DiagMeta::new()
            .id(&["javascript", "__exposedProps__", "set"])
            .warning()
            .message("Use of `__exposedProps__`")
            .description("`__exposedProps__` exposes privileged objects to content; use `exportFunction` or `cloneInto`.")
            .signing(SigningSeverity::High),
    )
}

fn unwrap_object(_t: &mut Traverser<'_>, _site: &GetSite<'_>) -> HookOutcome {
    HookOutcome::Value(JsWrapper {
        unwrapped: true,
        ..JsWrapper::dirty()
    })
}

fn set_attribute(t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    let Some(name) = site.arg(0) else {
        return HookOutcome::Silent;
    };
    if name.is_dirty() || !name.as_str(&t.heap).to_lowercase().starts_with("on") {
        return HookOutcome::Silent;
    }
    HookOutcome::Flag(
        DiagMeta::new()
            .id(&["javascript", "setAttribute", "setting_on*"])
            .warning()
            .message("`on*` attribute being set using `setAttribute`")
            .description(
                "Event handler attributes are evaluated as code; use `addEventListener` \
                 instead.",
            ),
    )
}

fn created_tag(t: &mut Traverser<'_>, tag: Option<&JsWrapper>) -> HookOutcome {
    let Some(tag) = tag else {
        return HookOutcome::Silent;
    };
    if tag.is_dirty() {
        return HookOutcome::Flag(
            DiagMeta::new()
                .id(&["javascript", "createElement", "dynamic_tag"])
                .warning()
                .message("Element created from a variable tag name")
                .description("Creating elements whose type is not known statically can create scripts."),
        );
    }
    if tag.as_str(&t.heap).eq_ignore_ascii_case("script") {
        return HookOutcome::Flag(
            DiagMeta::new()
                .id(&["javascript", "createElement", "script_creation"])
                .warning()
                .message("Dynamic creation of `<script>` elements")
                .description("Scripts must be shipped in the package, not injected at runtime.")
                .signing(SigningSeverity::Medium),
        );
    }
    HookOutcome::Silent
}

fn create_element(t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    created_tag(t, site.arg(0))
}

fn create_element_ns(t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    created_tag(t, site.arg(1))
}

fn insert_adjacent_html(_t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    match site.arg(1) {
        Some(markup) if markup.is_dirty() => HookOutcome::Flag(
            DiagMeta::new()
                .id(&["javascript", "insertAdjacentHTML", "dynamic"])
                .warning()
                .message("Markup should not be passed to `insertAdjacentHTML` dynamically")
                .signing(SigningSeverity::Medium),
        ),
        _ => HookOutcome::Silent,
    }
}

fn add_event_listener(_t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    match site.arg(3) {
        Some(untrusted) if !untrusted.is_dirty() && untrusted.as_bool() => HookOutcome::Flag(
            DiagMeta::new()
                .id(&["javascript", "addEventListener", "untrusted"])
                .notice()
                .message("Listening for untrusted events")
                .description("Events dispatched by content can be forged; validate their data."),
        ),
        _ => HookOutcome::Silent,
    }
}

pub(super) fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register(&["**", "on*"], Behavior::new().on_set(event_handler_set))?;
    b.register(&["**", "innerHTML"], Behavior::new().on_set(markup_set))?;
    b.register(&["**", "outerHTML"], Behavior::new().on_set(markup_set))?;
    b.register(&["**", "__exposedProps__"], Behavior::new().on_set(exposed_props_set))?;
    b.register(&["**", "wrappedJSObject"], Behavior::new().on_get(unwrap_object))?;
    b.register(&["**", "setAttribute"], Behavior::new().on_call(set_attribute))?;
    b.register(&["**", "createElement"], Behavior::new().on_call(create_element))?;
    b.register(&["**", "createElementNS"], Behavior::new().on_call(create_element_ns))?;
    b.register(&["**", "QueryInterface"], Behavior::new().on_call(super::typed_by_interface))?;
    b.register(&["**", "getInterface"], Behavior::new().on_call(super::typed_by_interface))?;
    b.register(&["**", "insertAdjacentHTML"], Behavior::new().on_call(insert_adjacent_html))?;
    b.register(&["**", "addEventListener"], Behavior::new().on_call(add_event_listener))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_attribute_pattern() {
        assert!(EVENT_ATTRIBUTE.is_match("<img src=x onerror=alert(1)>"));
        assert!(EVENT_ATTRIBUTE.is_match("<div ONCLICK = 'go()'>"));
        assert!(!EVENT_ATTRIBUTE.is_match("<b>online</b>"));
    }
}
