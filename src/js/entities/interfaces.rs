//! XPCOM interfaces reachable through `Components.interfaces`.
//!
//! Values returned by `createInstance`, `getService`, `QueryInterface` and
//! `getInterface` carry the interface entity they were asked for, so member
//! access on the result is checked against the members registered here.

use super::prefs::{pref_get, pref_set};
use super::{Behavior, DiagMeta, HookOutcome, RegistryBuilder, RegistryError};
use crate::bundle::SigningSeverity;
use crate::js::calls::{CallSite, SetSite};
use crate::js::traverser::Traverser;
use crate::js::value::JsWrapper;

const COMPONENTS: &str = "Components";

fn iface(name: &'static str) -> [&'static str; 3] {
    [COMPONENTS, "interfaces", name]
}

/// Call hook typing the result by the interface passed as first argument.
pub fn typed_by_interface(t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    let Some(entity) = site.arg(0).and_then(|arg| arg.hooks) else {
        return HookOutcome::Silent;
    };
    if !t.registry.is_interface(entity) {
        return HookOutcome::Silent;
    }
    HookOutcome::Value(JsWrapper::entity(entity))
}

fn returns_interface(t: &mut Traverser<'_>, name: &'static str) -> HookOutcome {
    match t.registry.lookup_path(&iface(name)) {
        Some(id) => HookOutcome::Value(JsWrapper::entity(id)),
        None => HookOutcome::Silent,
    }
}

fn returns_pref_branch(t: &mut Traverser<'_>, _site: &CallSite<'_>) -> HookOutcome {
    returns_interface(t, "nsIPrefBranch")
}

fn returns_window(t: &mut Traverser<'_>, _site: &CallSite<'_>) -> HookOutcome {
    returns_interface(t, "nsIDOMWindow")
}

/// Plain-HTTP requests from privileged code can be tampered with in transit.
fn insecure_open(t: &mut Traverser<'_>, site: &CallSite<'_>) -> Option<DiagMeta> {
    let url = site.arg(1)?;
    if url.is_dirty() {
        return None;
    }
    let url = url.as_str(&t.heap);
    if !url.to_ascii_lowercase().starts_with("http:") {
        return None;
    }
    Some(
        DiagMeta::new()
            .id(&["javascript", "xhr", "insecure_url"])
            .warning()
            .message("Insecure request from privileged code")
            .description(format!("`{}` is requested over plain HTTP; use HTTPS.", url))
            .signing(SigningSeverity::Medium),
    )
}

fn engine_set(_t: &mut Traverser<'_>, site: &SetSite<'_>) -> HookOutcome {
    HookOutcome::Flag(
        DiagMeta::new()
            .message(format!("Changing the search engine through `{}`", site.name))
            .description("Add-ons must not change the user's default search engine without consent.")
            .signing(SigningSeverity::High),
    )
}

pub(super) fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register(&iface("nsIXMLHttpRequest"), Behavior::new())?;
    b.register(
        &[COMPONENTS, "interfaces", "nsIXMLHttpRequest", "open"],
        Behavior::new().dangerous_if(insecure_open),
    )?;
    for member in ["send", "abort", "setRequestHeader", "channel", "responseText"] {
        b.register(&[COMPONENTS, "interfaces", "nsIXMLHttpRequest", member], Behavior::new())?;
    }

    b.register(&iface("nsIPrefBranch"), Behavior::new())?;
    for setter in [
        "setCharPref",
        "setBoolPref",
        "setIntPref",
        "setComplexValue",
        "setStringPref",
        "clearUserPref",
    ] {
        b.register(
            &[COMPONENTS, "interfaces", "nsIPrefBranch", setter],
            Behavior::new().on_call(pref_set),
        )?;
    }
    for getter in ["getCharPref", "getBoolPref", "getIntPref", "getComplexValue", "getStringPref", "prefHasUserValue"] {
        b.register(
            &[COMPONENTS, "interfaces", "nsIPrefBranch", getter],
            Behavior::new().on_call(pref_get),
        )?;
    }
    b.register(
        &[COMPONENTS, "interfaces", "nsIPrefBranch", "getBranch"],
        Behavior::new().on_call(returns_pref_branch),
    )?;

    b.register(&iface("nsIPrefService"), Behavior::new())?;
    b.register(
        &[COMPONENTS, "interfaces", "nsIPrefService", "getBranch"],
        Behavior::new().on_call(returns_pref_branch),
    )?;
    b.register(
        &[COMPONENTS, "interfaces", "nsIPrefService", "getDefaultBranch"],
        Behavior::new().on_call(returns_pref_branch),
    )?;

    let process = DiagMeta::new()
        .message("Launching external processes")
        .description("Starting native processes gives the add-on full control over the system.")
        .signing(SigningSeverity::High);
    b.register(&iface("nsIProcess"), Behavior::new().meta(process))?;
    b.register(&[COMPONENTS, "interfaces", "nsIProcess", "run"], Behavior::new().dangerous())?;
    b.register(&[COMPONENTS, "interfaces", "nsIProcess", "runAsync"], Behavior::new().dangerous())?;
    b.register(&[COMPONENTS, "interfaces", "nsIProcess", "runw"], Behavior::new().dangerous())?;

    b.register(&iface("nsIFile"), Behavior::new())?;
    b.register(
        &[COMPONENTS, "interfaces", "nsIFile", "launch"],
        Behavior::new().dangerous().meta(
            DiagMeta::new()
                .message("Launching files with `nsIFile.launch`")
                .signing(SigningSeverity::High),
        ),
    )?;
    b.register(&iface("nsILocalFile"), Behavior::alias(&["Components", "interfaces", "nsIFile"]))?;

    b.register(&iface("nsIWindowMediator"), Behavior::new())?;
    for getter in ["getMostRecentWindow", "getOuterWindowWithId"] {
        b.register(
            &[COMPONENTS, "interfaces", "nsIWindowMediator", getter],
            Behavior::new().on_call(returns_window),
        )?;
    }

    b.register(&iface("nsIObserverService"), Behavior::new())?;
    for member in ["addObserver", "removeObserver", "notifyObservers"] {
        b.register(&[COMPONENTS, "interfaces", "nsIObserverService", member], Behavior::new())?;
    }

    b.register(&iface("nsIBrowserSearchService"), Behavior::new())?;
    for member in ["currentEngine", "defaultEngine"] {
        b.register(
            &[COMPONENTS, "interfaces", "nsIBrowserSearchService", member],
            Behavior::new().on_set(engine_set),
        )?;
    }

    let json = DiagMeta::new()
        .notice()
        .message("`nsIJSON` is deprecated")
        .description("Use the native `JSON` object instead.");
    b.register(&iface("nsIJSON"), Behavior::new().meta(json))?;
    b.register(&[COMPONENTS, "interfaces", "nsIJSON", "encode"], Behavior::new().dangerous())?;
    b.register(&[COMPONENTS, "interfaces", "nsIJSON", "decode"], Behavior::new().dangerous())?;

    b.register(&iface("nsIDOMWindow"), Behavior::new())?;
    b.register(
        &[COMPONENTS, "interfaces", "nsIDOMWindow", "openDialog"],
        Behavior::new().on_call(returns_window),
    )?;

    b.register(&iface("nsIInterfaceRequestor"), Behavior::new())?;
    b.register(
        &[COMPONENTS, "interfaces", "nsIInterfaceRequestor", "getInterface"],
        Behavior::new().on_call(typed_by_interface),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::js::entities::standard;

    #[test]
    fn test_interfaces_are_recognised() {
        let registry = standard();
        let xhr = registry
            .lookup_path(&["Components", "interfaces", "nsIXMLHttpRequest"])
            .unwrap();
        assert!(registry.is_interface(xhr));
        let open = registry.resolve(Some(xhr), "open").unwrap();
        assert!(!registry.is_interface(open));
    }

    #[test]
    fn test_method_inherits_interface_meta() {
        let registry = standard();
        let run = registry
            .lookup_path(&["Components", "interfaces", "nsIProcess", "run"])
            .unwrap();
        let meta = registry.meta(run);
        assert_eq!(meta.signing_severity, Some(crate::bundle::SigningSeverity::High));
    }
}
