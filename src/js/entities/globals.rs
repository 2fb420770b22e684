//! Top-level globals: the window, code-evaluating functions, `Components`
//! and its shortcuts, `Services`, and the read-only built-in constructors.

use super::{Behavior, DiagMeta, HookOutcome, RegistryBuilder, RegistryError};
use crate::bundle::SigningSeverity;
use crate::js::calls::{CallSite, SetSite};
use crate::js::traverser::Traverser;
use crate::js::value::JsWrapper;

/// Constructors and namespaces whose prototypes add-ons must not extend.
const BUILTINS: &[&str] = &[
    "Object", "Array", "String", "Number", "Boolean", "Date", "RegExp", "Error", "Promise", "Map",
    "Set", "WeakMap", "Symbol",
];

/// Timers run a string argument as code.
fn string_timer(_t: &mut Traverser<'_>, site: &CallSite<'_>) -> Option<DiagMeta> {
    let first = site.arg(0)?;
    if !first.is_string() {
        return None;
    }
    Some(
        DiagMeta::new()
            .message("`setTimeout` and `setInterval` must not be called with a string")
            .description("Pass a function instead; string arguments are evaluated as code.")
            .signing(SigningSeverity::High),
    )
}

fn extend_prototype(_t: &mut Traverser<'_>, site: &SetSite<'_>) -> HookOutcome {
    HookOutcome::Flag(
        DiagMeta::new()
            .id(&["javascript", "prototype_extension", "builtin"])
            .warning()
            .message(format!("Extending the prototype of a built-in object (`{}`)", site.name))
            .description("Changes to built-in prototypes leak into every script sharing the window."),
    )
}

fn xhr_instance(t: &mut Traverser<'_>, _site: &CallSite<'_>) -> HookOutcome {
    match t
        .registry
        .lookup_path(&["Components", "interfaces", "nsIXMLHttpRequest"])
    {
        Some(id) => HookOutcome::Value(JsWrapper::entity(id)),
        None => HookOutcome::Silent,
    }
}

/// Assigning a URL string navigates; anything else replaces the `Location` object.
fn replaces_location(value: &JsWrapper) -> bool {
    !value.is_dirty() && !value.is_string()
}

fn math_pi(_t: &mut Traverser<'_>) -> JsWrapper {
    JsWrapper::number(std::f64::consts::PI)
}

fn math_e(_t: &mut Traverser<'_>) -> JsWrapper {
    JsWrapper::number(std::f64::consts::E)
}

pub(super) fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register(&["window"], Behavior::new().global_scope().readonly())?;
    for name in ["top", "parent", "self", "window", "content"] {
        b.register(&["window", name], Behavior::alias(&["window"]).readonly())?;
    }
    b.register(&["self"], Behavior::alias(&["window"]).readonly())?;
    b.register(&["top"], Behavior::alias(&["window"]).readonly())?;

    b.register(&["document"], Behavior::new().readonly())?;
    b.register(&["location"], Behavior::new().readonly_if(replaces_location))?;
    b.register(&["document", "location"], Behavior::new().readonly_if(replaces_location))?;
    let write = DiagMeta::new()
        .message("Use of `document.write` strongly discouraged")
        .description("`document.write` fails in XUL documents and replaces the page in HTML ones.");
    b.register(
        &["document", "write"],
        Behavior::new().dangerous().meta(write.clone()),
    )?;
    b.register(&["document", "writeln"], Behavior::new().dangerous().meta(write))?;

    b.register(
        &["eval"],
        Behavior::new().dangerous().readonly().meta(
            DiagMeta::new()
                .message("`eval` can be harmful")
                .description("Evaluating strings as code is unsafe and almost always avoidable.")
                .signing(SigningSeverity::High),
        ),
    )?;
    b.register(
        &["Function"],
        Behavior::new().dangerous().readonly().meta(
            DiagMeta::new()
                .message("The `Function` constructor is `eval` by another name")
                .signing(SigningSeverity::High),
        ),
    )?;
    b.register(&["Function", "prototype"], Behavior::new().readonly())?;
    b.register(&["Function", "prototype", "*"], Behavior::new().on_set(extend_prototype))?;
    b.register(&["setTimeout"], Behavior::new().dangerous_if(string_timer).readonly())?;
    b.register(&["setInterval"], Behavior::new().dangerous_if(string_timer).readonly())?;

    for &name in BUILTINS {
        b.register(&[name], Behavior::new().readonly())?;
        b.register(&[name, "prototype"], Behavior::new().readonly())?;
        b.register(&[name, "prototype", "*"], Behavior::new().on_set(extend_prototype))?;
    }
    b.register(&["Math"], Behavior::new().readonly())?;
    b.register(&["Math", "PI"], Behavior::thunk(math_pi).constant().readonly())?;
    b.register(&["Math", "E"], Behavior::thunk(math_e).constant().readonly())?;
    b.register(&["JSON"], Behavior::new().readonly())?;

    b.register(&["gBrowser"], Behavior::new().readonly().overwriteable())?;
    b.register(
        &["gBrowser", "contentWindow"],
        Behavior::new().dangerous_on_read().meta(
            DiagMeta::new()
                .id(&["javascript", "cpow", "content_window"])
                .warning()
                .message("Direct access to the content window from chrome code")
                .description(
                    "Content lives in a separate process; use a frame script and message \
                     passing instead of reaching into `gBrowser.contentWindow`.",
                ),
        ),
    )?;

    b.register(&["XMLHttpRequest"], Behavior::new().on_call(xhr_instance))?;

    // XPCOM
    b.register(&["Components"], Behavior::new().readonly())?;
    b.register(&["Components", "classes"], Behavior::new().readonly())?;
    b.register(&["Components", "classes", "*"], Behavior::new().xpcom_wildcard())?;
    b.register(
        &["Components", "classes", "*", "createInstance"],
        Behavior::new().on_call(super::typed_by_interface),
    )?;
    b.register(
        &["Components", "classes", "*", "getService"],
        Behavior::new().on_call(super::typed_by_interface),
    )?;
    b.register(&["Components", "interfaces"], Behavior::new().readonly())?;
    b.register(&["Components", "interfaces", "*"], Behavior::new())?;
    b.register(&["Components", "results"], Behavior::new().readonly())?;
    b.register(&["Components", "utils"], Behavior::new().readonly())?;
    b.register(
        &["Components", "utils", "evalInSandbox"],
        Behavior::new().dangerous().meta(
            DiagMeta::new()
                .message("`evalInSandbox` runs arbitrary code")
                .description("Code evaluated in a sandbox must not come from a remote source.")
                .signing(SigningSeverity::High),
        ),
    )?;
    b.register(
        &["Components", "utils", "Sandbox"],
        Behavior::new().dangerous().meta(
            DiagMeta::new()
                .notice()
                .message("Use of `Components.utils.Sandbox`")
                .signing(SigningSeverity::Low),
        ),
    )?;

    b.register(&["Cc"], Behavior::alias(&["Components", "classes"]).readonly().overwriteable())?;
    b.register(&["Ci"], Behavior::alias(&["Components", "interfaces"]).readonly().overwriteable())?;
    b.register(&["Cu"], Behavior::alias(&["Components", "utils"]).readonly().overwriteable())?;
    b.register(&["Cr"], Behavior::alias(&["Components", "results"]).readonly().overwriteable())?;

    b.register(&["Services"], Behavior::new().readonly().overwriteable())?;
    b.register(
        &["Services", "prefs"],
        Behavior::alias(&["Components", "interfaces", "nsIPrefBranch"]),
    )?;
    b.register(
        &["Services", "obs"],
        Behavior::alias(&["Components", "interfaces", "nsIObserverService"]),
    )?;
    b.register(
        &["Services", "wm"],
        Behavior::alias(&["Components", "interfaces", "nsIWindowMediator"]),
    )?;
    b.register(
        &["Services", "search"],
        Behavior::alias(&["Components", "interfaces", "nsIBrowserSearchService"]),
    )?;

    b.register(
        &["netscape", "security", "PrivilegeManager", "enablePrivilege"],
        Behavior::new().dangerous().meta(
            DiagMeta::new()
                .error()
                .message("`enablePrivilege` is not allowed")
                .description("Privilege escalation from content scripts was removed from the platform.")
                .signing(SigningSeverity::High),
        ),
    )?;
    Ok(())
}
