//! Preference writes: the banned preference table, literal detection and the
//! hooks shared by `nsIPrefBranch` and `Preferences.jsm`.

use tree_sitter::Node;

use super::{Behavior, DiagMeta, HookOutcome, RegistryBuilder, RegistryError};
use crate::bundle::{Finding, SigningSeverity, Uid};
use crate::js::calls::CallSite;
use crate::js::traverser::Traverser;

/// A preference (or preference branch, when `name` ends in a dot) add-ons
/// must not change.
#[derive(Debug)]
pub struct BannedPref {
    pub name: &'static str,
    pub signing: SigningSeverity,
    pub reason: &'static str,
}

impl BannedPref {
    pub fn is_branch(&self) -> bool {
        self.name.ends_with('.')
    }

    fn matches(&self, pref: &str) -> bool {
        if self.is_branch() {
            pref.starts_with(self.name)
        } else {
            pref == self.name
        }
    }
}

const fn banned(name: &'static str, signing: SigningSeverity, reason: &'static str) -> BannedPref {
    BannedPref {
        name,
        signing,
        reason,
    }
}

static BANNED: &[BannedPref] = &[
    banned(
        "browser.startup.homepage",
        SigningSeverity::High,
        "Changing the homepage requires the user's explicit consent.",
    ),
    banned(
        "browser.newtab.url",
        SigningSeverity::High,
        "Changing the new tab page requires the user's explicit consent.",
    ),
    banned(
        "browser.newtabpage.enabled",
        SigningSeverity::Medium,
        "The new tab page belongs to the user.",
    ),
    banned(
        "browser.search.defaultenginename",
        SigningSeverity::High,
        "Search settings must be changed through the search service with consent.",
    ),
    banned(
        "browser.search.selectedEngine",
        SigningSeverity::High,
        "Search settings must be changed through the search service with consent.",
    ),
    banned(
        "browser.search.searchEnginesURL",
        SigningSeverity::High,
        "Search settings must be changed through the search service with consent.",
    ),
    banned(
        "keyword.URL",
        SigningSeverity::High,
        "Location bar keyword searches must not be redirected.",
    ),
    banned(
        "keyword.enabled",
        SigningSeverity::High,
        "Location bar keyword searches must not be redirected.",
    ),
    banned(
        "xpinstall.signatures.required",
        SigningSeverity::High,
        "Add-ons must not disable signature enforcement.",
    ),
    banned(
        "app.update.",
        SigningSeverity::High,
        "Application updates must not be tampered with.",
    ),
    banned(
        "extensions.blocklist.",
        SigningSeverity::High,
        "The add-on blocklist must not be tampered with.",
    ),
    banned(
        "extensions.getAddons.",
        SigningSeverity::Medium,
        "Add-on discovery settings must not be changed.",
    ),
    banned(
        "security.",
        SigningSeverity::High,
        "Security preferences must not be weakened by add-ons.",
    ),
    banned(
        "capability.policy.",
        SigningSeverity::High,
        "Capability policies grant web content extra privileges.",
    ),
    banned(
        "network.proxy.",
        SigningSeverity::Medium,
        "Proxy settings route all of the user's traffic.",
    ),
    banned(
        "general.useragent.",
        SigningSeverity::Medium,
        "Changing the user agent affects every site the user visits.",
    ),
];

/// The banned entry covering `pref`, if any.
pub fn banned_pref(pref: &str) -> Option<&'static BannedPref> {
    BANNED.iter().find(|p| p.matches(pref))
}

/// Warn about a string literal naming a banned preference. The warning is
/// provisional: a preference call taking the literal inline replaces it with
/// its own finding.
pub fn check_literal(t: &mut Traverser<'_>, literal: &str, node: Node<'_>) -> Option<Uid> {
    let pref = banned_pref(literal)?;
    let finding: Finding = t
        .finding(
            &["javascript", "preference", "literal_pref"],
            "Potentially unsafe preference branch referenced",
            node,
        )
        .description(format!("The preference `{}` is referenced.", literal))
        .description(pref.reason);
    t.bundle.warning(finding)
}

fn drop_inline_literals(t: &mut Traverser<'_>, site: &CallSite<'_>) {
    for (index, arg) in site.args.iter().enumerate() {
        if site.arg_is_literal(index) {
            t.drop_provisional(arg);
        }
    }
}

/// Call hook for preference writes.
pub(super) fn pref_set(t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    drop_inline_literals(t, site);
    let Some(name) = site.arg(0) else {
        return HookOutcome::Silent;
    };
    if name.is_dirty() {
        return HookOutcome::Silent;
    }
    let name = name.as_str(&t.heap);
    let Some(pref) = banned_pref(&name) else {
        return HookOutcome::Silent;
    };
    HookOutcome::Flag(
        DiagMeta::new()
            .id(&["javascript", "preference", "banned_pref_set"])
            .warning()
            .message(format!("Attempt to set a dangerous preference: `{}`", name))
            .description(pref.reason)
            .signing(pref.signing),
    )
}

/// Call hook for preference reads; reading is harmless.
pub(super) fn pref_get(t: &mut Traverser<'_>, site: &CallSite<'_>) -> HookOutcome {
    drop_inline_literals(t, site);
    HookOutcome::Silent
}

pub(super) fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register(&["Preferences"], Behavior::new().readonly().overwriteable())?;
    b.register(&["Preferences", "set"], Behavior::new().on_call(pref_set))?;
    b.register(&["Preferences", "reset"], Behavior::new().on_call(pref_set))?;
    b.register(&["Preferences", "get"], Behavior::new().on_call(pref_get))?;
    b.register(&["Preferences", "has"], Behavior::new().on_call(pref_get))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_branch_matches() {
        assert!(banned_pref("browser.startup.homepage").is_some());
        assert!(banned_pref("browser.startup.homepage_override").is_none());
        let branch = banned_pref("extensions.blocklist.enabled").unwrap();
        assert!(branch.is_branch());
        assert_eq!(branch.signing, SigningSeverity::High);
        assert!(banned_pref("extensions.myaddon.enabled").is_none());
    }
}
