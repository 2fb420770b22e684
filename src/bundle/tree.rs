//! Prefix tree of record identifiers with per-node counters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{Severity, Uid};

/// One node of the message tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(rename = "__errors")]
    pub errors: usize,
    #[serde(rename = "__warnings")]
    pub warnings: usize,
    #[serde(rename = "__notices")]
    pub notices: usize,
    #[serde(rename = "__messages")]
    pub messages: Vec<Uid>,
    #[serde(flatten)]
    pub children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn counter(&mut self, kind: Severity) -> &mut usize {
        match kind {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
            Severity::Notice => &mut self.notices,
        }
    }

    fn merge(&mut self, other: &TreeNode) {
        self.errors += other.errors;
        self.warnings += other.warnings;
        self.notices += other.notices;
        self.messages.extend(other.messages.iter().cloned());
        for (name, child) in &other.children {
            self.children.entry(name.clone()).or_default().merge(child);
        }
    }
}

/// Identifier-keyed aggregation of all records in a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTree {
    pub roots: BTreeMap<String, TreeNode>,
}

impl MessageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a record under every prefix of its identifier.
    pub fn insert(&mut self, id: &[String], kind: Severity, uid: &Uid) {
        let mut level = &mut self.roots;
        for segment in id {
            let node = level.entry(segment.clone()).or_default();
            *node.counter(kind) += 1;
            node.messages.push(uid.clone());
            level = &mut node.children;
        }
    }

    /// Undo a previous `insert`. Nodes whose counters drop to zero are pruned.
    pub fn remove(&mut self, id: &[String], kind: Severity, uid: &Uid) {
        fn walk(level: &mut BTreeMap<String, TreeNode>, id: &[String], kind: Severity, uid: &Uid) {
            let Some((head, rest)) = id.split_first() else {
                return;
            };
            let Some(node) = level.get_mut(head) else {
                return;
            };
            let counter = node.counter(kind);
            *counter = counter.saturating_sub(1);
            node.messages.retain(|m| m != uid);
            walk(&mut node.children, rest, kind, uid);
            if node.errors + node.warnings + node.notices == 0 {
                level.remove(head);
            }
        }
        walk(&mut self.roots, id, kind, uid);
    }

    /// Look up the node for an identifier prefix.
    pub fn get(&self, prefix: &[&str]) -> Option<&TreeNode> {
        let (head, rest) = prefix.split_first()?;
        let mut node = self.roots.get(*head)?;
        for segment in rest {
            node = node.children.get(*segment)?;
        }
        Some(node)
    }

    /// `(errors, warnings, notices)` recorded under an identifier prefix.
    pub fn counts(&self, prefix: &[&str]) -> (usize, usize, usize) {
        self.get(prefix)
            .map(|n| (n.errors, n.warnings, n.notices))
            .unwrap_or((0, 0, 0))
    }

    pub fn merge(&mut self, other: &MessageTree) {
        for (name, node) in &other.roots {
            self.roots.entry(name.clone()).or_default().merge(node);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_counts_every_prefix() {
        let mut tree = MessageTree::new();
        let a = Uid("a".into());
        let b = Uid("b".into());
        tree.insert(&id(&["javascript", "dangerous_global", "eval"]), Severity::Warning, &a);
        tree.insert(&id(&["javascript", "setAttribute", "setting_on*"]), Severity::Error, &b);

        assert_eq!(tree.counts(&["javascript"]), (1, 1, 0));
        assert_eq!(tree.counts(&["javascript", "dangerous_global"]), (0, 1, 0));
        assert_eq!(tree.counts(&["css"]), (0, 0, 0));
        assert_eq!(
            tree.get(&["javascript"]).unwrap().messages,
            vec![a.clone(), b.clone()]
        );
    }

    #[test]
    fn test_remove_prunes_empty_nodes() {
        let mut tree = MessageTree::new();
        let a = Uid("a".into());
        tree.insert(&id(&["x", "y"]), Severity::Notice, &a);
        tree.remove(&id(&["x", "y"]), Severity::Notice, &a);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let mut tree = MessageTree::new();
        tree.insert(&id(&["a", "b"]), Severity::Error, &Uid("u".into()));
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["a"]["__errors"], 1);
        assert_eq!(json["a"]["b"]["__messages"][0], "u");
    }
}
