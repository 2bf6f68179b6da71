//! Process-wide model of all namespaces, their parent/child edges, source
//! catalogs, conditions, and the kind-syncer registry.
//!
//! Edges are expressed by name and resolved through the flat map at each
//! access, so no owning reference ever closes a cycle. A single mutex guards
//! the whole model; holders must not perform I/O and must buffer enqueue
//! intents for dispatch after unlocking.

mod conditions;
mod namespace;
mod sources;

pub use namespace::Namespace;

use crate::kinds::KindSyncer;
use hnc_api::KindRef;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

///
/// Forest
/// Shared handle; `lock` yields the guarded data. Initialized once at
/// startup and passed explicitly to every reconciler and validator.
///

#[derive(Default)]
pub struct Forest {
    data: Mutex<ForestData>,
}

impl Forest {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lock(&self) -> MutexGuard<'_, ForestData> {
        self.data.lock()
    }
}

///
/// ForestData
/// The lock-protected model. Nodes exist for every name ever observed and
/// are never removed; `exists` flips as the orchestrator reports.
///

#[derive(Default)]
pub struct ForestData {
    namespaces: BTreeMap<String, Namespace>,
    syncers: Vec<Arc<dyn KindSyncer>>,
    unpropagated_annotations: Vec<String>,
}

impl ForestData {
    //
    // Node access
    //

    /// Returns the node for `name`, creating an empty one if absent so all
    /// edges can be expressed by name.
    pub fn get(&mut self, name: &str) -> &mut Namespace {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| Namespace::new(name))
    }

    #[must_use]
    pub fn try_get(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.get(name)
    }

    #[must_use]
    pub fn ns_exists(&self, name: &str) -> bool {
        self.namespaces.get(name).is_some_and(|ns| ns.exists)
    }

    /// Names of all nodes currently known (existing or not).
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }

    //
    // Structural queries and mutations
    //

    #[must_use]
    pub fn parent(&self, name: &str) -> Option<&str> {
        self.namespaces.get(name).and_then(Namespace::parent)
    }

    pub fn set_parent(&mut self, child: &str, parent: Option<&str>) {
        if let Some(p) = parent {
            // Materialize the parent node so the edge resolves even before
            // the parent namespace has been observed.
            self.get(p);
        }
        self.get(child).set_parent(parent.map(String::from));
    }

    /// Direct children, derived by scanning parent edges.
    #[must_use]
    pub fn child_names(&self, name: &str) -> Vec<String> {
        self.namespaces
            .values()
            .filter(|ns| ns.parent() == Some(name))
            .map(|ns| ns.name().to_string())
            .collect()
    }

    /// The chain from `name` up to its root, self first. Cycle-safe: the
    /// walk stops before revisiting a member.
    #[must_use]
    pub fn ancestry_names(&self, name: &str) -> Vec<String> {
        let mut out = vec![name.to_string()];
        let mut current = name.to_string();

        while let Some(parent) = self.parent(&current) {
            if out.iter().any(|n| n == parent) {
                break;
            }
            out.push(parent.to_string());
            current = parent.to_string();
        }

        out
    }

    /// Every namespace below `name`, breadth-first, excluding `name` itself.
    /// Cycle-safe via a visited set.
    #[must_use]
    pub fn descendant_names(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = BTreeSet::new();
        visited.insert(name.to_string());
        let mut frontier = vec![name.to_string()];

        while let Some(current) = frontier.pop() {
            for child in self.child_names(&current) {
                if visited.insert(child.clone()) {
                    result.push(child.clone());
                    frontier.push(child);
                }
            }
        }

        result
    }

    /// If `name` is a member of a cycle, the members in parent order
    /// starting at `name`; otherwise None. A namespace whose *ancestors*
    /// form a cycle it does not belong to is not a member.
    #[must_use]
    pub fn cycle_names(&self, name: &str) -> Option<Vec<String>> {
        let mut path = vec![name.to_string()];
        let mut current = name.to_string();

        loop {
            let parent = self.parent(&current)?;
            if parent == name {
                return Some(path);
            }
            if path.iter().any(|n| n == parent) {
                return None;
            }
            path.push(parent.to_string());
            current = parent.to_string();
        }
    }

    /// Returns a human-readable reason iff re-parenting `child` under
    /// `parent` would create a cycle.
    #[must_use]
    pub fn can_set_parent(&self, child: &str, parent: &str) -> Option<String> {
        if child == parent {
            return Some(format!(
                "namespace '{child}' cannot be its own parent"
            ));
        }

        let ancestry = self.ancestry_names(parent);
        if ancestry.iter().any(|n| n == child) {
            let chain = ancestry.join(" <- ");
            return Some(format!(
                "setting the parent of '{child}' to '{parent}' would create a cycle: {chain} <- {child}"
            ));
        }

        None
    }

    /// Whether deletion may cascade through `name`: the flag is honored on
    /// the namespace itself or any ancestor.
    #[must_use]
    pub fn cascading_deletion_allowed(&self, name: &str) -> bool {
        self.ancestry_names(name).iter().any(|n| {
            self.namespaces
                .get(n)
                .is_some_and(|ns| ns.allow_cascading_deletion)
        })
    }

    //
    // Anchors
    //

    /// Replaces the declared anchor list of `name`, returning the symmetric
    /// difference: the child names whose subnamespace should be
    /// re-examined.
    pub fn set_anchors(&mut self, name: &str, mut anchors: Vec<String>) -> Vec<String> {
        anchors.sort();
        anchors.dedup();

        let node = self.get(name);
        let old: BTreeSet<String> = node.anchors().iter().cloned().collect();
        let new: BTreeSet<String> = anchors.iter().cloned().collect();
        node.set_anchor_list(anchors);

        old.symmetric_difference(&new).cloned().collect()
    }

    #[must_use]
    pub fn anchors(&self, name: &str) -> &[String] {
        self.namespaces
            .get(name)
            .map_or(&[], |ns| ns.anchors())
    }

    //
    // Kind-syncer registry
    //

    /// Registers a syncer, replacing any previous one for the same kind.
    pub fn add_kind_syncer(&mut self, syncer: Arc<dyn KindSyncer>) {
        self.syncers.retain(|s| s.kind() != syncer.kind());
        self.syncers.push(syncer);
    }

    #[must_use]
    pub fn get_kind_syncer(&self, kind: &KindRef) -> Option<Arc<dyn KindSyncer>> {
        self.syncers.iter().find(|s| s.kind() == *kind).cloned()
    }

    #[must_use]
    pub fn kind_syncers(&self) -> Vec<Arc<dyn KindSyncer>> {
        self.syncers.clone()
    }

    //
    // Non-propagated annotation keys (process-wide, set by the config
    // reconciler from settings plus the configuration singleton)
    //

    pub fn set_unpropagated_annotations(&mut self, keys: Vec<String>) {
        self.unpropagated_annotations = keys;
    }

    #[must_use]
    pub fn unpropagated_annotations(&self) -> &[String] {
        &self.unpropagated_annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest_with_chain(chain: &[&str]) -> ForestData {
        let mut data = ForestData::default();
        for pair in chain.windows(2) {
            data.set_parent(pair[1], Some(pair[0]));
        }
        data
    }

    #[test]
    fn ancestry_is_self_first() {
        let data = forest_with_chain(&["a", "b", "c"]);
        assert_eq!(data.ancestry_names("c"), ["c", "b", "a"]);
        assert_eq!(data.ancestry_names("a"), ["a"]);
    }

    #[test]
    fn descendants_cover_the_subtree() {
        let mut data = forest_with_chain(&["a", "b", "c"]);
        data.set_parent("d", Some("b"));

        let mut descendants = data.descendant_names("a");
        descendants.sort();
        assert_eq!(descendants, ["b", "c", "d"]);
        assert!(data.descendant_names("c").is_empty());
    }

    #[test]
    fn children_are_derived() {
        let mut data = ForestData::default();
        data.set_parent("b", Some("a"));
        data.set_parent("c", Some("a"));

        let mut children = data.child_names("a");
        children.sort();
        assert_eq!(children, ["b", "c"]);

        data.set_parent("b", None);
        assert_eq!(data.child_names("a"), ["c"]);
    }

    #[test]
    fn cycle_membership() {
        let mut data = forest_with_chain(&["a", "b", "c"]);
        data.set_parent("a", Some("c"));

        let cycle = data.cycle_names("b").unwrap();
        assert_eq!(cycle.len(), 3);

        // A namespace hanging off the cycle is not a member.
        data.set_parent("d", Some("c"));
        assert!(data.cycle_names("d").is_none());

        // Breaking the cycle clears membership.
        data.set_parent("a", None);
        assert!(data.cycle_names("b").is_none());
    }

    #[test]
    fn can_set_parent_reports_cycles() {
        let data = forest_with_chain(&["a", "b", "c"]);
        assert!(data.can_set_parent("a", "c").is_some());
        assert!(data.can_set_parent("a", "a").is_some());
        assert!(data.can_set_parent("c", "a").is_none());
        assert!(data.can_set_parent("d", "c").is_none());
    }

    #[test]
    fn anchors_return_symmetric_difference() {
        let mut data = ForestData::default();
        let diff = data.set_anchors("p", vec!["a".into(), "b".into()]);
        assert_eq!(diff, ["a", "b"]);

        let mut diff = data.set_anchors("p", vec!["b".into(), "c".into()]);
        diff.sort();
        assert_eq!(diff, ["a", "c"]);

        assert!(data.set_anchors("p", vec!["b".into(), "c".into()]).is_empty());
    }

    #[test]
    fn cascading_deletion_honors_ancestors() {
        let mut data = forest_with_chain(&["a", "b", "c"]);
        assert!(!data.cascading_deletion_allowed("c"));

        data.get("a").allow_cascading_deletion = true;
        assert!(data.cascading_deletion_allowed("c"));
        assert!(data.cascading_deletion_allowed("a"));
    }
}
