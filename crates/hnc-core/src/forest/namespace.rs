use hnc_api::{Condition, KindRef, Manifest};
use std::collections::BTreeMap;

///
/// Namespace
/// One node in the forest. Parent and anchors are private so edges stay
/// coherent with the derived child view; everything else is plain state the
/// reconcilers read and write under the forest lock.
///

pub struct Namespace {
    name: String,
    parent: Option<String>,
    anchors: Vec<String>,

    /// Whether the orchestrator currently reports this namespace as present.
    pub exists: bool,

    /// Whether this namespace was created from an anchor in its parent.
    pub is_sub: bool,

    pub allow_cascading_deletion: bool,

    /// External manager identifier; None when this controller manages the
    /// namespace.
    pub manager: Option<String>,

    /// For external roots: ancestor-name to depth, grafted onto descendant
    /// depth labels.
    pub external_tree_labels: BTreeMap<String, u32>,

    /// Last known orchestrator labels, for selector evaluation.
    pub labels: BTreeMap<String, String>,

    pub(super) sources: BTreeMap<KindRef, BTreeMap<String, Manifest>>,
    pub(super) conditions: Vec<Condition>,
}

impl Namespace {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            anchors: Vec::new(),
            exists: false,
            is_sub: false,
            allow_cascading_deletion: false,
            manager: None,
            external_tree_labels: BTreeMap::new(),
            labels: BTreeMap::new(),
            sources: BTreeMap::new(),
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub(super) fn set_parent(&mut self, parent: Option<String>) {
        self.parent = parent;
    }

    #[must_use]
    pub fn anchors(&self) -> &[String] {
        &self.anchors
    }

    pub(super) fn set_anchor_list(&mut self, anchors: Vec<String>) {
        self.anchors = anchors;
    }

    /// Whether the namespace is managed by another system.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.manager.is_some()
    }
}
