//! The four reconcilers and the queue plumbing they share.
//!
//! Each reconcile follows the same shape: read from the orchestrator, take
//! the forest lock briefly to compute a decision, release it, write back,
//! then lock again to record the outcome. Names that need re-examination are
//! collected in a [`Pending`] buffer while the lock is held and dispatched
//! by the caller afterwards.

pub mod anchor;
pub mod config;
pub mod hierarchy;
pub mod object;
pub mod queue;
pub mod runtime;

pub use anchor::AnchorReconciler;
pub use config::ConfigReconciler;
pub use hierarchy::HierarchyReconciler;
pub use object::ObjectReconciler;
pub use runtime::Controller;

use crate::{ThisError, cluster::ClusterError};
use hnc_api::KindRef;

/// Sentinel recorded as the inherited-from value when a propagated-copy
/// reconcile runs on an object that does not actually exist; conditions
/// keyed by a source namespace must also be cleared under this name.
pub const UNKNOWN_SOURCE: &str = "<unknown>";

///
/// ReconcileError
///

#[derive(Debug, ThisError)]
pub enum ReconcileError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("kind {0} has no registered syncer")]
    UnknownKind(KindRef),
}

///
/// AnchorKey
/// Work key for the anchor reconciler: the anchor lives in `parent` under
/// the child's name.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AnchorKey {
    pub parent: String,
    pub name: String,
}

impl AnchorKey {
    #[must_use]
    pub fn new(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            name: name.into(),
        }
    }
}

///
/// ObjectKey
/// Work key for a per-kind object reconciler.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectKey {
    pub kind: KindRef,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(kind: KindRef, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

///
/// Pending
/// Names to notify, buffered while the forest lock is held. The consumer
/// side never needs the lock to accept work, so enqueue stays O(1) and
/// self-deadlock is impossible.
///

#[derive(Debug, Default)]
pub struct Pending {
    pub namespaces: Vec<String>,
    pub anchors: Vec<AnchorKey>,
    pub objects: Vec<ObjectKey>,
    pub config: bool,
}

impl Pending {
    pub fn namespace(&mut self, name: impl Into<String>) {
        self.namespaces.push(name.into());
    }

    pub fn anchor(&mut self, key: AnchorKey) {
        self.anchors.push(key);
    }

    pub fn object(&mut self, key: ObjectKey) {
        self.objects.push(key);
    }

    pub fn merge(&mut self, other: Self) {
        self.namespaces.extend(other.namespaces);
        self.anchors.extend(other.anchors);
        self.objects.extend(other.objects);
        self.config |= other.config;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
            && self.anchors.is_empty()
            && self.objects.is_empty()
            && !self.config
    }

    /// Deduplicates buffered keys, preserving first-seen order.
    pub fn dedup(&mut self) {
        dedup_preserving(&mut self.namespaces);
        dedup_preserving(&mut self.anchors);
        dedup_preserving(&mut self.objects);
    }
}

fn dedup_preserving<T: Clone + Eq + std::hash::Hash>(items: &mut Vec<T>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
