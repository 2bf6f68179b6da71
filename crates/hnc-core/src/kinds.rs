//! The kind registry: which kinds are managed, in which mode, and the
//! built-ins whose mode cannot be overridden.

use crate::reconcile::{ObjectKey, Pending, ReconcileError};
use async_trait::async_trait;
use hnc_api::{GroupResource, KindRef, Mode};

/// Access-control group of the two enforced built-in kinds.
pub const RBAC_GROUP: &str = "rbac.orchestrator.io";

/// Kinds that are always managed in Propagate mode. A declaration that
/// attempts to downgrade them is accepted but reported, and the enforced
/// mode remains.
#[must_use]
pub fn enforced_kinds() -> Vec<GroupResource> {
    vec![
        GroupResource::new(RBAC_GROUP, "roles"),
        GroupResource::new(RBAC_GROUP, "rolebindings"),
    ]
}

#[must_use]
pub fn is_enforced(gr: &GroupResource) -> bool {
    enforced_kinds().contains(gr)
}

///
/// KindSyncer
/// The registry interface through which the config reconciler hands per-kind
/// object reconcilers to the hierarchy reconciler. Mode reads and writes use
/// interior mutability so the registry can stay a plain list of handles.
///

#[async_trait]
pub trait KindSyncer: Send + Sync {
    fn kind(&self) -> KindRef;

    fn mode(&self) -> Mode;

    /// Sets the mode, returning whether it changed. A change forces a full
    /// resync of the kind, driven by the caller.
    fn set_mode(&self, mode: Mode) -> bool;

    /// Reconciles one object of this kind.
    async fn reconcile_object(&self, key: &ObjectKey) -> Result<Pending, ReconcileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_ins_are_enforced() {
        assert!(is_enforced(&GroupResource::new(RBAC_GROUP, "roles")));
        assert!(is_enforced(&GroupResource::new(RBAC_GROUP, "rolebindings")));
        assert!(!is_enforced(&GroupResource::new("", "secrets")));
    }
}
