//! The orchestrator seam.
//!
//! Everything the core needs from the orchestrator is expressed as two
//! object-safe async traits so reconcilers and validators never talk to a
//! concrete client. Implementations must never be invoked while the forest
//! mutex is held; reconcilers stage their writes and perform them after
//! unlocking.

use crate::ThisError;
use async_trait::async_trait;
use hnc_api::{
    GroupResource, HierarchyConfiguration, HncConfiguration, KindRef, Manifest, Namespace,
    SubnamespaceAnchor,
};

///
/// ClusterError
/// Failure classification mirroring the orchestrator's status reasons; the
/// object-write fallback and the validators key off it.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum ClusterError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal: {0}")]
    Internal(String),

    /// The mutation is structurally rejected by the stored schema, e.g. an
    /// immutable spec field. Triggers the delete-then-create fallback.
    #[error("invalid: {0}")]
    Invalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

///
/// Cluster
/// The orchestrator's storage surface for the entities the controller owns
/// or manages. `update_*` creates on first write for the singleton-like
/// entities (hierarchy, anchors, configuration); the dynamic object surface
/// distinguishes create from update because the write fallback needs to.
///

#[async_trait]
pub trait Cluster: Send + Sync {
    // namespaces
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, ClusterError>;
    async fn list_namespaces(&self) -> Result<Vec<Namespace>, ClusterError>;
    async fn create_namespace(&self, namespace: &Namespace) -> Result<(), ClusterError>;
    async fn update_namespace(&self, namespace: &Namespace) -> Result<(), ClusterError>;
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    // hierarchy entities
    async fn get_hierarchy(
        &self,
        namespace: &str,
    ) -> Result<Option<HierarchyConfiguration>, ClusterError>;
    async fn update_hierarchy(&self, entity: &HierarchyConfiguration) -> Result<(), ClusterError>;

    // anchors
    async fn list_anchors(&self, namespace: &str)
    -> Result<Vec<SubnamespaceAnchor>, ClusterError>;
    async fn get_anchor(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubnamespaceAnchor>, ClusterError>;
    async fn update_anchor(&self, anchor: &SubnamespaceAnchor) -> Result<(), ClusterError>;
    async fn delete_anchor(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // configuration singleton
    async fn get_hnc_config(&self) -> Result<Option<HncConfiguration>, ClusterError>;
    async fn update_hnc_config(&self, config: &HncConfiguration) -> Result<(), ClusterError>;

    // managed objects of arbitrary kinds
    async fn get_object(
        &self,
        kind: &KindRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Manifest>, ClusterError>;
    async fn list_objects(
        &self,
        kind: &KindRef,
        namespace: &str,
    ) -> Result<Vec<Manifest>, ClusterError>;
    async fn create_object(&self, manifest: &Manifest) -> Result<(), ClusterError>;
    async fn update_object(&self, manifest: &Manifest) -> Result<(), ClusterError>;
    async fn delete_object(
        &self,
        kind: &KindRef,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError>;

    // discovery
    async fn resolve_kind(&self, gr: &GroupResource) -> Result<Option<KindRef>, ClusterError>;

    /// Whether any of the controller's own entity schemas is marked for
    /// deletion (the whole system is being uninstalled).
    async fn hnc_schemas_deleting(&self) -> Result<bool, ClusterError>;
}

///
/// Authorizer
/// The orchestrator's authorization engine; the core consults it, never
/// replaces it. Called only after the forest lock has been released.
///

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_admin(&self, user: &str, namespace: &str) -> Result<bool, ClusterError>;
}
