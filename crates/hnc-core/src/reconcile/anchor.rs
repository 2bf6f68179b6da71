use crate::cluster::{Cluster, ClusterError};
use crate::forest::Forest;
use crate::log;
use crate::log::Topic;
use crate::reconcile::{AnchorKey, Pending, ReconcileError};
use crate::settings::Settings;
use hnc_api::{AnchorState, Namespace, SubnamespaceAnchor, keys};
use std::sync::Arc;

///
/// AnchorReconciler
/// Owns the subnamespace-anchor lifecycle: creating subnamespaces, holding
/// the finalizer while one is protected, and running the two-phase deletion
/// protocol.
///

pub struct AnchorReconciler {
    forest: Arc<Forest>,
    cluster: Arc<dyn Cluster>,
    settings: Arc<Settings>,
}

impl AnchorReconciler {
    #[must_use]
    pub fn new(forest: Arc<Forest>, cluster: Arc<dyn Cluster>, settings: Arc<Settings>) -> Self {
        Self {
            forest,
            cluster,
            settings,
        }
    }

    pub async fn reconcile(&self, key: &AnchorKey) -> Result<Pending, ReconcileError> {
        let mut pending = Pending::default();

        let Some(mut anchor) = self.cluster.get_anchor(&key.parent, &key.name).await? else {
            // The anchor is gone; the parent recomputes its declared list.
            pending.namespace(&key.parent);
            return Ok(pending);
        };
        let original = anchor.clone();

        // Excluded namespaces never host subnamespaces, and a Forbidden
        // anchor never finalizes.
        let parent_excluded = self.settings.is_excluded(&key.parent)
            || self
                .cluster
                .get_namespace(&key.parent)
                .await?
                .is_some_and(|ns| {
                    ns.meta.annotation(keys::EXCLUDED_NAMESPACE) == Some("true")
                });
        if parent_excluded {
            anchor.status.state = AnchorState::Forbidden;
            anchor.meta.remove_finalizer(keys::FINALIZER);
            self.write_back(&anchor, &original).await?;
            return Ok(pending);
        }

        let subnamespace = self.cluster.get_namespace(&key.name).await?;
        let state = observed_state(&key.parent, subnamespace.as_ref());

        if anchor.meta.is_deleting() {
            anchor.status.state = state;
            self.finalize(key, &mut anchor, state, subnamespace.as_ref(), &mut pending)
                .await?;
            self.write_back(&anchor, &original).await?;
            return Ok(pending);
        }

        if state == AnchorState::Missing {
            self.create_subnamespace(key, &mut pending).await?;
            // The resulting state (Ok, or Conflict after a lost race) is
            // observed by the follow-up reconcile.
        }

        anchor.status.state = state;
        anchor.meta.add_finalizer(keys::FINALIZER);
        self.write_back(&anchor, &original).await?;

        Ok(pending)
    }

    async fn create_subnamespace(
        &self,
        key: &AnchorKey,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let mut namespace = Namespace::named(&key.name);
        namespace
            .meta
            .set_annotation(keys::SUBNAMESPACE_OF, &key.parent);

        match self.cluster.create_namespace(&namespace).await {
            Ok(()) => {
                log!(
                    Topic::Anchor,
                    INFO,
                    "created subnamespace '{}' for anchor in '{}'",
                    key.name,
                    key.parent,
                );
                pending.namespace(&key.name);
                pending.anchor(key.clone());
                Ok(())
            }
            Err(ClusterError::AlreadyExists(_)) => {
                // Lost a creation race; re-observe.
                pending.anchor(key.clone());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The anchor deletion protocol. Deleting the anchor means the user
    /// wants the subnamespace gone; deleting the anchor schema means the
    /// whole system is being uninstalled and namespaces must be left alone.
    async fn finalize(
        &self,
        key: &AnchorKey,
        anchor: &mut SubnamespaceAnchor,
        state: AnchorState,
        subnamespace: Option<&Namespace>,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let uninstalling = self.cluster.hnc_schemas_deleting().await?;

        if !uninstalling && state == AnchorState::Ok {
            let deleting_already = subnamespace.is_some_and(|ns| ns.meta.is_deleting());
            if !deleting_already {
                let deletable = {
                    let data = self.forest.lock();
                    data.descendant_names(&key.name).is_empty()
                        || data.cascading_deletion_allowed(&key.name)
                };
                if !deletable {
                    // Blocked: the subnamespace has descendants and no
                    // ancestor allows cascading deletion. The finalizer
                    // stays until that changes.
                    log!(
                        Topic::Anchor,
                        INFO,
                        "anchor '{}/{}' blocked: subnamespace has descendants and cascading deletion is not allowed",
                        key.parent,
                        key.name,
                    );
                    return Ok(());
                }
                self.cluster.delete_namespace(&key.name).await?;
                pending.anchor(key.clone());
                return Ok(());
            }
            // Deletion already in flight; the hierarchy reconciler enqueues
            // this anchor again once the namespace disappears.
            return Ok(());
        }

        // Gone, never there, owned by someone else, or uninstalling:
        // release the anchor.
        anchor.meta.remove_finalizer(keys::FINALIZER);
        pending.namespace(&key.parent);
        Ok(())
    }

    async fn write_back(
        &self,
        anchor: &SubnamespaceAnchor,
        original: &SubnamespaceAnchor,
    ) -> Result<(), ReconcileError> {
        if anchor != original {
            self.cluster.update_anchor(anchor).await?;
        }
        Ok(())
    }
}

/// The relationship between the anchor's parent and the current namespace
/// named by the anchor.
fn observed_state(parent: &str, subnamespace: Option<&Namespace>) -> AnchorState {
    match subnamespace {
        None => AnchorState::Missing,
        Some(ns) if ns.meta.annotation(keys::SUBNAMESPACE_OF) == Some(parent) => AnchorState::Ok,
        Some(_) => AnchorState::Conflict,
    }
}
