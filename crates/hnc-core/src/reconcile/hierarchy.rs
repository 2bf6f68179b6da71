use crate::MANAGER_ID;
use crate::cluster::Cluster;
use crate::forest::{Forest, ForestData};
use crate::log;
use crate::log::Topic;
use crate::reconcile::{AnchorKey, ObjectKey, Pending, ReconcileError};
use crate::settings::Settings;
use hnc_api::{Condition, ConditionCode, HierarchyConfiguration, Namespace, keys};
use std::sync::Arc;

///
/// HierarchyReconciler
/// Per-namespace singleton writer: synchronizes the forest node with the
/// hierarchy entity and the namespace metadata, computes conditions and
/// depth labels, and fans out object resyncs on structural change.
///

pub struct HierarchyReconciler {
    forest: Arc<Forest>,
    cluster: Arc<dyn Cluster>,
    settings: Arc<Settings>,
}

/// What the locked section observed; drives the post-unlock work.
struct SyncOutcome {
    structural_change: bool,
}

impl HierarchyReconciler {
    #[must_use]
    pub fn new(forest: Arc<Forest>, cluster: Arc<dyn Cluster>, settings: Arc<Settings>) -> Self {
        Self {
            forest,
            cluster,
            settings,
        }
    }

    pub async fn reconcile(&self, name: &str) -> Result<Pending, ReconcileError> {
        if self.settings.is_excluded(name) {
            return Ok(Pending::default());
        }
        let mut pending = Pending::default();

        let Some(mut namespace) = self.cluster.get_namespace(name).await? else {
            self.on_namespace_gone(name, &mut pending);
            pending.dedup();
            return Ok(pending);
        };

        // A namespace can also opt out with the exclusion annotation; the
        // effect is the same as the process-configured set.
        if namespace.meta.annotation(keys::EXCLUDED_NAMESPACE) == Some("true") {
            return Ok(pending);
        }

        let schemas_deleting = self.cluster.hnc_schemas_deleting().await?;
        let mut hierarchy = self
            .cluster
            .get_hierarchy(name)
            .await?
            .unwrap_or_else(|| HierarchyConfiguration::for_namespace(name));
        let anchors: Vec<String> = self
            .cluster
            .list_anchors(name)
            .await?
            .iter()
            .map(|a| a.child().to_string())
            .collect();

        let original_namespace = namespace.clone();
        let original_hierarchy = hierarchy.clone();

        // The finalizer's sole purpose is to preserve the recorded
        // cascading-deletion flag across a single-entity deletion so
        // descendants cannot become orphaned mid-delete.
        if anchors.is_empty() || namespace.meta.is_deleting() {
            hierarchy.meta.remove_finalizer(keys::FINALIZER);
        } else {
            hierarchy.meta.add_finalizer(keys::FINALIZER);
        }

        let outcome = {
            let mut data = self.forest.lock();
            sync_with_forest(
                &mut data,
                name,
                &mut namespace,
                &mut hierarchy,
                &anchors,
                schemas_deleting,
                &mut pending,
            )
        };

        // Round-tripping an unchanged entity must not write; reconcilers
        // would loop through their own watches otherwise.
        if namespace != original_namespace {
            self.cluster.update_namespace(&namespace).await?;
        }
        if hierarchy != original_hierarchy {
            self.cluster.update_hierarchy(&hierarchy).await?;
        }

        if outcome.structural_change {
            self.enqueue_object_syncs(name, &mut pending).await?;
        }

        pending.dedup();
        Ok(pending)
    }

    /// The orchestrator no longer reports the namespace: flip `exists`,
    /// drop its sources, and wake up everything that referenced it.
    fn on_namespace_gone(&self, name: &str, pending: &mut Pending) {
        let mut data = self.forest.lock();
        let node = data.get(name);
        if !node.exists {
            return;
        }
        log!(Topic::Hierarchy, INFO, "namespace '{name}' is gone");
        node.exists = false;
        node.is_sub = false;
        node.labels.clear();

        if let Some(parent) = data.parent(name).map(str::to_string) {
            pending.namespace(&parent);
            // Completes any anchor deletion protocol waiting on this
            // namespace to disappear.
            pending.anchor(AnchorKey::new(parent, name));
        }
        for child in data.child_names(name) {
            pending.namespace(child);
        }

        let dropped = data.clear_sources(name);
        if !dropped.is_empty() {
            let descendants = data.descendant_names(name);
            for (kind, object_name) in dropped {
                for descendant in &descendants {
                    pending.object(ObjectKey::new(kind.clone(), descendant, &object_name));
                }
            }
        }
    }

    /// After a structural change every managed kind re-examines this
    /// namespace: existing objects in it plus the candidate copies of every
    /// visible ancestor source. Cluster listing happens outside the lock.
    async fn enqueue_object_syncs(
        &self,
        name: &str,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let syncers = self.forest.lock().kind_syncers();
        for syncer in syncers {
            let kind = syncer.kind();
            for manifest in self.cluster.list_objects(&kind, name).await? {
                pending.object(ObjectKey::new(kind.clone(), name, manifest.name()));
            }
            let visible = self.forest.lock().visible_source_names(name, &kind);
            for object_name in visible {
                pending.object(ObjectKey::new(kind.clone(), name, object_name));
            }
        }
        Ok(())
    }
}

/// Re-synchronizes the forest node with the entity; no I/O, lock held.
#[allow(clippy::too_many_lines)]
fn sync_with_forest(
    data: &mut ForestData,
    name: &str,
    namespace: &mut Namespace,
    hierarchy: &mut HierarchyConfiguration,
    anchors: &[String],
    schemas_deleting: bool,
    pending: &mut Pending,
) -> SyncOutcome {
    let was_crit = data.has_crit(name);
    let old_parent = data.parent(name).map(str::to_string);
    let old_manager = data.try_get(name).and_then(|n| n.manager.clone());
    let existed = data.try_get(name).is_some_and(|n| n.exists);

    // Structural conditions are recomputed from scratch each pass; the
    // per-object advisories belong to the object reconcilers.
    data.clear_conditions_where(name, |c| {
        matches!(
            c.code,
            ConditionCode::CritAncestor
                | ConditionCode::CritCycle
                | ConditionCode::CritDeletingCrd
                | ConditionCode::CritParentMissing
                | ConditionCode::SubnamespaceAnchorMissing
        )
    });

    {
        let node = data.get(name);
        node.exists = true;
        node.allow_cascading_deletion = hierarchy.spec.allow_cascading_deletion;
    }

    // External management: another system owns the tree shape; this
    // controller only maintains depth labels derived from the imported
    // ones.
    let manager = namespace
        .meta
        .annotation(keys::MANAGED_BY)
        .filter(|m| *m != MANAGER_ID)
        .map(str::to_string);
    if let Some(mgr) = &manager {
        let imported = namespace
            .meta
            .labels
            .iter()
            .filter_map(|(key, value)| {
                keys::parse_tree_depth_label(key)
                    .map(|ancestor| (ancestor.to_string(), value.parse().unwrap_or(0)))
            })
            .collect();
        let node = data.get(name);
        node.manager = Some(mgr.clone());
        node.is_sub = false;
        node.external_tree_labels = imported;
        data.set_parent(name, None);
    } else {
        let node = data.get(name);
        node.manager = None;
        node.external_tree_labels.clear();
    }
    if old_manager != manager {
        for descendant in data.descendant_names(name) {
            pending.namespace(descendant);
        }
    }

    // The subnamespace-of annotation is the truth: it required privileged
    // access to set. It is ignored while the namespace is being deleted so
    // a cascading delete can finish.
    let sub_of = namespace
        .meta
        .annotation(keys::SUBNAMESPACE_OF)
        .map(str::to_string);
    let is_sub = manager.is_none() && sub_of.is_some() && !namespace.meta.is_deleting();
    data.get(name).is_sub = is_sub;
    if is_sub && let Some(sub_parent) = sub_of {
        hierarchy.spec.parent = Some(sub_parent.clone());
        if !data.anchors(&sub_parent).iter().any(|a| a == name) {
            data.set_condition(
                name,
                Condition::affecting(
                    ConditionCode::SubnamespaceAnchorMissing,
                    &sub_parent,
                    format!(
                        "the anchor for this subnamespace is missing from parent '{sub_parent}'; recreate it or delete this namespace"
                    ),
                ),
            );
        }
    }

    if manager.is_none() {
        match hierarchy.spec.parent.as_deref() {
            None => data.set_parent(name, None),
            Some(parent) => {
                if !data.ns_exists(parent) {
                    data.set_condition(
                        name,
                        Condition::affecting(
                            ConditionCode::CritParentMissing,
                            parent,
                            format!(
                                "parent namespace '{parent}' does not exist; create it or clear the parent of '{name}'"
                            ),
                        ),
                    );
                }
                // A change that creates a cycle is accepted so the cycle is
                // observable; every member reports it in its own reconcile.
                data.set_parent(name, Some(parent));
            }
        }
    }

    for child in data.set_anchors(name, anchors.to_vec()) {
        pending.anchor(AnchorKey::new(name, child));
    }

    if let Some(cycle) = data.cycle_names(name) {
        let chain = cycle.join(" <- ");
        data.set_condition(
            name,
            Condition::new(
                ConditionCode::CritCycle,
                format!("namespace is a member of a cycle: {chain}; break it by changing one parent"),
            ),
        );
    }
    if schemas_deleting {
        data.set_condition(
            name,
            Condition::new(
                ConditionCode::CritDeletingCrd,
                "the controller's entity schemas are being deleted; propagation is paused",
            ),
        );
    }
    if let Some(ancestor) = data.nearest_crit_ancestor(name) {
        data.set_condition(
            name,
            Condition::affecting(
                ConditionCode::CritAncestor,
                &ancestor,
                format!("ancestor namespace '{ancestor}' has a critical condition"),
            ),
        );
    }

    if !existed {
        // Children observed before their parent carry CritParentMissing;
        // the first sighting of the parent lets them clear it.
        for child in data.child_names(name) {
            pending.namespace(child);
        }
    }

    update_depth_labels(data, name, namespace);
    data.get(name).labels = namespace.meta.labels.clone();

    let mut children = data.child_names(name);
    children.sort();
    hierarchy.status.children = children;
    hierarchy.status.conditions = data.conditions(name);

    let now_crit = data.has_crit(name);
    if was_crit != now_crit {
        // Descendants pause or resume propagation.
        for descendant in data.descendant_names(name) {
            pending.namespace(descendant);
        }
    }

    let new_parent = data.parent(name).map(str::to_string);
    SyncOutcome {
        structural_change: old_parent != new_parent
            || was_crit != now_crit
            || !existed
            || old_manager != manager,
    }
}

/// Rebuilds the depth labels: self at distance zero, then ancestors upward.
/// The walk stops before an ancestor with a local critical condition so
/// labels never cross a broken joint, and grafts the imported labels when
/// it reaches an external root.
fn update_depth_labels(data: &ForestData, name: &str, namespace: &mut Namespace) {
    namespace
        .meta
        .labels
        .retain(|key, _| keys::parse_tree_depth_label(key).is_none());

    if let Some(node) = data.try_get(name)
        && node.is_external()
    {
        for (ancestor, depth) in &node.external_tree_labels {
            namespace
                .meta
                .labels
                .insert(keys::tree_depth_label(ancestor), depth.to_string());
        }
        return;
    }

    namespace
        .meta
        .labels
        .insert(keys::tree_depth_label(name), "0".to_string());

    let ancestry = data.ancestry_names(name);
    for (depth, ancestor) in ancestry.iter().enumerate().skip(1) {
        if !data.ns_exists(ancestor) || data.has_local_crit(ancestor) {
            break;
        }
        if let Some(node) = data.try_get(ancestor)
            && node.is_external()
        {
            for (external_ancestor, external_depth) in &node.external_tree_labels {
                namespace.meta.labels.insert(
                    keys::tree_depth_label(external_ancestor),
                    (depth as u32 + external_depth).to_string(),
                );
            }
            break;
        }
        namespace
            .meta
            .labels
            .insert(keys::tree_depth_label(ancestor), depth.to_string());
    }
}
