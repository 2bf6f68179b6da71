use crate::cluster::{Cluster, ClusterError};
use crate::forest::{Forest, ForestData};
use crate::kinds::KindSyncer;
use crate::log;
use crate::log::Topic;
use crate::reconcile::{ObjectKey, Pending, ReconcileError, UNKNOWN_SOURCE};
use crate::selectors::PropagationSelectors;
use crate::settings::Settings;
use async_trait::async_trait;
use hnc_api::{Condition, ConditionCode, KindRef, Manifest, Mode};
use parking_lot::RwLock;
use std::sync::Arc;

///
/// ObjectReconciler
/// One instance per managed kind. Maintains the at-most-one-source /
/// zero-or-more-propagated-copy invariant for its kind across the forest.
///

pub struct ObjectReconciler {
    kind: KindRef,
    mode: RwLock<Mode>,
    forest: Arc<Forest>,
    cluster: Arc<dyn Cluster>,
    settings: Arc<Settings>,
}

/// The staged decision computed under the forest lock and performed after
/// releasing it.
enum Action {
    /// Nothing to do, or the namespace is paused by a critical condition.
    None,
    /// Overwrite (or create) the propagated copy from its source.
    Write {
        source_namespace: String,
        source: Manifest,
        dest_exists: bool,
    },
    /// The object is a stale or suppressed propagated copy.
    Remove { source_namespace: Option<String> },
}

impl ObjectReconciler {
    #[must_use]
    pub fn new(
        kind: KindRef,
        mode: Mode,
        forest: Arc<Forest>,
        cluster: Arc<dyn Cluster>,
        settings: Arc<Settings>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            mode: RwLock::new(mode),
            forest,
            cluster,
            settings,
        })
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Pending, ReconcileError> {
        let mut pending = Pending::default();
        if self.mode() == Mode::Ignore || self.settings.is_excluded(&key.namespace) {
            return Ok(pending);
        }

        let instance = self
            .cluster
            .get_object(&self.kind, &key.namespace, &key.name)
            .await?;

        let action = {
            let mut data = self.forest.lock();
            self.decide(&mut data, key, instance, &mut pending)
        };

        match action {
            Action::None => {}
            Action::Write {
                source_namespace,
                source,
                dest_exists,
            } => {
                self.write_copy(key, &source_namespace, &source, dest_exists, &mut pending)
                    .await?;
            }
            Action::Remove { source_namespace } => {
                self.remove_copy(key, source_namespace.as_deref(), &mut pending)
                    .await?;
            }
        }

        pending.dedup();
        Ok(pending)
    }

    /// Sync-with-forest: classify the instance, record source state, and
    /// stage the action. Lock held, no I/O.
    fn decide(
        &self,
        data: &mut ForestData,
        key: &ObjectKey,
        instance: Option<Manifest>,
        pending: &mut Pending,
    ) -> Action {
        // A namespace the hierarchy reconciler has not yet seen, or one
        // being torn down: a later reconcile sees the final state.
        if !data.ns_exists(&key.namespace) {
            return Action::None;
        }
        if instance.as_ref().is_some_and(|m| m.meta.is_deleting()) {
            return Action::None;
        }

        let (instance, dest_exists) = match instance {
            Some(manifest) => (manifest, true),
            None => {
                if data.has_source(&key.namespace, &self.kind, &key.name) {
                    // A just-deleted source: forget it and wake the
                    // descendants holding its copies.
                    data.delete_source_object(&key.namespace, &self.kind, &key.name);
                    self.clear_source_conditions(data, &key.namespace, &key.name, pending);
                    for descendant in data.descendant_names(&key.namespace) {
                        pending.object(ObjectKey::new(self.kind.clone(), descendant, &key.name));
                    }
                    // Source counts changed.
                    pending.config = true;
                    return Action::None;
                }
                // Tag the absent object as propagated-from-unknown so the
                // rest of the flow treats absence and presence uniformly.
                let mut stand_in = Manifest::new(self.kind.clone(), &key.namespace, &key.name);
                stand_in.set_inherited_from(UNKNOWN_SOURCE);
                (stand_in, false)
            }
        };

        // A local source record that the live object contradicts (it now
        // carries the inherited-from marker) is stale; drop it before the
        // ancestry lookup.
        if instance.is_propagated_copy()
            && data.has_source(&key.namespace, &self.kind, &key.name)
        {
            data.delete_source_object(&key.namespace, &self.kind, &key.name);
        }

        let source = data.get_source(&key.namespace, &self.kind, &key.name);

        let action = match source {
            None if instance.is_propagated_copy() => {
                if dest_exists {
                    Action::Remove {
                        source_namespace: instance.inherited_from().map(str::to_string),
                    }
                } else {
                    Action::None
                }
            }
            None => self.record_source(data, key, instance, pending),
            Some((source_namespace, _)) if source_namespace == key.namespace => {
                if instance.is_propagated_copy() {
                    // The record was just dropped above; nothing shadows
                    // this name anymore.
                    if dest_exists {
                        Action::Remove {
                            source_namespace: instance.inherited_from().map(str::to_string),
                        }
                    } else {
                        Action::None
                    }
                } else {
                    self.record_source(data, key, instance, pending)
                }
            }
            Some((source_namespace, source_manifest)) => self.copy_decision(
                data,
                key,
                &instance,
                dest_exists,
                source_namespace,
                source_manifest,
                pending,
            ),
        };

        // A critical condition pauses the namespace: the decision was
        // recorded in the forest so the right thing happens once it clears.
        if data.has_crit(&key.namespace) {
            return Action::None;
        }
        action
    }

    /// The authoritative source lives in this namespace: record it and wake
    /// descendants when its content changed.
    fn record_source(
        &self,
        data: &mut ForestData,
        key: &ObjectKey,
        instance: Manifest,
        pending: &mut Pending,
    ) -> Action {
        if self.should_propagate(data, &key.namespace, &key.name, &instance, pending) {
            self.clear_source_conditions(data, &key.namespace, &key.name, pending);
        }
        if data.set_source_object(instance) {
            for descendant in data.descendant_names(&key.namespace) {
                pending.object(ObjectKey::new(self.kind.clone(), descendant, &key.name));
            }
            pending.config = true;
        }
        Action::None
    }

    /// The object is (or should be) a propagated copy of an ancestor
    /// source.
    fn copy_decision(
        &self,
        data: &mut ForestData,
        key: &ObjectKey,
        instance: &Manifest,
        dest_exists: bool,
        source_namespace: String,
        source: Manifest,
        pending: &mut Pending,
    ) -> Action {
        let remove = |instance: &Manifest| {
            if dest_exists {
                Action::Remove {
                    source_namespace: instance
                        .inherited_from()
                        .map(str::to_string)
                        .or_else(|| Some(source_namespace.clone())),
                }
            } else {
                Action::None
            }
        };

        if !self.should_propagate(data, &source_namespace, &key.name, &source, pending) {
            return remove(instance);
        }

        // Selectors restrict destinations; a malformed value observed at
        // runtime propagates nowhere rather than overwriting anything.
        let dest_labels = data
            .try_get(&key.namespace)
            .map(|node| node.labels.clone())
            .unwrap_or_default();
        let allowed = PropagationSelectors::parse(&source.meta)
            .map(|selectors| selectors.allows(&dest_labels))
            .unwrap_or(false);
        if !allowed {
            return remove(instance);
        }

        // A source namespace paused by a critical condition propagates
        // nothing out; existing copies are left untouched.
        if data.has_crit(&source_namespace) {
            return Action::None;
        }

        let unpropagated = data.unpropagated_annotations().to_vec();
        let in_sync = dest_exists
            && instance.inherited_from() == Some(source_namespace.as_str())
            && instance.canonical(&unpropagated) == source.canonical(&unpropagated);
        if in_sync {
            return Action::None;
        }

        Action::Write {
            source_namespace,
            source,
            dest_exists,
        }
    }

    /// Suppression rules for sources. Raises or clears `CannotPropagate` on
    /// the source namespace as a side effect of the finalizer rule.
    fn should_propagate(
        &self,
        data: &mut ForestData,
        source_namespace: &str,
        name: &str,
        source: &Manifest,
        pending: &mut Pending,
    ) -> bool {
        if self.mode() == Mode::Remove {
            return false;
        }
        if !source.meta.finalizers.is_empty() {
            let changed = data.set_condition(
                source_namespace,
                Condition::affecting(
                    ConditionCode::CannotPropagate,
                    self.object_id(name),
                    format!(
                        "object '{name}' has finalizers and cannot be propagated; remove them to resume"
                    ),
                ),
            );
            if changed {
                // The source namespace surfaces the advisory in its status.
                pending.namespace(source_namespace);
            }
            return false;
        }
        self.clear_source_conditions(data, source_namespace, name, pending);
        if source.is_service_account_token() {
            return false;
        }
        true
    }

    fn clear_source_conditions(
        &self,
        data: &mut ForestData,
        source_namespace: &str,
        name: &str,
        pending: &mut Pending,
    ) {
        let cleared = data.clear_condition(
            source_namespace,
            ConditionCode::CannotPropagate,
            Some(&self.object_id(name)),
        );
        if cleared {
            pending.namespace(source_namespace);
        }
    }

    fn object_id(&self, name: &str) -> String {
        format!("{}/{name}", self.kind.resource)
    }

    /// Composes the destination object and writes it, falling back to
    /// delete-then-create when the orchestrator rejects an in-place update
    /// as Invalid (some kinds carry immutable spec fields).
    async fn write_copy(
        &self,
        key: &ObjectKey,
        source_namespace: &str,
        source: &Manifest,
        dest_exists: bool,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let unpropagated = self.forest.lock().unpropagated_annotations().to_vec();

        let mut dest = Manifest::new(self.kind.clone(), &key.namespace, &key.name);
        dest.content = source.content.clone();
        dest.meta.labels = source.meta.labels.clone();
        dest.meta.annotations = source.meta.annotations.clone();
        for annotation in &unpropagated {
            dest.meta.remove_annotation(annotation);
        }
        dest.set_inherited_from(source_namespace);

        let result = if dest_exists {
            match self.cluster.update_object(&dest).await {
                Err(err) if err.is_invalid() => {
                    self.cluster
                        .delete_object(&self.kind, &key.namespace, &key.name)
                        .await?;
                    self.cluster.create_object(&dest).await
                }
                other => other,
            }
        } else {
            self.cluster.create_object(&dest).await
        };

        self.record_write_outcome(key, source_namespace, result, "propagate", pending)
    }

    async fn remove_copy(
        &self,
        key: &ObjectKey,
        source_namespace: Option<&str>,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let result = match self
            .cluster
            .delete_object(&self.kind, &key.namespace, &key.name)
            .await
        {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        };

        self.record_write_outcome(
            key,
            source_namespace.unwrap_or(UNKNOWN_SOURCE),
            result,
            "remove",
            pending,
        )
    }

    /// Condition bookkeeping after the API call, under a fresh lock. The
    /// hierarchy may have changed while unlocked, and the failing copy may
    /// never have been created, so clearing covers both the real source
    /// namespace and the unknown-source sentinel.
    fn record_write_outcome(
        &self,
        key: &ObjectKey,
        source_namespace: &str,
        result: Result<(), ClusterError>,
        verb: &str,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let mut data = self.forest.lock();
        match result {
            Ok(()) => {
                let mut cleared = data.clear_condition(
                    &key.namespace,
                    ConditionCode::CannotUpdate,
                    Some(source_namespace),
                );
                cleared |= data.clear_condition(
                    &key.namespace,
                    ConditionCode::CannotUpdate,
                    Some(UNKNOWN_SOURCE),
                );
                if cleared {
                    pending.namespace(&key.namespace);
                }
                Ok(())
            }
            Err(err) => {
                log!(
                    Topic::Object,
                    WARN,
                    "failed to {verb} '{}' in '{}': {err}",
                    key.name,
                    key.namespace,
                );
                data.set_condition(
                    &key.namespace,
                    Condition::affecting(
                        ConditionCode::CannotUpdate,
                        source_namespace,
                        format!(
                            "could not {verb} object '{}' from '{source_namespace}': {err}",
                            key.name
                        ),
                    ),
                );
                data.set_condition(
                    source_namespace,
                    Condition::affecting(
                        ConditionCode::CannotPropagate,
                        self.object_id(&key.name),
                        format!(
                            "object '{}' could not be written to '{}': {err}",
                            key.name, key.namespace
                        ),
                    ),
                );
                pending.namespace(&key.namespace);
                pending.namespace(source_namespace);
                Err(err.into())
            }
        }
    }

    fn mode_value(&self) -> Mode {
        *self.mode.read()
    }
}

#[async_trait]
impl KindSyncer for ObjectReconciler {
    fn kind(&self) -> KindRef {
        self.kind.clone()
    }

    fn mode(&self) -> Mode {
        self.mode_value()
    }

    fn set_mode(&self, mode: Mode) -> bool {
        let mut current = self.mode.write();
        if *current == mode {
            false
        } else {
            log!(
                Topic::Config,
                INFO,
                "kind {} switching from {} to {mode}",
                self.kind,
                *current,
            );
            *current = mode;
            true
        }
    }

    async fn reconcile_object(&self, key: &ObjectKey) -> Result<Pending, ReconcileError> {
        self.reconcile(key).await
    }
}

// The reconciler-driving tests for this module live in
// `tests/object_reconciler.rs`: they need `hnc-testkit`'s `InMemoryCluster`,
// which itself depends on this crate, so they cannot be inline unit tests
// without creating a dependency cycle within the test build.
