use crate::cluster::Cluster;
use crate::forest::Forest;
use crate::kinds::{enforced_kinds, is_enforced};
use crate::log;
use crate::log::Topic;
use crate::reconcile::{ObjectKey, ObjectReconciler, Pending, ReconcileError};
use crate::settings::Settings;
use hnc_api::{
    Condition, ConditionCode, GroupResource, HncConfiguration, KindRef, Mode, ResourceStatus,
    keys, reasons,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Cadence of the periodic pass that re-checks discovery and object counts
/// even when no event arrived.
pub const CONFIG_HEARTBEAT: Duration = Duration::from_secs(3);

/// Names listed per condition in the status summary before truncation.
const SUMMARY_NAME_LIMIT: usize = 3;

///
/// ConfigReconciler
/// Singleton: resolves the declared kinds, spawns or retunes the per-kind
/// object reconcilers, maintains the process-wide unpropagated-annotation
/// list, and aggregates status.
///

pub struct ConfigReconciler {
    forest: Arc<Forest>,
    cluster: Arc<dyn Cluster>,
    settings: Arc<Settings>,
}

impl ConfigReconciler {
    #[must_use]
    pub fn new(forest: Arc<Forest>, cluster: Arc<dyn Cluster>, settings: Arc<Settings>) -> Self {
        Self {
            forest,
            cluster,
            settings,
        }
    }

    pub async fn reconcile(&self) -> Result<Pending, ReconcileError> {
        let mut pending = Pending::default();

        let mut config = self
            .cluster
            .get_hnc_config()
            .await?
            .unwrap_or_else(HncConfiguration::singleton);
        let original = config.clone();

        let mut conditions: Vec<Condition> = Vec::new();
        let declared = self.effective_declarations(&config, &mut conditions);

        let mut statuses = Vec::new();
        let mut active_kinds: Vec<KindRef> = Vec::new();
        for (gr, mode) in declared {
            let Some(kind) = self.cluster.resolve_kind(&gr).await? else {
                conditions.push(
                    Condition::affecting(
                        ConditionCode::BadTypeConfiguration,
                        gr.to_string(),
                        format!(
                            "resource '{gr}' was not found; install its schema or remove the declaration"
                        ),
                    )
                    .with_reason(reasons::RESOURCE_NOT_FOUND),
                );
                continue;
            };
            active_kinds.push(kind.clone());
            self.ensure_syncer(&kind, mode, &mut pending).await?;

            let num_sources = self.forest.lock().num_sources(&kind);
            let num_propagated = self.count_propagated(&kind).await?;
            statuses.push(ResourceStatus {
                group: kind.group.clone(),
                version: kind.version.clone(),
                resource: kind.resource.clone(),
                mode,
                num_source_objects: Some(num_sources),
                num_propagated_objects: Some(num_propagated),
            });
        }

        // Kinds removed from the declaration flip to Ignore; true teardown
        // is deferred because workers cannot be shut down safely mid-key.
        let syncers = self.forest.lock().kind_syncers();
        for syncer in syncers {
            if !active_kinds.contains(&syncer.kind()) {
                syncer.set_mode(Mode::Ignore);
            }
        }

        let mut unpropagated = self.settings.propagation.unpropagated_annotations.clone();
        unpropagated.extend(config.spec.unpropagated_annotations.iter().cloned());
        unpropagated.sort();
        unpropagated.dedup();
        self.forest.lock().set_unpropagated_annotations(unpropagated);

        conditions.extend(self.summarize_namespace_conditions());

        statuses.sort();
        conditions.sort();
        config.status.resources = statuses;
        config.status.conditions = conditions;
        if config != original {
            self.cluster.update_hnc_config(&config).await?;
        }

        pending.dedup();
        Ok(pending)
    }

    /// Enforced kinds first, then the user's declarations with duplicates
    /// and enforced-mode downgrades reported but not honored.
    fn effective_declarations(
        &self,
        config: &HncConfiguration,
        conditions: &mut Vec<Condition>,
    ) -> Vec<(GroupResource, Mode)> {
        let mut declared: Vec<(GroupResource, Mode)> = enforced_kinds()
            .into_iter()
            .map(|gr| (gr, Mode::Propagate))
            .collect();

        for resource in &config.spec.resources {
            let gr = resource.group_resource();
            if is_enforced(&gr) {
                if resource.effective_mode() != Mode::Propagate {
                    conditions.push(
                        Condition::affecting(
                            ConditionCode::BadTypeConfiguration,
                            gr.to_string(),
                            format!(
                                "resource '{gr}' is always propagated; the declared mode is ignored"
                            ),
                        )
                        .with_reason(reasons::MULTIPLE_CONFIGS_FOR_TYPE),
                    );
                }
                continue;
            }
            if declared.iter().any(|(existing, _)| *existing == gr) {
                conditions.push(
                    Condition::affecting(
                        ConditionCode::BadTypeConfiguration,
                        gr.to_string(),
                        format!("resource '{gr}' is declared more than once; keeping the first"),
                    )
                    .with_reason(reasons::MULTIPLE_CONFIGS_FOR_TYPE),
                );
                continue;
            }
            declared.push((gr, resource.effective_mode()));
        }

        declared
    }

    /// Spawns the per-kind reconciler on first sight; a mode change on an
    /// existing one forces a full resync of the kind.
    async fn ensure_syncer(
        &self,
        kind: &KindRef,
        mode: Mode,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let existing = self.forest.lock().get_kind_syncer(kind);
        match existing {
            Some(syncer) => {
                if syncer.set_mode(mode) {
                    self.enqueue_kind_resync(kind, pending).await?;
                }
            }
            None => {
                log!(Topic::Config, INFO, "managing kind {kind} in mode {mode}");
                let syncer = ObjectReconciler::new(
                    kind.clone(),
                    mode,
                    Arc::clone(&self.forest),
                    Arc::clone(&self.cluster),
                    Arc::clone(&self.settings),
                );
                self.forest.lock().add_kind_syncer(syncer);
                self.enqueue_kind_resync(kind, pending).await?;
            }
        }
        Ok(())
    }

    /// Re-enqueues every object of the kind in every namespace: the objects
    /// that exist, plus every visible source name so empty destinations are
    /// (re)filled after a flip back to Propagate.
    async fn enqueue_kind_resync(
        &self,
        kind: &KindRef,
        pending: &mut Pending,
    ) -> Result<(), ReconcileError> {
        let namespaces = self.cluster.list_namespaces().await?;
        for namespace in &namespaces {
            let name = &namespace.meta.name;
            if self.settings.is_excluded(name)
                || namespace.meta.annotation(keys::EXCLUDED_NAMESPACE) == Some("true")
            {
                continue;
            }
            for manifest in self.cluster.list_objects(kind, name).await? {
                pending.object(ObjectKey::new(kind.clone(), name, manifest.name()));
            }
            let visible = self.forest.lock().visible_source_names(name, kind);
            for object_name in visible {
                pending.object(ObjectKey::new(kind.clone(), name, object_name));
            }
        }
        Ok(())
    }

    async fn count_propagated(&self, kind: &KindRef) -> Result<u64, ReconcileError> {
        let namespaces = self.cluster.list_namespaces().await?;
        let mut count = 0;
        for namespace in &namespaces {
            count += self
                .cluster
                .list_objects(kind, &namespace.meta.name)
                .await?
                .iter()
                .filter(|m| m.is_propagated_copy())
                .count() as u64;
        }
        Ok(count)
    }

    /// Per-condition namespace counts, truncating names beyond three for
    /// readability.
    pub(crate) fn summarize_namespace_conditions(&self) -> Vec<Condition> {
        let data = self.forest.lock();
        let mut by_code: BTreeMap<ConditionCode, Vec<String>> = BTreeMap::new();
        for name in data.node_names() {
            for condition in data.conditions(&name) {
                let names = by_code.entry(condition.code).or_default();
                if !names.contains(&name) {
                    names.push(name.clone());
                }
            }
        }

        by_code
            .into_iter()
            .map(|(code, names)| {
                let shown: Vec<&str> = names
                    .iter()
                    .take(SUMMARY_NAME_LIMIT)
                    .map(String::as_str)
                    .collect();
                let suffix = if names.len() > SUMMARY_NAME_LIMIT {
                    format!(" and {} more", names.len() - SUMMARY_NAME_LIMIT)
                } else {
                    String::new()
                };
                Condition::new(
                    code,
                    format!(
                        "{} namespace(s) affected: {}{suffix}",
                        names.len(),
                        shown.join(", ")
                    ),
                )
            })
            .collect()
    }
}


// The reconciler-driving tests for this module live in
// `tests/config_reconciler.rs`: they need `hnc-testkit`'s `InMemoryCluster`,
// which itself depends on this crate, so they cannot be inline unit tests
// without creating a dependency cycle within the test build.
