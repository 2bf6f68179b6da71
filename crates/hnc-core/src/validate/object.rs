use crate::cluster::{Cluster, ClusterError};
use crate::forest::Forest;
use crate::log;
use crate::log::Topic;
use crate::selectors;
use crate::settings::Settings;
use crate::validate::{Operation, ResponseCode, Review, Verdict, deny};
use hnc_api::{Manifest, Mode};
use std::sync::Arc;

///
/// ObjectValidator
/// Sources may be mutated freely as long as they do not shadow a descendant
/// source; propagated copies belong to the controller. Unlike the other
/// validators this one fails open: when in doubt, unrelated workloads keep
/// working.
///

pub struct ObjectValidator {
    forest: Arc<Forest>,
    cluster: Arc<dyn Cluster>,
    settings: Arc<Settings>,
}

impl ObjectValidator {
    #[must_use]
    pub fn new(forest: Arc<Forest>, cluster: Arc<dyn Cluster>, settings: Arc<Settings>) -> Self {
        Self {
            forest,
            cluster,
            settings,
        }
    }

    pub async fn review(&self, review: &Review<Manifest>) -> Verdict {
        match self.check(review).await {
            Ok(verdict) => verdict,
            Err(err) => {
                log!(
                    Topic::Validate,
                    WARN,
                    "object admission check unavailable, allowing: {err}",
                );
                Ok(())
            }
        }
    }

    async fn check(&self, review: &Review<Manifest>) -> Result<Verdict, ClusterError> {
        let subject = review.object.as_ref().or(review.old_object.as_ref());
        let Some(subject) = subject else {
            return Ok(Ok(()));
        };

        let mode = self
            .forest
            .lock()
            .get_kind_syncer(&subject.kind)
            .map(|syncer| syncer.mode());
        if mode != Some(Mode::Propagate) {
            return Ok(Ok(()));
        }
        if self.settings.is_excluded(subject.namespace()) {
            return Ok(Ok(()));
        }

        match review.operation {
            Operation::Create => match review.requested() {
                Ok(new) => Ok(self.check_create(new)),
                Err(denial) => Ok(Err(denial)),
            },
            Operation::Update => match (review.stored(), review.requested()) {
                (Ok(old), Ok(new)) => Ok(self.check_update(old, new)),
                (Err(denial), _) | (_, Err(denial)) => Ok(Err(denial)),
            },
            Operation::Delete => match review.stored() {
                Ok(old) => self.check_delete(old).await,
                Err(denial) => Ok(Err(denial)),
            },
        }
    }

    fn check_create(&self, manifest: &Manifest) -> Verdict {
        if manifest.is_propagated_copy() {
            return deny(
                ResponseCode::Forbidden,
                format!(
                    "object '{}' carries the inherited-from label; propagated copies are written only by the controller",
                    manifest.name()
                ),
            );
        }
        if let Err(err) = selectors::validate(&manifest.meta) {
            return deny(ResponseCode::Invalid, err.to_string());
        }
        self.check_descendant_collision(manifest)
    }

    fn check_update(&self, old: &Manifest, new: &Manifest) -> Verdict {
        if old.is_propagated_copy() {
            let source = old.inherited_from().unwrap_or_default().to_string();
            if new.inherited_from() != old.inherited_from() {
                return deny(
                    ResponseCode::Forbidden,
                    format!(
                        "the inherited-from label of '{}' cannot be changed or removed; it records the source namespace '{source}'",
                        old.name()
                    ),
                );
            }
            let unpropagated = self.forest.lock().unpropagated_annotations().to_vec();
            if new.canonical(&unpropagated) != old.canonical(&unpropagated) {
                return deny(
                    ResponseCode::Forbidden,
                    format!(
                        "object '{}' is propagated from '{source}'; edit the source there instead",
                        old.name()
                    ),
                );
            }
            return Ok(());
        }

        if new.is_propagated_copy() {
            return deny(
                ResponseCode::Forbidden,
                format!(
                    "the inherited-from label cannot be added to the source object '{}'",
                    new.name()
                ),
            );
        }
        if let Err(err) = selectors::validate(&new.meta) {
            return deny(ResponseCode::Invalid, err.to_string());
        }
        Ok(())
    }

    async fn check_delete(&self, manifest: &Manifest) -> Result<Verdict, ClusterError> {
        if !manifest.is_propagated_copy() {
            return Ok(Ok(()));
        }
        // Copies die with their namespace; otherwise they are removed by
        // the controller when the source goes away.
        let namespace = self.cluster.get_namespace(manifest.namespace()).await?;
        let verdict = match namespace {
            Some(ns) if !ns.meta.is_deleting() => deny(
                ResponseCode::Forbidden,
                format!(
                    "object '{}' is propagated from '{}'; delete the source there instead",
                    manifest.name(),
                    manifest.inherited_from().unwrap_or_default()
                ),
            ),
            _ => Ok(()),
        };
        Ok(verdict)
    }

    /// A new source must not shadow an existing source below it.
    fn check_descendant_collision(&self, manifest: &Manifest) -> Verdict {
        let data = self.forest.lock();
        for descendant in data.descendant_names(manifest.namespace()) {
            if data.has_source(&descendant, &manifest.kind, manifest.name()) {
                return deny(
                    ResponseCode::Conflict,
                    format!(
                        "creating '{}' here would overwrite the object of the same name in descendant '{descendant}'; rename or remove one of them",
                        manifest.name()
                    ),
                );
            }
        }
        Ok(())
    }
}
