use crate::cluster::{Cluster, ClusterError};
use crate::forest::Forest;
use crate::validate::{Denial, Operation, ResponseCode, Review, Verdict, deny};
use hnc_api::{GroupResource, HncConfiguration, KindRef, Mode};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

///
/// ConfigValidator
/// Guards the configuration singleton: it cannot be deleted, declarations
/// must be unique and resolvable, and a mode flip must not overwrite
/// user-authored objects in descendants.
///

pub struct ConfigValidator {
    forest: Arc<Forest>,
    cluster: Arc<dyn Cluster>,
}

impl ConfigValidator {
    #[must_use]
    pub fn new(forest: Arc<Forest>, cluster: Arc<dyn Cluster>) -> Self {
        Self { forest, cluster }
    }

    pub async fn review(&self, review: &Review<HncConfiguration>) -> Verdict {
        if review.operation == Operation::Delete {
            return deny(
                ResponseCode::Forbidden,
                "the configuration singleton cannot be deleted; remove its resource declarations instead",
            );
        }
        let config = review.requested()?;

        let mut seen: BTreeSet<GroupResource> = BTreeSet::new();
        for resource in &config.spec.resources {
            let gr = resource.group_resource();
            if !seen.insert(gr.clone()) {
                return deny(
                    ResponseCode::Invalid,
                    format!("resource '{gr}' is declared more than once; remove the duplicate"),
                );
            }
        }

        // Everything below needs discovery or listing; unavailable means
        // reject (fail closed).
        match self.deep_checks(config).await {
            Ok(verdict) => verdict,
            Err(err) => deny(
                ResponseCode::ServiceUnavailable,
                format!("could not validate the configuration: {err}; try again later"),
            ),
        }
    }

    async fn deep_checks(&self, config: &HncConfiguration) -> Result<Verdict, ClusterError> {
        for resource in &config.spec.resources {
            let gr = resource.group_resource();
            let Some(kind) = self.cluster.resolve_kind(&gr).await? else {
                return Ok(deny(
                    ResponseCode::BadRequest,
                    format!("unknown resource '{gr}'; install its schema first"),
                ));
            };

            if resource.effective_mode() == Mode::Propagate {
                let current = self
                    .forest
                    .lock()
                    .get_kind_syncer(&kind)
                    .map(|syncer| syncer.mode());
                if current == Some(Mode::Propagate) {
                    continue;
                }
                if let Some(denial) = self.would_overwrite(&kind).await? {
                    return Ok(Err(denial));
                }
            }
        }
        Ok(Ok(()))
    }

    /// Simulates the first propagation pass of `kind`: any user-authored
    /// object shadowed by an identically-named user-authored object in an
    /// ancestor would be overwritten.
    async fn would_overwrite(&self, kind: &KindRef) -> Result<Option<Denial>, ClusterError> {
        let mut authored: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for namespace in self.cluster.list_namespaces().await? {
            let name = namespace.meta.name;
            let names: BTreeSet<String> = self
                .cluster
                .list_objects(kind, &name)
                .await?
                .into_iter()
                .filter(|m| !m.is_propagated_copy())
                .map(|m| m.name().to_string())
                .collect();
            if !names.is_empty() {
                authored.insert(name, names);
            }
        }

        let data = self.forest.lock();
        for (namespace, names) in &authored {
            for ancestor in data.ancestry_names(namespace).iter().skip(1) {
                let Some(ancestor_names) = authored.get(ancestor) else {
                    continue;
                };
                if let Some(collision) = names.intersection(ancestor_names).next() {
                    return Ok(Some(Denial {
                        code: ResponseCode::Conflict,
                        message: format!(
                            "switching '{}' to Propagate would overwrite object '{collision}' in '{namespace}' with the source in '{ancestor}'; rename or remove one of them",
                            kind.resource
                        ),
                    }));
                }
            }
        }
        Ok(None)
    }
}
