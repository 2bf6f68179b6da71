use crate::cluster::{Authorizer, Cluster};
use crate::forest::{Forest, ForestData};
use crate::validate::{Operation, ResponseCode, Review, Verdict, deny};
use hnc_api::{HierarchyConfiguration, Mode};
use std::sync::Arc;

///
/// HierarchyValidator
/// Rejects structural damage (cycles, unknown parents, external takeovers,
/// object-name collisions) under the forest lock, then performs the
/// authorization checks the move requires after releasing it.
///

pub struct HierarchyValidator {
    forest: Arc<Forest>,
    cluster: Arc<dyn Cluster>,
    authorizer: Arc<dyn Authorizer>,
}

/// Authorization work computed under the lock, performed after it.
enum AuthzPlan {
    /// The parent edge did not change (or only the flags did).
    None,
    /// The caller must administer each of these namespaces.
    Admins(Vec<String>),
    /// The recorded parent is unknown to the forest; the move is allowed
    /// only if the orchestrator agrees the parent is gone.
    ParentMustBeGone(String),
}

impl HierarchyValidator {
    #[must_use]
    pub fn new(
        forest: Arc<Forest>,
        cluster: Arc<dyn Cluster>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            forest,
            cluster,
            authorizer,
        }
    }

    pub async fn review(&self, review: &Review<HierarchyConfiguration>) -> Verdict {
        if review.operation == Operation::Delete {
            return Ok(());
        }
        let entity = review.requested()?;
        let namespace = entity.namespace().to_string();

        let plan = {
            let data = self.forest.lock();
            structural_checks(&data, &namespace, entity)?
        };

        self.authorize(&review.user, plan).await
    }

    async fn authorize(&self, user: &str, plan: AuthzPlan) -> Verdict {
        match plan {
            AuthzPlan::None => Ok(()),
            AuthzPlan::ParentMustBeGone(parent) => {
                match self.cluster.get_namespace(&parent).await {
                    Ok(None) => Ok(()),
                    Ok(Some(_)) => deny(
                        ResponseCode::ServiceUnavailable,
                        format!(
                            "the current parent '{parent}' has not been observed yet; try again later"
                        ),
                    ),
                    Err(err) => deny(
                        ResponseCode::ServiceUnavailable,
                        format!("could not confirm the state of '{parent}': {err}; try again later"),
                    ),
                }
            }
            AuthzPlan::Admins(namespaces) => {
                for namespace in namespaces {
                    match self.authorizer.is_admin(user, &namespace).await {
                        Ok(true) => {}
                        Ok(false) => {
                            return deny(
                                ResponseCode::Unauthorized,
                                format!(
                                    "user '{user}' must be an administrator of '{namespace}' to perform this move"
                                ),
                            );
                        }
                        Err(err) => {
                            return deny(
                                ResponseCode::ServiceUnavailable,
                                format!("authorization check failed: {err}; try again later"),
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn structural_checks(
    data: &ForestData,
    namespace: &str,
    entity: &HierarchyConfiguration,
) -> Result<AuthzPlan, crate::validate::Denial> {
    let new_parent = entity.spec.parent.clone();
    let old_parent = data.parent(namespace).map(str::to_string);
    if new_parent == old_parent {
        return Ok(AuthzPlan::None);
    }

    if let Some(node) = data.try_get(namespace)
        && let Some(manager) = &node.manager
    {
        deny(
            ResponseCode::Forbidden,
            format!(
                "namespace '{namespace}' is managed by '{manager}'; its hierarchy cannot be set here"
            ),
        )?;
    }

    if let Some(parent) = new_parent.as_deref() {
        if !data.ns_exists(parent) {
            deny(
                ResponseCode::BadRequest,
                format!("the proposed parent '{parent}' does not exist; create it first"),
            )?;
        }
        if let Some(reason) = data.can_set_parent(namespace, parent) {
            deny(ResponseCode::Conflict, reason)?;
        }
        collision_checks(data, namespace, parent)?;
    }

    // When the recorded parent never made it into the forest, the only
    // sound requirement is that it really is gone from the orchestrator.
    if let Some(old) = &old_parent
        && !data.ns_exists(old)
    {
        return Ok(AuthzPlan::ParentMustBeGone(old.clone()));
    }

    let old_root = data
        .ancestry_names(namespace)
        .last()
        .cloned()
        .unwrap_or_else(|| namespace.to_string());

    let plan = match new_parent.as_deref() {
        // Detaching a subtree: the old tree loses it, so its root decides.
        None => AuthzPlan::Admins(vec![old_root]),
        Some(parent) => {
            let new_root = data
                .ancestry_names(parent)
                .last()
                .cloned()
                .unwrap_or_else(|| parent.to_string());
            if old_root == new_root {
                AuthzPlan::Admins(vec![most_recent_common_ancestor(data, namespace, parent)])
            } else {
                AuthzPlan::Admins(vec![old_root, parent.to_string()])
            }
        }
    };
    Ok(plan)
}

/// Object-name collisions the move would introduce: for every
/// Propagate-mode kind, no source visible from the proposed parent may
/// collide with a source anywhere in the moved subtree.
fn collision_checks(
    data: &ForestData,
    namespace: &str,
    parent: &str,
) -> Result<(), crate::validate::Denial> {
    for syncer in data.kind_syncers() {
        if syncer.mode() != Mode::Propagate {
            continue;
        }
        let kind = syncer.kind();
        let incoming = data.visible_source_names(parent, &kind);
        if incoming.is_empty() {
            continue;
        }

        let mut subtree = vec![namespace.to_string()];
        subtree.extend(data.descendant_names(namespace));
        for member in &subtree {
            for name in data.source_names(member, &kind) {
                if incoming.contains(&name) {
                    deny(
                        ResponseCode::Conflict,
                        format!(
                            "moving '{namespace}' under '{parent}' would overwrite object '{}/{name}' in '{member}' with an ancestor source; rename or remove one of them",
                            kind.resource
                        ),
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Nearest namespace present in both ancestries. Only called when the two
/// share a root, so a common member always exists.
fn most_recent_common_ancestor(data: &ForestData, a: &str, b: &str) -> String {
    let ancestry_a = data.ancestry_names(a);
    data.ancestry_names(b)
        .into_iter()
        .find(|candidate| ancestry_a.contains(candidate))
        .unwrap_or_else(|| ancestry_a.last().cloned().unwrap_or_else(|| a.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_forest() -> Arc<Forest> {
        let forest = Forest::new();
        {
            let mut data = forest.lock();
            for name in ["r1", "r1a", "r1b", "r2"] {
                data.get(name).exists = true;
            }
            data.set_parent("r1a", Some("r1"));
            data.set_parent("r1b", Some("r1"));
        }
        forest
    }

    fn entity(ns: &str, parent: Option<&str>) -> HierarchyConfiguration {
        let mut entity = HierarchyConfiguration::for_namespace(ns);
        entity.spec.parent = parent.map(String::from);
        entity
    }

    #[test]
    fn cycles_and_unknown_parents_are_rejected() {
        let forest = seeded_forest();
        let data = forest.lock();

        let denial = structural_checks(&data, "r1", &entity("r1", Some("r1a")))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(denial.code, ResponseCode::Conflict);

        let denial = structural_checks(&data, "r1a", &entity("r1a", Some("ghost")))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(denial.code, ResponseCode::BadRequest);
    }

    #[test]
    fn unchanged_parent_needs_no_authorization() {
        let forest = seeded_forest();
        let data = forest.lock();
        let plan = structural_checks(&data, "r1a", &entity("r1a", Some("r1"))).unwrap();
        assert!(matches!(plan, AuthzPlan::None));
    }

    #[test]
    fn in_tree_moves_ask_for_the_common_ancestor() {
        let forest = seeded_forest();
        let data = forest.lock();
        let plan = structural_checks(&data, "r1a", &entity("r1a", Some("r1b"))).unwrap();
        match plan {
            AuthzPlan::Admins(admins) => assert_eq!(admins, ["r1"]),
            _ => panic!("expected admin checks"),
        }
    }

    #[test]
    fn cross_tree_moves_ask_for_both_sides() {
        let forest = seeded_forest();
        let data = forest.lock();
        let plan = structural_checks(&data, "r1a", &entity("r1a", Some("r2"))).unwrap();
        match plan {
            AuthzPlan::Admins(admins) => assert_eq!(admins, ["r1", "r2"]),
            _ => panic!("expected admin checks"),
        }
    }

    #[test]
    fn external_namespaces_cannot_be_reparented() {
        let forest = seeded_forest();
        forest.lock().get("r2").manager = Some("other".to_string());
        let data = forest.lock();
        let denial = structural_checks(&data, "r2", &entity("r2", Some("r1")))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(denial.code, ResponseCode::Forbidden);
    }
}
