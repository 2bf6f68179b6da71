use crate::MANAGER_ID;
use crate::forest::Forest;
use crate::settings::Settings;
use crate::validate::{Operation, ResponseCode, Review, Verdict, deny};
use hnc_api::{Namespace, keys};
use std::sync::Arc;

///
/// NamespaceValidator
/// Guards namespace creations against external-hierarchy reservations,
/// manager reassignments onto parented namespaces, and deletions that would
/// orphan or silently destroy subnamespaces.
///

pub struct NamespaceValidator {
    forest: Arc<Forest>,
    settings: Arc<Settings>,
}

impl NamespaceValidator {
    #[must_use]
    pub fn new(forest: Arc<Forest>, settings: Arc<Settings>) -> Self {
        Self { forest, settings }
    }

    pub fn review(&self, review: &Review<Namespace>) -> Verdict {
        match review.operation {
            Operation::Create => self.review_create(review.requested()?),
            Operation::Update => self.review_update(review.requested()?),
            Operation::Delete => self.review_delete(review.stored()?),
        }
    }

    fn review_create(&self, namespace: &Namespace) -> Verdict {
        let name = &namespace.meta.name;
        if self.settings.is_excluded(name) {
            return Ok(());
        }

        let data = self.forest.lock();
        if data.ns_exists(name) {
            return Ok(());
        }
        // A name appearing in an external root's imported tree is reserved
        // by that hierarchy even before the namespace itself shows up here.
        for node_name in data.node_names() {
            let Some(node) = data.try_get(&node_name) else {
                continue;
            };
            if node.exists
                && node.is_external()
                && node_name != *name
                && node.external_tree_labels.contains_key(name)
            {
                return deny(
                    ResponseCode::AlreadyExists,
                    format!(
                        "the name '{name}' is reserved by the external hierarchy rooted at '{node_name}'"
                    ),
                );
            }
        }
        Ok(())
    }

    fn review_update(&self, namespace: &Namespace) -> Verdict {
        let name = &namespace.meta.name;
        let manager = namespace
            .meta
            .annotation(keys::MANAGED_BY)
            .filter(|m| *m != MANAGER_ID);
        let Some(manager) = manager else {
            return Ok(());
        };

        let data = self.forest.lock();
        if data.parent(name).is_some() {
            return deny(
                ResponseCode::Forbidden,
                format!(
                    "namespace '{name}' has a parent in this hierarchy and cannot be handed to '{manager}'; clear the parent first"
                ),
            );
        }
        Ok(())
    }

    fn review_delete(&self, namespace: &Namespace) -> Verdict {
        let name = &namespace.meta.name;
        let data = self.forest.lock();
        let Some(node) = data.try_get(name) else {
            return Ok(());
        };

        // A subnamespace is deleted through its anchor, not directly.
        if node.is_sub
            && let Some(parent) = node.parent()
            && data.anchors(parent).iter().any(|a| a == name)
        {
            return deny(
                ResponseCode::Forbidden,
                format!(
                    "namespace '{name}' is a subnamespace of '{parent}'; delete its anchor there instead"
                ),
            );
        }

        if !data.cascading_deletion_allowed(name) {
            let blocked: Vec<String> = data
                .child_names(name)
                .into_iter()
                .filter(|child| {
                    data.try_get(child).is_some_and(|c| c.is_sub)
                        && !data.cascading_deletion_allowed(child)
                })
                .collect();
            if !blocked.is_empty() {
                return deny(
                    ResponseCode::Forbidden,
                    format!(
                        "namespace '{name}' has subnamespaces that do not allow cascading deletion ({}); set allowCascadingDeletion on '{name}' or on each of them",
                        blocked.join(", ")
                    ),
                );
            }
        }
        Ok(())
    }
}
