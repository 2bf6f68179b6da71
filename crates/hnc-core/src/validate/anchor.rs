use crate::forest::Forest;
use crate::settings::Settings;
use crate::validate::{Operation, ResponseCode, Review, Verdict, deny};
use hnc_api::SubnamespaceAnchor;
use std::sync::Arc;

///
/// AnchorValidator
/// Guards anchor placement and the deletions that would cascade through a
/// subtree.
///

pub struct AnchorValidator {
    forest: Arc<Forest>,
    settings: Arc<Settings>,
}

impl AnchorValidator {
    #[must_use]
    pub fn new(forest: Arc<Forest>, settings: Arc<Settings>) -> Self {
        Self { forest, settings }
    }

    pub fn review(&self, review: &Review<SubnamespaceAnchor>) -> Verdict {
        match review.operation {
            Operation::Create => self.review_create(review.requested()?),
            Operation::Update => Ok(()),
            Operation::Delete => self.review_delete(review.stored()?),
        }
    }

    fn review_create(&self, anchor: &SubnamespaceAnchor) -> Verdict {
        let parent = anchor.parent();
        let child = anchor.child();

        if self.settings.is_excluded(parent) {
            return deny(
                ResponseCode::Forbidden,
                format!("namespace '{parent}' is excluded from the hierarchy and cannot host subnamespaces"),
            );
        }

        let data = self.forest.lock();
        if let Some(node) = data.try_get(child)
            && node.exists
            && !node.is_sub
        {
            return deny(
                ResponseCode::Conflict,
                format!(
                    "the name '{child}' is already owned by a namespace that is not a subnamespace; pick another name"
                ),
            );
        }
        Ok(())
    }

    fn review_delete(&self, anchor: &SubnamespaceAnchor) -> Verdict {
        let child = anchor.child();
        let data = self.forest.lock();
        if !data.descendant_names(child).is_empty() && !data.cascading_deletion_allowed(child) {
            return deny(
                ResponseCode::Forbidden,
                format!(
                    "subnamespace '{child}' still has descendants; set allowCascadingDeletion on it or an ancestor before deleting the anchor"
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Arc<Forest>, AnchorValidator) {
        let forest = Forest::new();
        let validator = AnchorValidator::new(Arc::clone(&forest), Settings::test_default());
        (forest, validator)
    }

    #[test]
    fn excluded_namespaces_cannot_host_anchors() {
        let (_, validator) = fixture();
        let denial = validator
            .review(&Review::create("alice", SubnamespaceAnchor::new("system", "sub")))
            .unwrap_err();
        assert_eq!(denial.code, ResponseCode::Forbidden);
    }

    #[test]
    fn taken_names_are_rejected() {
        let (forest, validator) = fixture();
        forest.lock().get("taken").exists = true;

        let denial = validator
            .review(&Review::create("alice", SubnamespaceAnchor::new("parent", "taken")))
            .unwrap_err();
        assert_eq!(denial.code, ResponseCode::Conflict);

        // A name owned by a subnamespace is fine: that is the Ok/Conflict
        // state machine's business, not admission's.
        forest.lock().get("taken").is_sub = true;
        assert!(
            validator
                .review(&Review::create("alice", SubnamespaceAnchor::new("parent", "taken")))
                .is_ok()
        );
    }

    #[test]
    fn anchor_deletion_respects_descendants() {
        let (forest, validator) = fixture();
        {
            let mut data = forest.lock();
            data.get("sub").exists = true;
            data.set_parent("grandchild", Some("sub"));
        }

        let denial = validator
            .review(&Review::delete("alice", SubnamespaceAnchor::new("parent", "sub")))
            .unwrap_err();
        assert_eq!(denial.code, ResponseCode::Forbidden);

        forest.lock().get("sub").allow_cascading_deletion = true;
        assert!(
            validator
                .review(&Review::delete("alice", SubnamespaceAnchor::new("parent", "sub")))
                .is_ok()
        );
    }
}
