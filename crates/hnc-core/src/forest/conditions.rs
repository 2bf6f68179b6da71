use super::ForestData;
use hnc_api::{Condition, ConditionCode};

impl ForestData {
    //
    // Conditions, keyed by (code, affected object)
    //

    /// Sets `condition` on `namespace`, replacing any existing condition
    /// with the same key. Returns whether the stored set changed.
    pub fn set_condition(&mut self, namespace: &str, condition: Condition) -> bool {
        let node = self.get(namespace);
        if let Some(existing) = node
            .conditions
            .iter_mut()
            .find(|c| c.key() == condition.key())
        {
            if *existing == condition {
                return false;
            }
            *existing = condition;
        } else {
            node.conditions.push(condition);
        }
        true
    }

    /// Clears the condition with the given key, returning whether one was
    /// present.
    pub fn clear_condition(
        &mut self,
        namespace: &str,
        code: ConditionCode,
        affects: Option<&str>,
    ) -> bool {
        let node = self.get(namespace);
        let before = node.conditions.len();
        node.conditions
            .retain(|c| c.key() != (code, affects));
        node.conditions.len() != before
    }

    /// Clears every condition on `namespace` for which `retire` is true.
    pub fn clear_conditions_where(
        &mut self,
        namespace: &str,
        retire: impl Fn(&Condition) -> bool,
    ) {
        self.get(namespace).conditions.retain(|c| !retire(c));
    }

    /// All conditions on `namespace`, sorted for stable status output.
    #[must_use]
    pub fn conditions(&self, namespace: &str) -> Vec<Condition> {
        let mut out = self
            .try_get(namespace)
            .map(|ns| ns.conditions.clone())
            .unwrap_or_default();
        out.sort();
        out
    }

    #[must_use]
    pub fn has_condition(&self, namespace: &str, code: ConditionCode) -> bool {
        self.try_get(namespace)
            .is_some_and(|ns| ns.conditions.iter().any(|c| c.code == code))
    }

    /// Whether `namespace` carries a critical condition of its own, i.e.
    /// one not merely propagated from an ancestor.
    #[must_use]
    pub fn has_local_crit(&self, namespace: &str) -> bool {
        self.try_get(namespace).is_some_and(|ns| {
            ns.conditions
                .iter()
                .any(|c| c.code.is_critical() && c.code != ConditionCode::CritAncestor)
        })
    }

    /// Whether `namespace` carries any critical condition, local or
    /// propagated. Propagation in and out halts while this holds.
    #[must_use]
    pub fn has_crit(&self, namespace: &str) -> bool {
        self.try_get(namespace)
            .is_some_and(|ns| ns.conditions.iter().any(|c| c.code.is_critical()))
    }

    /// The nearest strict ancestor carrying a local critical condition.
    #[must_use]
    pub fn nearest_crit_ancestor(&self, namespace: &str) -> Option<String> {
        self.ancestry_names(namespace)
            .into_iter()
            .skip(1)
            .find(|ancestor| self.has_local_crit(ancestor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_by_key() {
        let mut data = ForestData::default();
        assert!(data.set_condition(
            "ns",
            Condition::affecting(ConditionCode::CannotUpdate, "src", "first"),
        ));
        assert!(data.set_condition(
            "ns",
            Condition::affecting(ConditionCode::CannotUpdate, "src", "second"),
        ));
        assert!(!data.set_condition(
            "ns",
            Condition::affecting(ConditionCode::CannotUpdate, "src", "second"),
        ));

        let conditions = data.conditions("ns");
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "second");
    }

    #[test]
    fn crit_classification() {
        let mut data = ForestData::default();
        data.set_parent("child", Some("parent"));
        data.set_condition(
            "parent",
            Condition::new(ConditionCode::CritParentMissing, "missing"),
        );
        data.set_condition(
            "child",
            Condition::affecting(ConditionCode::CritAncestor, "parent", "ancestor broken"),
        );

        assert!(data.has_local_crit("parent"));
        assert!(!data.has_local_crit("child"));
        assert!(data.has_crit("child"));
        assert_eq!(data.nearest_crit_ancestor("child").as_deref(), Some("parent"));
    }

    #[test]
    fn nearest_crit_ancestor_picks_the_closest() {
        let mut data = ForestData::default();
        data.set_parent("mid", Some("root"));
        data.set_parent("leaf", Some("mid"));
        data.set_condition(
            "root",
            Condition::new(ConditionCode::CritParentMissing, "missing"),
        );
        data.set_condition("mid", Condition::new(ConditionCode::CritCycle, "cycle"));

        assert_eq!(data.nearest_crit_ancestor("leaf").as_deref(), Some("mid"));
    }
}
