use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// ConditionCode
/// The taxonomy of observed problems. Critical codes halt propagation into
/// and out of the affected namespace and its subtree.
///

#[derive(
    Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[remain::sorted]
pub enum ConditionCode {
    BadTypeConfiguration,
    CannotPropagate,
    CannotUpdate,
    CritAncestor,
    CritCycle,
    CritDeletingCrd,
    CritParentMissing,
    ObjectReconcilerCreationFailed,
    SubnamespaceAnchorMissing,
}

impl ConditionCode {
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(
            self,
            Self::CritAncestor | Self::CritCycle | Self::CritDeletingCrd | Self::CritParentMissing
        )
    }
}

/// Reasons carried on `BadTypeConfiguration` conditions.
pub mod reasons {
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
    pub const MULTIPLE_CONFIGS_FOR_TYPE: &str = "MultipleConfigsForType";
}

///
/// Condition
/// One observed problem: the code, the object or namespace it concerns (when
/// narrower than the entity the condition is stored on), and a user-facing
/// message naming a corrective action where one exists.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Condition {
    pub code: ConditionCode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affects: Option<String>,

    pub message: String,
}

impl Condition {
    #[must_use]
    pub fn new(code: ConditionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: None,
            affects: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn affecting(
        code: ConditionCode,
        affects: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            reason: None,
            affects: Some(affects.into()),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Conditions are keyed by (code, affects); the message is payload.
    #[must_use]
    pub fn key(&self) -> (ConditionCode, Option<&str>) {
        (self.code, self.affects.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criticality() {
        assert!(ConditionCode::CritCycle.is_critical());
        assert!(ConditionCode::CritAncestor.is_critical());
        assert!(!ConditionCode::SubnamespaceAnchorMissing.is_critical());
        assert!(!ConditionCode::CannotPropagate.is_critical());
    }

    #[test]
    fn keyed_by_code_and_affects() {
        let a = Condition::affecting(ConditionCode::CannotUpdate, "src", "one");
        let b = Condition::affecting(ConditionCode::CannotUpdate, "src", "two");
        assert_eq!(a.key(), b.key());
    }
}
