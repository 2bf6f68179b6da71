use crate::{condition::Condition, meta::ObjectMeta};
use serde::{Deserialize, Serialize};

///
/// HierarchyConfiguration
/// Per-namespace entity storing the parent link and the cascading-deletion
/// flag; the controller maintains the status side. One per namespace, fixed
/// name.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfiguration {
    pub meta: ObjectMeta,

    #[serde(default)]
    pub spec: HierarchySpec,

    #[serde(default)]
    pub status: HierarchyStatus,
}

impl HierarchyConfiguration {
    pub const SINGLETON_NAME: &'static str = "hierarchy";

    /// An empty entity for `namespace`, as created on first writeback.
    #[must_use]
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::namespaced(namespace, Self::SINGLETON_NAME),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.meta.namespace.as_deref().unwrap_or_default()
    }
}

///
/// HierarchySpec
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HierarchySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_cascading_deletion: bool,
}

///
/// HierarchyStatus
/// Children and conditions are kept sorted so writebacks are byte-stable.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HierarchyStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_serializes_empty() {
        let entity = HierarchyConfiguration::for_namespace("foo");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["spec"], serde_json::json!({}));
        assert_eq!(json["status"], serde_json::json!({}));
        assert_eq!(entity.namespace(), "foo");
        assert_eq!(entity.meta.name, "hierarchy");
    }
}
