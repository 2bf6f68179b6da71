use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// GroupResource
/// The pair users declare in the configuration singleton. Resolution against
/// discovery turns it into a [`KindRef`].
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct GroupResource {
    #[serde(default)]
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    #[must_use]
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }
}

impl std::fmt::Display for GroupResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

///
/// KindRef
/// Canonical (group, version, kind) triple plus the plural resource name,
/// produced by discovery. Used as the registry key for kind syncers and as
/// the kind tag on manifests.
///

#[derive(
    Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[display("{kind}.{version}.{group}")]
pub struct KindRef {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    pub resource: String,
}

impl KindRef {
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            resource: resource.into(),
        }
    }

    #[must_use]
    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(self.group.clone(), self.resource.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_resource_display_elides_core_group() {
        assert_eq!(GroupResource::new("", "secrets").to_string(), "secrets");
        assert_eq!(
            GroupResource::new("rbac.orchestrator.io", "roles").to_string(),
            "roles.rbac.orchestrator.io"
        );
    }
}
