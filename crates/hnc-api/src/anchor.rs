use crate::meta::ObjectMeta;
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// AnchorState
/// Observed relationship between an anchor and the namespace it names.
///

#[derive(
    Clone, Copy, Debug, Default, Display, Eq, PartialEq, Serialize, Deserialize,
)]
#[remain::sorted]
pub enum AnchorState {
    /// The namespace exists but its subnamespace-of annotation names a
    /// different parent.
    Conflict,
    /// The anchor sits in an excluded namespace; nothing will be created.
    Forbidden,
    /// No namespace with the anchor's name exists yet.
    #[default]
    Missing,
    /// The namespace exists and points back at the anchor's namespace.
    Ok,
}

///
/// SubnamespaceAnchor
/// Lives in the parent namespace under the child's name; its presence
/// declares that the child should exist as a subnamespace. The spec side is
/// deliberately empty.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubnamespaceAnchor {
    pub meta: ObjectMeta,

    #[serde(default)]
    pub status: AnchorStatus,
}

impl SubnamespaceAnchor {
    #[must_use]
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            meta: ObjectMeta::namespaced(parent, child),
            ..Self::default()
        }
    }

    /// The parent namespace, i.e. where the anchor lives.
    #[must_use]
    pub fn parent(&self) -> &str {
        self.meta.namespace.as_deref().unwrap_or_default()
    }

    /// The subnamespace the anchor declares.
    #[must_use]
    pub fn child(&self) -> &str {
        &self.meta.name
    }
}

///
/// AnchorStatus
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AnchorStatus {
    #[serde(default)]
    pub state: AnchorState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_names_both_ends() {
        let anchor = SubnamespaceAnchor::new("parent", "child");
        assert_eq!(anchor.parent(), "parent");
        assert_eq!(anchor.child(), "child");
        assert_eq!(anchor.status.state, AnchorState::Missing);
    }
}
