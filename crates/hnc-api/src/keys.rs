//! Label and annotation keys exchanged with the orchestrator.
//!
//! All keys live under the `hnc.dev` group so they can be stripped or
//! filtered wholesale. The depth labels are the one dynamic family; the
//! helpers below build and recognize them.

/// Group suffix shared by every key the controller owns.
pub const META_GROUP: &str = "hnc.dev";

/// On a namespace: names the parent and asserts the namespace was created on
/// behalf of an anchor in that parent.
pub const SUBNAMESPACE_OF: &str = "hnc.dev/subnamespace-of";

/// On a namespace: names an external hierarchy manager. Namespaces so
/// annotated are treated as external roots.
pub const MANAGED_BY: &str = "hnc.dev/managed-by";

/// On a propagated object: names the source namespace.
pub const INHERITED_FROM: &str = "hnc.dev/inherited-from";

/// On a namespace: marks it as invisible to the controller.
pub const EXCLUDED_NAMESPACE: &str = "hnc.dev/excluded-namespace";

/// On a source object: label selector restricting destination namespaces.
pub const PROPAGATE_SELECT: &str = "propagate.hnc.dev/select";

/// On a source object: tree selector restricting destination subtrees.
pub const PROPAGATE_TREE_SELECT: &str = "propagate.hnc.dev/treeSelect";

/// On a source object: boolean switch suppressing all propagation.
pub const PROPAGATE_NONE: &str = "propagate.hnc.dev/none";

/// Finalizer protecting anchors and hierarchy entities while descendants
/// still depend on them.
pub const FINALIZER: &str = "hnc.dev/finalizer";

/// Secret type the orchestrator reaps on its own; never propagated.
pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "orchestrator.io/service-account-token";

const TREE_DEPTH_SUFFIX: &str = ".tree.hnc.dev/depth";

/// Builds the depth-label key recording the distance to `ancestor`.
#[must_use]
pub fn tree_depth_label(ancestor: &str) -> String {
    format!("{ancestor}{TREE_DEPTH_SUFFIX}")
}

/// Recognizes a depth-label key, returning the ancestor it names.
#[must_use]
pub fn parse_tree_depth_label(key: &str) -> Option<&str> {
    key.strip_suffix(TREE_DEPTH_SUFFIX)
}
