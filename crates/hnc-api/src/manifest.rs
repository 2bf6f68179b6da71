use crate::{keys, kind::KindRef, meta::ObjectMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;

///
/// Manifest
/// A managed object of an arbitrary kind: resolved kind tag, metadata, and
/// the canonical content (every field other than system-reserved metadata
/// and status, carried opaquely). Status is never propagated and never
/// compared, so it is not modeled here.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub kind: KindRef,
    pub meta: ObjectMeta,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
}

impl Manifest {
    #[must_use]
    pub fn new(kind: KindRef, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            meta: ObjectMeta::namespaced(namespace, name),
            content: Value::Null,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        self.meta.namespace.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The source namespace recorded on a propagated copy, if any.
    #[must_use]
    pub fn inherited_from(&self) -> Option<&str> {
        self.meta.label(keys::INHERITED_FROM)
    }

    pub fn set_inherited_from(&mut self, source_namespace: impl Into<String>) {
        self.meta.set_label(keys::INHERITED_FROM, source_namespace);
    }

    /// Whether the object carries the propagated-copy marker.
    #[must_use]
    pub fn is_propagated_copy(&self) -> bool {
        self.inherited_from().is_some()
    }

    /// Whether this is a secret the orchestrator reaps on its own.
    #[must_use]
    pub fn is_service_account_token(&self) -> bool {
        self.content.get("type").and_then(Value::as_str) == Some(keys::SERVICE_ACCOUNT_TOKEN_TYPE)
    }

    /// Canonical content for source-vs-copy comparison: the payload plus the
    /// user-authored metadata the controller reproduces (labels minus the
    /// inherited-from marker, annotations minus the given non-propagated
    /// keys).
    #[must_use]
    pub fn canonical(&self, unpropagated_annotations: &[String]) -> Canonical {
        let mut labels = self.meta.labels.clone();
        labels.remove(keys::INHERITED_FROM);

        let mut annotations = self.meta.annotations.clone();
        annotations.retain(|key, _| !unpropagated_annotations.iter().any(|k| k == key));

        Canonical {
            labels,
            annotations,
            content: self.content.clone(),
        }
    }
}

///
/// Canonical
/// The comparable portion of a manifest. Two objects with equal canonical
/// forms are considered in sync regardless of system-reserved metadata.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Canonical {
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub labels: std::collections::BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: std::collections::BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
}
