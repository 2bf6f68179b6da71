use crate::{condition::Condition, kind::GroupResource, meta::ObjectMeta};
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// Mode
/// Per-kind propagation mode. A declaration without a mode means Propagate.
///

#[derive(
    Clone, Copy, Debug, Default, Display, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[remain::sorted]
pub enum Mode {
    /// Do not touch objects of this kind at all.
    Ignore,
    /// Source objects in ancestors are reflected into descendants.
    #[default]
    Propagate,
    /// Delete existing propagated copies; stop propagating; leave sources.
    Remove,
}

///
/// HncConfiguration
/// Cluster-scoped singleton enumerating the managed kinds and the annotation
/// keys that must never travel onto propagated copies.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HncConfiguration {
    pub meta: ObjectMeta,

    #[serde(default)]
    pub spec: HncConfigurationSpec,

    #[serde(default)]
    pub status: HncConfigurationStatus,
}

impl HncConfiguration {
    pub const SINGLETON_NAME: &'static str = "config";

    #[must_use]
    pub fn singleton() -> Self {
        Self {
            meta: ObjectMeta::named(Self::SINGLETON_NAME),
            ..Self::default()
        }
    }
}

///
/// HncConfigurationSpec
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HncConfigurationSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unpropagated_annotations: Vec<String>,
}

///
/// ResourceSpec
/// One declared kind and its requested mode.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub group: String,
    pub resource: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl ResourceSpec {
    #[must_use]
    pub fn new(group: impl Into<String>, resource: impl Into<String>, mode: Option<Mode>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
            mode,
        }
    }

    #[must_use]
    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(self.group.clone(), self.resource.clone())
    }

    /// The mode the declaration asks for, with unset meaning Propagate.
    #[must_use]
    pub fn effective_mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }
}

///
/// HncConfigurationStatus
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct HncConfigurationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceStatus>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

///
/// ResourceStatus
/// Per-kind status: the effective mode and object counts, with the resolved
/// version filled in from discovery.
///

#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ResourceStatus {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
    pub mode: Mode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_source_objects: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_propagated_objects: Option<u64>,
}
