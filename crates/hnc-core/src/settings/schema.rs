use crate::ThisError;
use serde::{Deserialize, Serialize};

///
/// SettingsSchemaError
///

#[derive(Debug, ThisError)]
pub enum SettingsSchemaError {
    #[error("excluded namespace '{0}' is listed more than once")]
    DuplicateExclusion(String),

    #[error("excluded namespace name must not be empty")]
    EmptyExclusion,

    #[error("workers.{0} must be at least 1")]
    ZeroWorkers(&'static str),
}

///
/// Validate
/// Schema sections validate themselves after deserialization; parsing alone
/// is not acceptance.
///

pub trait Validate {
    fn validate(&self) -> Result<(), SettingsSchemaError>;
}

///
/// Settings
/// Process configuration. Excluded namespaces are invisible to the
/// controller: never synced, never propagated into, and may not host
/// anchors.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub excluded: ExcludedSettings,

    #[serde(default)]
    pub workers: WorkerSettings,

    #[serde(default)]
    pub propagation: PropagationSettings,
}

impl Settings {
    #[must_use]
    pub fn is_excluded(&self, namespace: &str) -> bool {
        self.excluded.namespaces.iter().any(|ns| ns == namespace)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<(), SettingsSchemaError> {
        self.excluded.validate()?;
        self.workers.validate()?;

        Ok(())
    }
}

///
/// ExcludedSettings
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExcludedSettings {
    #[serde(default = "ExcludedSettings::default_namespaces")]
    pub namespaces: Vec<String>,
}

impl ExcludedSettings {
    fn default_namespaces() -> Vec<String> {
        ["system", "public", "hnc-system", "cert-system"]
            .map(String::from)
            .to_vec()
    }
}

impl Default for ExcludedSettings {
    fn default() -> Self {
        Self {
            namespaces: Self::default_namespaces(),
        }
    }
}

impl Validate for ExcludedSettings {
    fn validate(&self) -> Result<(), SettingsSchemaError> {
        for (i, ns) in self.namespaces.iter().enumerate() {
            if ns.is_empty() {
                return Err(SettingsSchemaError::EmptyExclusion);
            }
            if self.namespaces[..i].contains(ns) {
                return Err(SettingsSchemaError::DuplicateExclusion(ns.clone()));
            }
        }

        Ok(())
    }
}

///
/// WorkerSettings
/// Reconcile concurrency per queue. Single-writer-per-key is guaranteed by
/// the queue regardless of these bounds.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WorkerSettings {
    #[serde(default = "WorkerSettings::default_hierarchy")]
    pub hierarchy: usize,

    #[serde(default = "WorkerSettings::default_objects")]
    pub objects: usize,
}

impl WorkerSettings {
    const fn default_hierarchy() -> usize {
        8
    }

    const fn default_objects() -> usize {
        16
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            hierarchy: Self::default_hierarchy(),
            objects: Self::default_objects(),
        }
    }
}

impl Validate for WorkerSettings {
    fn validate(&self) -> Result<(), SettingsSchemaError> {
        if self.hierarchy == 0 {
            return Err(SettingsSchemaError::ZeroWorkers("hierarchy"));
        }
        if self.objects == 0 {
            return Err(SettingsSchemaError::ZeroWorkers("objects"));
        }

        Ok(())
    }
}

///
/// PropagationSettings
/// Baseline annotation keys stripped from every propagated copy; the
/// configuration singleton can extend the list at runtime.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PropagationSettings {
    #[serde(default)]
    pub unpropagated_annotations: Vec<String>,
}
