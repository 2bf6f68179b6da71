pub mod schema;

pub use schema::Settings;

use crate::ThisError;
use schema::Validate;
use std::sync::Arc;

/// Errors related to process-settings parsing and validation.
#[derive(Debug, ThisError)]
pub enum SettingsError {
    /// TOML could not be parsed into the expected structure.
    #[error("toml error: {0}")]
    CannotParseToml(String),

    /// Wrapper for schema-level errors.
    #[error(transparent)]
    SettingsSchema(#[from] schema::SettingsSchemaError),
}

impl Settings {
    /// Parse and validate process settings from a TOML string. The result is
    /// handed explicitly to every reconciler and validator; there is no
    /// process-wide slot.
    pub fn from_toml(settings_str: &str) -> Result<Arc<Self>, SettingsError> {
        let settings: Self = toml::from_str(settings_str)
            .map_err(|e| SettingsError::CannotParseToml(e.to_string()))?;

        settings.validate().map_err(SettingsError::from)?;

        Ok(Arc::new(settings))
    }

    /// A minimal validated settings value for tests.
    #[must_use]
    pub fn test_default() -> Arc<Self> {
        let settings = Self::default();
        debug_assert!(settings.validate().is_ok());

        Arc::new(settings)
    }
}
