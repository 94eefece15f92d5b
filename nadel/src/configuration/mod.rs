//! Hydration configuration.

use std::time::Duration;

use displaydoc::Display;
use schemars::gen::SchemaSettings;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration of the hydration engine.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with the builders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Batch hydration options.
    pub hydration: HydrationConfiguration,
}

/// Batch hydration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct HydrationConfiguration {
    /// Timeout for each backing service call in human-readable format
    /// (`500ms`, `2s`). A call that times out resolves to an error.
    #[serde(deserialize_with = "humantime_serde::deserialize", default)]
    #[schemars(with = "Option<String>", default)]
    pub timeout: Option<Duration>,

    /// Upper bound applied to every declared batch size.
    pub max_batch_size: Option<usize>,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(hydration: Option<HydrationConfiguration>) -> Self {
        Self {
            hydration: hydration.unwrap_or_default(),
        }
    }

    /// Parse and validate a YAML configuration. Empty input yields the
    /// default configuration.
    pub fn from_yaml(raw_yaml: &str) -> Result<Self, ConfigurationError> {
        if raw_yaml.trim().is_empty() {
            return Ok(Configuration::default());
        }
        let configuration: Configuration = serde_yaml::from_str(raw_yaml).map_err(|e| {
            ConfigurationError::InvalidConfiguration {
                message: "failed to parse yaml",
                error: e.to_string(),
            }
        })?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.hydration.max_batch_size == Some(0) {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid hydration.max_batch_size",
                error: "the maximum batch size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[buildstructor::buildstructor]
impl HydrationConfiguration {
    #[builder(visibility = "pub")]
    fn new(timeout: Option<Duration>, max_batch_size: Option<usize>) -> Self {
        Self {
            timeout,
            max_batch_size,
        }
    }

    /// The batch size to use for an instruction declaring `declared`.
    pub fn effective_batch_size(&self, declared: usize) -> usize {
        self.max_batch_size
            .map_or(declared, |max| declared.min(max))
            .max(1)
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    settings
        .into_generator()
        .into_root_schema_for::<Configuration>()
}
