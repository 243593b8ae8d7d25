//! Configuration loading for Strata.
//!
//! Configuration can be layered from YAML files, JSON files, environment variables, and in-code overrides, with later
//! sources taking precedence over earlier ones. The merged configuration is then deserialized into a typed value.
#![deny(warnings)]
#![deny(missing_docs)]

use std::{borrow::Cow, path::Path};

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

mod provider;
use self::provider::ResolvedProvider;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Environment variable prefix was empty.
    #[snafu(display("Environment variable prefix must not be empty."))]
    EmptyPrefix,

    /// Configuration file could not be loaded.
    #[snafu(display("Failed to load configuration file '{}'.", path))]
    File {
        /// Path of the file.
        path: String,

        /// Error source.
        source: figment::Error,
    },

    /// Requested field was missing from the configuration.
    #[snafu(display("Missing field '{}' in configuration. {}", field, help_text))]
    MissingField {
        /// Help text describing how to set the missing field.
        help_text: String,

        /// Name of the missing field.
        field: Cow<'static, str>,
    },

    /// Field's data type did not match the expected data type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Field value was invalid.
    #[snafu(display("Invalid value for field '{}': {}", field, reason))]
    InvalidValue {
        /// Period-separated path to the invalid field.
        field: String,

        /// Why the value was rejected.
        reason: String,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to query configuration."))]
    Generic {
        /// Error source.
        source: figment::Error,
    },
}

/// A configuration loader that can pull from various sources.
///
/// Every source is read and parsed as soon as it is added, and sources added later take precedence over sources added
/// earlier. Supported sources are YAML and JSON files, prefixed environment variables (see
/// [`from_environment`][Self::from_environment]), and serializable in-code values (see
/// [`with_values`][Self::with_values]).
pub struct ConfigurationLoader {
    figment: Figment,
    env_prefixes: Vec<String>,
}

impl Default for ConfigurationLoader {
    fn default() -> Self {
        Self {
            figment: Figment::new(),
            env_prefixes: Vec::new(),
        }
    }
}

impl ConfigurationLoader {
    fn layer<P: Provider>(mut self, provider: P) -> Self {
        self.figment = self.figment.admerge(provider);
        self
    }

    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid YAML, an error will be returned.
    pub fn from_yaml<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = ResolvedProvider::from_yaml(&path).context(File {
            path: path.as_ref().to_string_lossy(),
        })?;
        Ok(self.layer(provider))
    }

    /// Attempts to load the given YAML configuration file, ignoring any errors.
    pub fn try_from_yaml<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        match ResolvedProvider::from_yaml(&path) {
            Ok(provider) => self.layer(provider),
            Err(e) => {
                let file_path = path.as_ref().display();
                debug!(error = %e, %file_path, "Skipping unreadable YAML configuration file.");
                self
            }
        }
    }

    /// Loads the given JSON configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, or if the file is not valid JSON, an error will be returned.
    pub fn from_json<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let provider = ResolvedProvider::from_json(&path).context(File {
            path: path.as_ref().to_string_lossy(),
        })?;
        Ok(self.layer(provider))
    }

    /// Loads configuration from environment variables.
    ///
    /// Variables are matched case-insensitively on `<PREFIX>_`, so a prefix of `strata` matches `STRATA_DEDUP`. Nested
    /// keys are not split on underscores.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, an error will be returned.
    pub fn from_environment(mut self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        let mut prefix = prefix.to_uppercase();
        if !prefix.ends_with('_') {
            prefix.push('_');
        }

        self.figment = self.figment.admerge(Env::prefixed(&prefix));
        self.env_prefixes.push(prefix);
        Ok(self)
    }

    /// Adds in-code configuration values.
    ///
    /// The values are serialized and merged like any other source, which makes this useful for overrides.
    pub fn with_values<T>(self, values: T) -> Self
    where
        T: Serialize,
    {
        self.layer(Serialized::defaults(values))
    }

    /// Consumes the configuration loader, deserializing it as `T`.
    ///
    /// # Errors
    ///
    /// If the configuration could not be deserialized into `T`, an error will be returned.
    pub fn into_typed<'a, T>(self) -> Result<T, ConfigurationError>
    where
        T: Deserialize<'a>,
    {
        self.figment.extract().map_err(|e| self.query_error(e))
    }

    fn query_error(&self, e: figment::Error) -> ConfigurationError {
        match e.kind {
            Kind::MissingField(field) => {
                let env_key = field.replace('.', "_").to_uppercase();
                let keys = std::iter::once(field.to_string())
                    .chain(self.env_prefixes.iter().map(|prefix| format!("{}{}", prefix, env_key)))
                    .collect::<Vec<_>>();
                ConfigurationError::MissingField {
                    help_text: format!("Try setting `{}`.", keys.join("` or `")),
                    field,
                }
            }
            Kind::InvalidType(actual, expected) => ConfigurationError::InvalidFieldType {
                field: e.path.join("."),
                expected_ty: expected,
                actual_ty: actual.to_string(),
            },
            _ => ConfigurationError::Generic { source: e },
        }
    }
}
