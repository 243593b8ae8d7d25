//! Encoder configuration.
use serde::{Deserialize, Serialize};
use strata_config::{ConfigurationError, ConfigurationLoader};

use crate::optimizer::SortPolicy;

const fn default_dedup() -> bool {
    true
}

const fn default_id_width() -> u8 {
    16
}

const fn default_max_cardinality() -> usize {
    u16::MAX as usize
}

/// How dictionary state is carried across batches.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DictionaryPolicy {
    /// One stream per schema for the lifetime of the producer.
    ///
    /// The first payload of a stream carries the schema and full dictionaries, and later payloads carry only newly
    /// seen dictionary values. Payloads must be decoded in order by a single consumer.
    #[default]
    Incremental,

    /// Fresh streams for every batch.
    ///
    /// Every payload carries its schema and full dictionaries, and can be decoded on its own.
    PerBatch,

    /// No dictionary encoding at all.
    ///
    /// Dictionary-eligible columns are declared plain and their values are written inline.
    None,
}

/// Dictionary settings.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct DictionaryConfig {
    /// Maximum number of distinct values a dictionary column may hold in a batch.
    ///
    /// Columns that exceed the limit fall back to plain encoding for the rest of the producer's lifetime.
    ///
    /// Defaults to 65535.
    #[serde(default = "default_max_cardinality")]
    pub max_cardinality: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            max_cardinality: default_max_cardinality(),
        }
    }
}

/// Encoder configuration.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct EncoderConfig {
    /// Whether identical resources and scopes share a single identifier within a batch.
    ///
    /// Defaults to `true`.
    #[serde(default = "default_dedup")]
    pub dedup: bool,

    /// Row ordering applied before encoding.
    ///
    /// Defaults to `by_resource_scope_name`.
    #[serde(default)]
    pub sort_policy: SortPolicy,

    /// Dictionary policy.
    ///
    /// Defaults to `incremental`.
    #[serde(default)]
    pub dictionary_policy: DictionaryPolicy,

    /// Width, in bits, of resource, scope and main-table row identifiers. Only 16 is supported.
    #[serde(default = "default_id_width")]
    pub id_width: u8,

    /// Dictionary settings.
    #[serde(default)]
    pub dictionary: DictionaryConfig,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            dedup: default_dedup(),
            sort_policy: SortPolicy::default(),
            dictionary_policy: DictionaryPolicy::default(),
            id_width: default_id_width(),
            dictionary: DictionaryConfig::default(),
        }
    }
}

impl EncoderConfig {
    /// Creates a new `EncoderConfig` from the given configuration loader.
    ///
    /// # Errors
    ///
    /// If the configuration cannot be deserialized, or holds unsupported values, an error will be returned.
    pub fn from_loader(loader: ConfigurationLoader) -> Result<Self, ConfigurationError> {
        let config: Self = loader.into_typed()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration only holds supported values.
    ///
    /// # Errors
    ///
    /// If any value is unsupported, an error will be returned.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.id_width != 16 {
            return Err(ConfigurationError::InvalidValue {
                field: "id_width".to_string(),
                reason: format!("only 16-bit identifiers are supported, got {}", self.id_width),
            });
        }

        if self.dictionary.max_cardinality == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "dictionary.max_cardinality".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
