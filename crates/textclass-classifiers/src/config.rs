//! Configuration sections for classifiers, datasets and training

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use textclass_core::{Error, Result};

use crate::dataset::DatasetConfig;

/// Key under `classifiers` and `datasets` that names the default entry
pub const DEFAULT_KEY: &str = "default";

/// Settings of one configured classifier.
///
/// Keys other than `enabled` and `kind` are kept verbatim in `options`
/// and handed to the classifier's constructor.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    /// Whether the classifier answers predictions at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Implementation to construct; defaults to the entry name
    #[serde(default)]
    pub kind: Option<String>,

    /// Classifier-specific settings
    #[serde(flatten)]
    pub options: Mapping,
}

impl ClassifierSettings {
    /// Implementation name for the entry called `name`
    pub fn kind_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }
}

/// The `classifiers` section, in file order
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Mapping")]
pub struct ClassifiersSection {
    /// Classifier trained when none is named explicitly
    pub default: Option<String>,

    /// Configured classifiers in declaration order
    pub entries: Vec<(String, ClassifierSettings)>,
}

impl ClassifiersSection {
    /// Look up the settings of a classifier by name
    pub fn get(&self, name: &str) -> Option<&ClassifierSettings> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, settings)| settings)
    }

    /// Configured classifier names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl TryFrom<Mapping> for ClassifiersSection {
    type Error = Error;

    fn try_from(mapping: Mapping) -> Result<Self> {
        let mut section = Self::default();

        for (key, value) in mapping {
            let name = key_to_string(&key)?;
            if name == DEFAULT_KEY {
                section.default = Some(value_to_string(&name, value)?);
                continue;
            }

            let settings: ClassifierSettings = serde_yaml::from_value(value).map_err(|e| {
                Error::config(format!("invalid settings for classifier '{}': {}", name, e))
            })?;
            section.entries.push((name, settings));
        }

        Ok(section)
    }
}

/// The server's `dataset` section: the categories classifiers predict
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetSection {
    /// Dataset the served models were trained on
    #[serde(default)]
    pub name: String,

    /// Category labels
    #[serde(default)]
    pub categories: Vec<String>,
}

/// The training `datasets` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Mapping")]
pub struct DatasetsSection {
    /// Dataset used when none is named explicitly
    pub default: Option<String>,

    /// Configured datasets in declaration order
    pub entries: Vec<(String, DatasetConfig)>,
}

impl DatasetsSection {
    /// Look up a dataset by name
    pub fn get(&self, name: &str) -> Option<&DatasetConfig> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, config)| config)
    }

    /// Name of the default dataset, falling back to the first entry
    pub fn default_name(&self) -> Option<&str> {
        self.default
            .as_deref()
            .or_else(|| self.entries.first().map(|(name, _)| name.as_str()))
    }
}

impl TryFrom<Mapping> for DatasetsSection {
    type Error = Error;

    fn try_from(mapping: Mapping) -> Result<Self> {
        let mut section = Self::default();

        for (key, value) in mapping {
            let name = key_to_string(&key)?;
            if name == DEFAULT_KEY {
                section.default = Some(value_to_string(&name, value)?);
                continue;
            }

            let config: DatasetConfig = serde_yaml::from_value(value).map_err(|e| {
                Error::config(format!("invalid settings for dataset '{}': {}", name, e))
            })?;
            section.entries.push((name, config));
        }

        Ok(section)
    }
}

/// Configuration of a training run
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Classifiers that can be trained
    pub classifiers: ClassifiersSection,

    /// Datasets that can be trained on
    pub datasets: DatasetsSection,

    /// Directory receiving the trained models
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
}

impl TrainingConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid training configuration: {}", e)))
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }
}

fn key_to_string(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        other => Err(Error::config(format!(
            "expected a string key, found {:?}",
            other
        ))),
    }
}

fn value_to_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::config(format!(
            "'{}' must be a string, found {:?}",
            key, other
        ))),
    }
}

fn default_true() -> bool {
    true
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("results")
}
