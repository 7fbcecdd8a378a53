//! Training runs
//!
//! A training run builds every configured classifier in training mode,
//! loads one dataset and calls `fit` on one classifier or on all of them.
//! Each fit writes to `<result_dir>/<classifier>_<dataset>_<timestamp>`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use textclass_core::{Error, Result};
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::config::TrainingConfig;
use crate::dataset::Dataset;
use crate::factory::{ClassifierContext, ClassifierFactory};

/// Selector that trains every configured classifier
pub const ALL_CLASSIFIERS: &str = "all";

/// One finished fit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingOutcome {
    pub classifier: String,
    pub dataset: String,
    pub output: PathBuf,
}

/// Runs `fit` for configured classifiers
pub struct Trainer {
    config: TrainingConfig,
    classifiers: Vec<(String, Arc<dyn Classifier>)>,
}

impl Trainer {
    /// Build every configured classifier for training and create `result_dir`
    pub fn new(config: TrainingConfig, factory: &ClassifierFactory) -> Result<Self> {
        std::fs::create_dir_all(&config.result_dir).map_err(|e| {
            Error::config(format!(
                "cannot create result directory {}: {}",
                config.result_dir.display(),
                e
            ))
        })?;

        // Classifiers are built against the default dataset, whichever one is trained.
        let default_dataset = config.datasets.default_name().unwrap_or_default().to_string();
        let categories = config
            .datasets
            .get(&default_dataset)
            .map(|d| d.categories.clone())
            .unwrap_or_default();

        let mut classifiers = Vec::with_capacity(config.classifiers.entries.len());
        for (name, settings) in &config.classifiers.entries {
            let context = ClassifierContext {
                name: name.clone(),
                options: settings.options.clone(),
                categories: categories.clone(),
                dataset_name: default_dataset.clone(),
                serving: false,
            };
            let classifier = factory.create(settings.kind_or(name), &context)?;
            classifiers.push((name.clone(), classifier));
        }

        Ok(Self {
            config,
            classifiers,
        })
    }

    /// Names of the classifiers this trainer can fit
    pub fn classifier_names(&self) -> impl Iterator<Item = &str> {
        self.classifiers.iter().map(|(name, _)| name.as_str())
    }

    /// Train `classifier` (a name or `all`) on `dataset`.
    ///
    /// `None` selects the configured defaults.
    pub async fn run(
        &self,
        classifier: Option<&str>,
        dataset: Option<&str>,
    ) -> Result<Vec<TrainingOutcome>> {
        info!("Training starts");

        let classifier_name = classifier
            .or(self.config.classifiers.default.as_deref())
            .ok_or_else(|| Error::config("no classifier given and no default configured"))?;

        let selected: Vec<&(String, Arc<dyn Classifier>)> = if classifier_name == ALL_CLASSIFIERS {
            self.classifiers
                .iter()
                .filter(|(name, classifier)| {
                    if !classifier.trainable() {
                        warn!("Skipping classifier {}: it does not support training", name);
                    }
                    classifier.trainable()
                })
                .collect()
        } else {
            let found = self
                .classifiers
                .iter()
                .find(|(name, _)| name == classifier_name)
                .ok_or_else(|| {
                    Error::config(format!("The classifier {} doesn't exist", classifier_name))
                })?;
            vec![found]
        };

        let dataset_name = dataset
            .or(self.config.datasets.default_name())
            .ok_or_else(|| Error::config("no dataset given and no default configured"))?;
        let dataset_config = self
            .config
            .datasets
            .get(dataset_name)
            .ok_or_else(|| Error::config(format!("The dataset {} doesn't exist", dataset_name)))?;

        let dataset = Dataset::create_dataset(dataset_config)?;
        let now = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let mut outcomes = Vec::with_capacity(selected.len());
        for (name, classifier) in selected {
            let output = self
                .config
                .result_dir
                .join(format!("{}_{}_{}", name, dataset_name, now));

            classifier.fit(&dataset, &output).await?;
            info!(
                "The training of {} classifier for the dataset {} is done, saved to {}",
                name,
                dataset_name,
                output.display()
            );

            outcomes.push(TrainingOutcome {
                classifier: name.clone(),
                dataset: dataset_name.to_string(),
                output,
            });
        }

        info!("Training end");
        Ok(outcomes)
    }
}
