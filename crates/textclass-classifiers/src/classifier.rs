//! Classifier trait and common types

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use textclass_core::{Error, Result};

use crate::dataset::Dataset;

/// Predictions for a batch, one result per input line
pub type Prediction = Vec<ClassificationResult>;

/// Trait for all classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify every line of the batch
    async fn predict(&self, lines: &[String]) -> Result<Prediction>;

    /// Whether [`fit`](Self::fit) is implemented
    fn trainable(&self) -> bool {
        false
    }

    /// Train on `dataset` and write the learned model next to `output`.
    ///
    /// Classifiers that cannot be trained keep the default, which fails.
    async fn fit(&self, _dataset: &Dataset, _output: &Path) -> Result<()> {
        Err(Error::classifier(format!(
            "classifier '{}' does not support training",
            self.name()
        )))
    }

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Result of classifying a single line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Classification label
    pub label: String,

    /// Confidence score (0.0-1.0)
    pub score: f32,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}
