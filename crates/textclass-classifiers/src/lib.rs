//! Textclass Classifiers
//!
//! Pluggable text classifiers and the registry that serves them.
//!
//! A classifier exposes `predict` over a batch of lines and, when it can be
//! trained, `fit` over a dataset. Implementations are resolved by name
//! through an explicit factory table; the registry built from it keeps the
//! enabled flag of every configured classifier behind a single lock so
//! that concurrent predictions always see a consistent set.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod factory;
pub mod keyword;
pub mod registry;
pub mod sentiment;
pub mod training;

pub use classifier::{ClassificationResult, Classifier, Prediction};
pub use config::{
    ClassifierSettings, ClassifiersSection, DatasetSection, DatasetsSection, TrainingConfig,
};
pub use dataset::{Dataset, DatasetConfig, DatasetFormat, Sample};
pub use factory::{ClassifierContext, ClassifierFactory, Constructor};
pub use keyword::KeywordClassifier;
pub use registry::ClassifierRegistry;
pub use sentiment::SentimentClassifier;
pub use training::{Trainer, TrainingOutcome};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassificationResult, Classifier, Prediction};
    pub use crate::factory::{ClassifierContext, ClassifierFactory};
    pub use crate::keyword::KeywordClassifier;
    pub use crate::registry::ClassifierRegistry;
    pub use crate::sentiment::SentimentClassifier;
}
