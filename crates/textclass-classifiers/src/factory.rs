//! Name to constructor table for classifier implementations

use std::collections::HashMap;
use std::sync::Arc;

use serde_yaml::Mapping;
use textclass_core::{Error, Result};

use crate::classifier::Classifier;
use crate::keyword::KeywordClassifier;
use crate::sentiment::SentimentClassifier;

/// Everything a constructor gets to build one classifier
#[derive(Debug, Clone)]
pub struct ClassifierContext {
    /// Registry name of the entry being built
    pub name: String,

    /// Classifier-specific settings from the configuration
    pub options: Mapping,

    /// Categories of the dataset the classifier serves
    pub categories: Vec<String>,

    /// Name of that dataset
    pub dataset_name: String,

    /// `true` when building for prediction, `false` when building for training
    pub serving: bool,
}

impl ClassifierContext {
    /// Deserialize the classifier-specific settings into `T`
    pub fn options<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(self.options.clone())).map_err(|e| {
            Error::config(format!("invalid options for classifier '{}': {}", self.name, e))
        })
    }
}

/// Builds a classifier from its context
pub type Constructor = fn(&ClassifierContext) -> Result<Arc<dyn Classifier>>;

/// Explicit registration table of classifier implementations
#[derive(Clone, Default)]
pub struct ClassifierFactory {
    constructors: HashMap<String, Constructor>,
}

impl ClassifierFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with the built-in classifiers registered
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(KeywordClassifier::KIND, KeywordClassifier::construct);
        factory.register(SentimentClassifier::KIND, SentimentClassifier::construct);
        factory
    }

    /// Register (or replace) the constructor for `kind`
    pub fn register(&mut self, kind: impl Into<String>, constructor: Constructor) -> &mut Self {
        self.constructors.insert(kind.into(), constructor);
        self
    }

    /// Whether an implementation is registered under `kind`
    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered implementation names, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Construct the implementation registered under `kind`
    pub fn create(&self, kind: &str, context: &ClassifierContext) -> Result<Arc<dyn Classifier>> {
        let constructor = self.constructors.get(kind).ok_or_else(|| {
            Error::config(format!(
                "no classifier implementation named '{}' (known: {})",
                kind,
                self.kinds().join(", ")
            ))
        })?;
        constructor(context)
    }
}
