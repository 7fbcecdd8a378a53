//! Classifier registry shared by every connection
//!
//! The registry is built once from configuration. Its set of entries never
//! changes afterwards; only the enabled flags do. All flags sit behind one
//! lock, so a listing, a toggle or a prediction pass always observes a
//! complete, consistent set of flags.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use textclass_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, Prediction};
use crate::config::{ClassifiersSection, DatasetSection};
use crate::factory::{ClassifierContext, ClassifierFactory};

struct Entry {
    name: String,
    classifier: Arc<dyn Classifier>,
}

/// Registry of configured classifiers and their enabled flags
pub struct ClassifierRegistry {
    /// Entries in configuration order
    entries: Vec<Entry>,

    /// Enabled flag of each entry, by position in `entries`
    enabled: RwLock<Vec<bool>>,
}

impl ClassifierRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            enabled: RwLock::new(Vec::new()),
        }
    }

    /// Build every configured classifier through `factory`
    pub fn from_config(
        classifiers: &ClassifiersSection,
        dataset: &DatasetSection,
        factory: &ClassifierFactory,
    ) -> Result<Self> {
        info!("Initializing {} classifiers", classifiers.entries.len());

        let mut registry = Self::new();
        for (name, settings) in &classifiers.entries {
            let kind = settings.kind_or(name);
            let context = ClassifierContext {
                name: name.clone(),
                options: settings.options.clone(),
                categories: dataset.categories.clone(),
                dataset_name: dataset.name.clone(),
                serving: true,
            };

            let classifier = factory.create(kind, &context).map_err(|e| {
                Error::config(format!("failed to build classifier '{}': {}", name, e))
            })?;
            registry.insert(name.clone(), classifier, settings.enabled)?;

            info!(
                "Loaded classifier '{}' ({}), enabled: {}",
                name, kind, settings.enabled
            );
        }

        Ok(registry)
    }

    /// Add an entry; only valid while the registry is being built
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        classifier: Arc<dyn Classifier>,
        enabled: bool,
    ) -> Result<()> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(Error::config(format!(
                "classifier '{}' is registered twice",
                name
            )));
        }

        self.entries.push(Entry { name, classifier });
        self.enabled.get_mut().push(enabled);
        Ok(())
    }

    /// Builder-style variant of [`insert`](Self::insert)
    pub fn with(
        mut self,
        name: impl Into<String>,
        classifier: Arc<dyn Classifier>,
        enabled: bool,
    ) -> Result<Self> {
        self.insert(name, classifier, enabled)?;
        Ok(self)
    }

    /// Number of registered classifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Snapshot of name to enabled flag, in registry order
    pub fn list(&self) -> Vec<(String, bool)> {
        let enabled = self.enabled.read();
        self.entries
            .iter()
            .zip(enabled.iter())
            .map(|(entry, flag)| (entry.name.clone(), *flag))
            .collect()
    }

    /// The [`list`](Self::list) snapshot as a JSON object
    pub fn list_json(&self) -> Map<String, Value> {
        self.list()
            .into_iter()
            .map(|(name, flag)| (name, Value::Bool(flag)))
            .collect()
    }

    /// Current flag of one classifier
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let index = self.position(name)?;
        Some(self.enabled.read()[index])
    }

    /// Enable or disable a classifier from a textual value.
    ///
    /// `value` must be `true` or `false`, compared case-insensitively.
    /// Returns the flag now in effect.
    ///
    /// # Errors
    ///
    /// `Error::UnknownClassifier` if `name` is not registered and
    /// `Error::InvalidValue` if `value` is not a boolean literal; the flag is
    /// left untouched in both cases.
    pub fn set_enabled(&self, name: &str, value: &str) -> Result<bool> {
        let index = self
            .position(name)
            .ok_or_else(|| Error::UnknownClassifier(name.to_string()))?;

        let flag = parse_flag(value)?;
        self.enabled.write()[index] = flag;

        debug!("Classifier '{}' enabled set to {}", name, flag);
        Ok(flag)
    }

    /// Apply several flags in one step; unknown names are skipped.
    ///
    /// Returns how many registered classifiers were updated.
    pub fn apply_enabled<'a, I>(&self, flags: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let updates: Vec<(usize, bool)> = flags
            .into_iter()
            .filter_map(|(name, flag)| match self.position(name) {
                Some(index) => Some((index, flag)),
                None => {
                    warn!("Ignoring flag for unregistered classifier '{}'", name);
                    None
                }
            })
            .collect();

        let mut enabled = self.enabled.write();
        for (index, flag) in &updates {
            enabled[*index] = *flag;
        }
        updates.len()
    }

    /// Run `predict` on every enabled classifier, in registry order.
    ///
    /// The enabled set is captured once before any classifier runs; a
    /// toggle arriving mid-pass applies to the next pass. Disabled
    /// classifiers contribute no key. The first failing classifier aborts
    /// the pass.
    pub async fn predict_all(&self, lines: &[String]) -> Result<Vec<(String, Prediction)>> {
        let active: Vec<(String, Arc<dyn Classifier>)> = {
            let enabled = self.enabled.read();
            self.entries
                .iter()
                .zip(enabled.iter())
                .filter(|(_, flag)| **flag)
                .map(|(entry, _)| (entry.name.clone(), Arc::clone(&entry.classifier)))
                .collect()
        };

        let mut results = Vec::with_capacity(active.len());
        for (name, classifier) in active {
            let prediction = classifier
                .predict(lines)
                .await
                .map_err(|e| Error::classifier(format!("{}: {}", name, e)))?;
            results.push((name, prediction));
        }

        Ok(results)
    }

    /// [`predict_all`](Self::predict_all) shaped as a JSON object
    pub async fn predict_all_json(&self, lines: &[String]) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        for (name, prediction) in self.predict_all(lines).await? {
            map.insert(name, serde_json::to_value(prediction)?);
        }
        Ok(map)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::InvalidValue(format!(
            "expected true or false, got '{}'",
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationResult;
    use crate::sentiment::SentimentClassifier;
    use async_trait::async_trait;

    struct Constant(&'static str);

    #[async_trait]
    impl Classifier for Constant {
        async fn predict(&self, lines: &[String]) -> Result<Prediction> {
            Ok(lines
                .iter()
                .map(|_| ClassificationResult::new(self.0, 1.0))
                .collect())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn registry() -> ClassifierRegistry {
        ClassifierRegistry::new()
            .with("first", Arc::new(Constant("first")), true)
            .unwrap()
            .with("second", Arc::new(Constant("second")), false)
            .unwrap()
            .with("third", Arc::new(Constant("third")), true)
            .unwrap()
    }

    #[test]
    fn test_list_keeps_registry_order() {
        let names: Vec<String> = registry().list().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_set_enabled_is_case_insensitive() {
        let registry = registry();

        assert!(registry.set_enabled("second", "TRUE").unwrap());
        assert_eq!(registry.is_enabled("second"), Some(true));

        assert!(!registry.set_enabled("second", "False").unwrap());
        assert_eq!(registry.is_enabled("second"), Some(false));
    }

    #[test]
    fn test_set_enabled_rejects_bad_values() {
        let registry = registry();

        let err = registry.set_enabled("first", "yes").unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
        assert_eq!(registry.is_enabled("first"), Some(true));

        let err = registry.set_enabled("missing", "true").unwrap_err();
        assert!(matches!(err, Error::UnknownClassifier(name) if name == "missing"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = registry().with("first", Arc::new(Constant("first")), true);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_predict_all_skips_disabled() {
        let registry = registry();
        let lines = vec!["a".to_string(), "b".to_string()];

        let results = registry.predict_all(&lines).await.unwrap();
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["first", "third"]);
        assert_eq!(results[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_predict_all_with_everything_disabled_is_empty() {
        let registry = registry();
        registry.apply_enabled([("first", false), ("third", false)]);

        let json = registry.predict_all_json(&["x".to_string()]).await.unwrap();
        assert!(json.is_empty());
    }

    #[test]
    fn test_apply_enabled_skips_unknown_names() {
        let registry = registry();
        let updated = registry.apply_enabled([("second", true), ("ghost", true)]);
        assert_eq!(updated, 1);
        assert_eq!(registry.is_enabled("second"), Some(true));
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn test_from_config_builds_in_file_order() {
        let classifiers: ClassifiersSection = serde_yaml::from_str(
            r#"
default: keyword
sentiment:
  enabled: false
keyword:
  keywords:
    sports: [goal]
"#,
        )
        .unwrap();
        let dataset = DatasetSection {
            name: "news".to_string(),
            categories: vec!["sports".to_string()],
        };

        let registry =
            ClassifierRegistry::from_config(&classifiers, &dataset, &ClassifierFactory::with_builtins())
                .unwrap();

        assert_eq!(
            registry.list(),
            vec![("sentiment".to_string(), false), ("keyword".to_string(), true)]
        );
    }

    #[test]
    fn test_from_config_fails_on_unknown_kind() {
        let classifiers: ClassifiersSection =
            serde_yaml::from_str("bayes:\n  enabled: true\n").unwrap();
        let result = ClassifierRegistry::from_config(
            &classifiers,
            &DatasetSection::default(),
            &ClassifierFactory::with_builtins(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_predict_all_json_serializes_results() {
        let registry = ClassifierRegistry::new()
            .with("sentiment", Arc::new(SentimentClassifier::new().unwrap()), true)
            .unwrap();

        let json = registry
            .predict_all_json(&["great".to_string()])
            .await
            .unwrap();
        assert_eq!(
            Value::Object(json),
            serde_json::json!({"sentiment": [{"label": "positive", "score": 1.0}]})
        );
    }
}
