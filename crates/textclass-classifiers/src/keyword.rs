//! Keyword classifier
//!
//! Maps keywords to categories and labels each line with the category
//! whose keywords it hits most often. Keywords come from the
//! configuration, from a model file written by [`Classifier::fit`], or
//! both.
//!
//! ```yaml
//! keyword:
//!   enabled: true
//!   model: results/keyword_news_20240101_120000.json
//!   keywords:
//!     sports: [goal, match, league]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};
use textclass_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationResult, Classifier, Prediction};
use crate::dataset::Dataset;
use crate::factory::ClassifierContext;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct KeywordOptions {
    /// Category to keywords
    keywords: BTreeMap<String, Vec<String>>,
    /// Model file produced by a previous training run
    model: Option<PathBuf>,
    /// Keywords kept per category when training
    top_k: usize,
    /// Minimum occurrences of a word in a category before it can be learned
    min_count: usize,
    /// Label of lines that hit no keyword
    fallback_label: String,
}

impl Default for KeywordOptions {
    fn default() -> Self {
        Self {
            keywords: BTreeMap::new(),
            model: None,
            top_k: 20,
            min_count: 2,
            fallback_label: "unknown".to_string(),
        }
    }
}

/// Learned keywords, as written by `fit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordModel {
    pub dataset: String,
    pub categories: Vec<String>,
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl KeywordModel {
    /// Read a model file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| {
            Error::classifier(format!("failed to read model {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}

pub struct KeywordClassifier {
    name: String,
    matcher: Option<AhoCorasick>,
    /// Category of each matcher pattern, by pattern index
    pattern_categories: Vec<usize>,
    categories: Vec<String>,
    fallback_label: String,
    top_k: usize,
    min_count: usize,
}

impl KeywordClassifier {
    /// Implementation name in the factory table
    pub const KIND: &'static str = "keyword";

    /// Build from a category to keywords table
    pub fn new(name: impl Into<String>, keywords: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let options = KeywordOptions {
            keywords: keywords.clone(),
            ..Default::default()
        };
        Self::from_options(name.into(), options, &[])
    }

    pub(crate) fn construct(context: &ClassifierContext) -> Result<Arc<dyn Classifier>> {
        let mut options: KeywordOptions = context.options()?;

        if context.serving {
            if let Some(path) = &options.model {
                let model = KeywordModel::load(path)?;
                info!(
                    "Classifier '{}' loaded {} learned categories from {}",
                    context.name,
                    model.keywords.len(),
                    path.display()
                );
                for (category, words) in model.keywords {
                    options.keywords.entry(category).or_default().extend(words);
                }
            }
        }

        Ok(Arc::new(Self::from_options(
            context.name.clone(),
            options,
            &context.categories,
        )?))
    }

    fn from_options(name: String, options: KeywordOptions, allowed: &[String]) -> Result<Self> {
        let mut categories = Vec::new();
        let mut patterns = Vec::new();
        let mut pattern_categories = Vec::new();

        for (category, words) in &options.keywords {
            if !allowed.is_empty() && !allowed.contains(category) {
                warn!(
                    "Classifier '{}' ignores keywords of unknown category '{}'",
                    name, category
                );
                continue;
            }

            let index = categories.len();
            categories.push(category.clone());
            for word in words.iter().filter(|w| !w.trim().is_empty()) {
                patterns.push(word.trim().to_string());
                pattern_categories.push(index);
            }
        }

        let matcher = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .build(&patterns)
                    .map_err(|e| {
                        Error::classifier(format!("Failed to build keyword matcher: {}", e))
                    })?,
            )
        };

        debug!(
            "Classifier '{}' built with {} keywords in {} categories",
            name,
            patterns.len(),
            categories.len()
        );

        Ok(Self {
            name,
            matcher,
            pattern_categories,
            categories,
            fallback_label: options.fallback_label,
            top_k: options.top_k,
            min_count: options.min_count,
        })
    }

    fn classify_line(&self, line: &str) -> ClassificationResult {
        let Some(matcher) = &self.matcher else {
            return ClassificationResult::new(self.fallback_label.clone(), 0.0);
        };

        let mut hits = vec![0usize; self.categories.len()];
        for m in matcher.find_iter(line) {
            hits[self.pattern_categories[m.pattern().as_usize()]] += 1;
        }

        let total: usize = hits.iter().sum();
        if total == 0 {
            return ClassificationResult::new(self.fallback_label.clone(), 0.0);
        }

        let mut best = 0;
        for (index, count) in hits.iter().enumerate() {
            if *count > hits[best] {
                best = index;
            }
        }

        ClassificationResult::new(
            self.categories[best].clone(),
            hits[best] as f32 / total as f32,
        )
    }

    /// Pick the most category-specific words of the dataset
    fn learn(&self, dataset: &Dataset) -> Result<KeywordModel> {
        let word = Regex::new(r"[\p{L}\p{N}]{3,}")
            .map_err(|e| Error::internal(format!("invalid word pattern: {}", e)))?;

        let mut per_category: BTreeMap<&str, HashMap<String, usize>> = BTreeMap::new();
        let mut overall: HashMap<String, usize> = HashMap::new();

        for sample in dataset.samples() {
            let counts = per_category.entry(sample.category.as_str()).or_default();
            for token in word.find_iter(&sample.text) {
                let token = token.as_str().to_lowercase();
                *counts.entry(token.clone()).or_default() += 1;
                *overall.entry(token).or_default() += 1;
            }
        }

        let mut keywords = BTreeMap::new();
        for (category, counts) in per_category {
            let mut ranked: Vec<(&String, usize, f64)> = counts
                .iter()
                .filter(|(_, count)| **count >= self.min_count)
                .map(|(token, count)| {
                    let precision = *count as f64 / overall[token] as f64;
                    (token, *count, precision)
                })
                .filter(|(_, _, precision)| *precision > 0.5)
                .collect();

            ranked.sort_by(|a, b| {
                b.2.total_cmp(&a.2)
                    .then_with(|| b.1.cmp(&a.1))
                    .then_with(|| a.0.cmp(b.0))
            });

            let words: Vec<String> = ranked
                .into_iter()
                .take(self.top_k)
                .map(|(token, _, _)| token.clone())
                .collect();
            keywords.insert(category.to_string(), words);
        }

        Ok(KeywordModel {
            dataset: dataset.name().to_string(),
            categories: dataset.categories().to_vec(),
            keywords,
        })
    }
}

/// `<output>.json`
pub fn model_path(output: &Path) -> PathBuf {
    let mut path = OsString::from(output.as_os_str());
    path.push(".json");
    PathBuf::from(path)
}

#[async_trait::async_trait]
impl Classifier for KeywordClassifier {
    async fn predict(&self, lines: &[String]) -> Result<Prediction> {
        Ok(lines.iter().map(|line| self.classify_line(line)).collect())
    }

    fn trainable(&self) -> bool {
        true
    }

    async fn fit(&self, dataset: &Dataset, output: &Path) -> Result<()> {
        if dataset.is_empty() {
            return Err(Error::classifier(format!(
                "dataset '{}' has no samples to train '{}' on",
                dataset.name(),
                self.name
            )));
        }

        let model = self.learn(dataset)?;
        let path = model_path(output);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&model)?).await?;

        info!(
            "Classifier '{}' learned keywords for {} categories, saved to {}",
            self.name,
            model.keywords.len(),
            path.display()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
