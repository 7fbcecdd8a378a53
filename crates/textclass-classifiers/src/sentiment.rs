//! Lightweight sentiment classifier
//!
//! Lexicon-based scorer that needs no trained model. Each line is scored
//! independently from its positive and negative hits.

use std::sync::Arc;

use aho_corasick::AhoCorasick;
use serde::Deserialize;
use textclass_core::{Error, Result};

use crate::classifier::{ClassificationResult, Classifier, Prediction};
use crate::factory::ClassifierContext;

const POSITIVE: &[&str] = &[
    "good",
    "great",
    "excellent",
    "love",
    "amazing",
    "wonderful",
    "happy",
    "fantastic",
    "awesome",
    "best",
];

const NEGATIVE: &[&str] = &[
    "bad",
    "terrible",
    "awful",
    "hate",
    "horrible",
    "worst",
    "sad",
    "angry",
    "disappointed",
    "poor",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SentimentOptions {
    /// Extra positive words on top of the built-in lexicon
    positive: Vec<String>,
    /// Extra negative words on top of the built-in lexicon
    negative: Vec<String>,
}

pub struct SentimentClassifier {
    name: String,
    positive: AhoCorasick,
    negative: AhoCorasick,
}

impl SentimentClassifier {
    /// Implementation name in the factory table
    pub const KIND: &'static str = "sentiment";

    pub fn new() -> Result<Self> {
        Self::with_name(Self::KIND)
    }

    pub fn with_name(name: impl Into<String>) -> Result<Self> {
        Self::with_lexicon(name, &[], &[])
    }

    /// Build with extra words added to the built-in lexicon
    pub fn with_lexicon(
        name: impl Into<String>,
        positive: &[String],
        negative: &[String],
    ) -> Result<Self> {
        let positive = build_matcher(POSITIVE, positive, "positive")?;
        let negative = build_matcher(NEGATIVE, negative, "negative")?;

        Ok(Self {
            name: name.into(),
            positive,
            negative,
        })
    }

    pub(crate) fn construct(context: &ClassifierContext) -> Result<Arc<dyn Classifier>> {
        let options: SentimentOptions = context.options()?;
        Ok(Arc::new(Self::with_lexicon(
            context.name.clone(),
            &options.positive,
            &options.negative,
        )?))
    }

    fn score_line(&self, line: &str) -> ClassificationResult {
        let positive_hits = self.positive.find_iter(line).count() as f32;
        let negative_hits = self.negative.find_iter(line).count() as f32;
        let total = positive_hits + negative_hits;

        let score = if total == 0.0 {
            0.5
        } else {
            positive_hits / total
        };
        let label = if score >= 0.5 { "positive" } else { "negative" };

        ClassificationResult::new(label, score)
    }
}

fn build_matcher(base: &[&str], extra: &[String], which: &str) -> Result<AhoCorasick> {
    let words = base
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str));

    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(words)
        .map_err(|e| {
            Error::classifier(format!("Failed to build {which} sentiment matcher: {e}"))
        })
}

#[async_trait::async_trait]
impl Classifier for SentimentClassifier {
    async fn predict(&self, lines: &[String]) -> Result<Prediction> {
        Ok(lines.iter().map(|line| self.score_line(line)).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
