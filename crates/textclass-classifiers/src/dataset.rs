//! Labelled text datasets used for training

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use textclass_core::{Error, Result};
use tracing::{debug, info, warn};

/// On-disk layout of a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// One `category<TAB>text` sample per line
    #[default]
    Tsv,
    /// One sub-directory per category; each non-empty line of each file is a sample
    Directory,
}

/// Configuration of one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// File or directory holding the samples
    pub path: PathBuf,

    /// Layout of `path`
    #[serde(default)]
    pub format: DatasetFormat,

    /// Accepted categories; empty accepts every category found
    #[serde(default)]
    pub categories: Vec<String>,

    /// Display name; defaults to the file stem of `path`
    #[serde(default)]
    pub name: Option<String>,
}

/// One labelled sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub category: String,
    pub text: String,
}

/// A loaded dataset
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    categories: Vec<String>,
    samples: Vec<Sample>,
}

impl Dataset {
    /// Build a dataset from already labelled samples
    pub fn new(name: impl Into<String>, categories: Vec<String>, samples: Vec<Sample>) -> Self {
        Self {
            name: name.into(),
            categories,
            samples,
        }
    }

    /// Load the dataset described by `config`
    pub fn create_dataset(config: &DatasetConfig) -> Result<Self> {
        let name = config.name.clone().unwrap_or_else(|| {
            config
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dataset".to_string())
        });

        info!("Loading dataset '{}' from {}", name, config.path.display());

        let raw = match config.format {
            DatasetFormat::Tsv => read_tsv(&config.path)?,
            DatasetFormat::Directory => read_directory(&config.path)?,
        };

        let mut skipped = 0usize;
        let samples: Vec<Sample> = raw
            .into_iter()
            .filter(|sample| {
                let keep = config.categories.is_empty()
                    || config.categories.iter().any(|c| c == &sample.category);
                if !keep {
                    skipped += 1;
                }
                keep
            })
            .collect();

        if skipped > 0 {
            warn!(
                "Skipped {} samples of dataset '{}' with unlisted categories",
                skipped, name
            );
        }

        let categories = if config.categories.is_empty() {
            let mut found: Vec<String> = samples.iter().map(|s| s.category.clone()).collect();
            found.sort();
            found.dedup();
            found
        } else {
            config.categories.clone()
        };

        info!(
            "Loaded {} samples in {} categories",
            samples.len(),
            categories.len()
        );

        Ok(Self::new(name, categories, samples))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples grouped by category, categories in sorted order
    pub fn by_category(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for sample in &self.samples {
            grouped
                .entry(sample.category.as_str())
                .or_default()
                .push(sample.text.as_str());
        }
        grouped
    }
}

fn read_tsv(path: &Path) -> Result<Vec<Sample>> {
    let content = fs::read_to_string(path)?;
    let mut samples = Vec::new();

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((category, text)) if !category.trim().is_empty() => samples.push(Sample {
                category: category.trim().to_string(),
                text: text.trim().to_string(),
            }),
            _ => debug!("{}:{}: not a category<TAB>text line", path.display(), number + 1),
        }
    }

    Ok(samples)
}

fn read_directory(path: &Path) -> Result<Vec<Sample>> {
    if !path.is_dir() {
        return Err(Error::config(format!(
            "dataset directory {} does not exist",
            path.display()
        )));
    }

    let mut category_dirs: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    category_dirs.sort();

    let mut samples = Vec::new();
    for dir in category_dirs {
        let category = match dir.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for file in files {
            let content = fs::read_to_string(&file)?;
            samples.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| Sample {
                        category: category.clone(),
                        text: line.to_string(),
                    }),
            );
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsv_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.tsv");
        fs::write(
            &path,
            "sports\tA late goal won the match\npolitics\tThe vote passed\n\nweather\tSunny\nbroken line\n",
        )
        .unwrap();

        let config = DatasetConfig {
            path,
            format: DatasetFormat::Tsv,
            categories: vec!["sports".to_string(), "politics".to_string()],
            name: None,
        };

        let dataset = Dataset::create_dataset(&config).unwrap();
        assert_eq!(dataset.name(), "news");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.samples()[0].category, "sports");
        assert_eq!(dataset.by_category()["politics"], vec!["The vote passed"]);
    }

    #[test]
    fn test_directory_dataset_infers_categories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("spam")).unwrap();
        fs::create_dir(dir.path().join("ham")).unwrap();
        fs::write(dir.path().join("spam/a.txt"), "win money now\n\nfree prize\n").unwrap();
        fs::write(dir.path().join("ham/b.txt"), "see you at lunch\n").unwrap();

        let config = DatasetConfig {
            path: dir.path().to_path_buf(),
            format: DatasetFormat::Directory,
            categories: Vec::new(),
            name: Some("mail".to_string()),
        };

        let dataset = Dataset::create_dataset(&config).unwrap();
        assert_eq!(dataset.name(), "mail");
        assert_eq!(dataset.categories(), &["ham".to_string(), "spam".to_string()]);
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let config = DatasetConfig {
            path: PathBuf::from("/nonexistent/news.tsv"),
            format: DatasetFormat::Tsv,
            categories: Vec::new(),
            name: None,
        };
        assert!(Dataset::create_dataset(&config).is_err());
    }
}
