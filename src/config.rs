//! Analysis configuration: validation ranges, index definitions and
//! segmentation parameters.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::index::CompositeIndex;
use crate::analysis::segment::Feature;
use crate::data::model::{FuelCategory, Market, Metric};

/// Inclusive range of model years a dataset is allowed to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

fn default_sports_years() -> YearRange {
    YearRange::new(2014, 2023)
}

fn default_epa_years() -> YearRange {
    YearRange::new(2000, 2024)
}

fn default_true() -> bool {
    true
}

/// Space k-means runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterSpace {
    /// The 2-D principal-component projection used for display.
    #[default]
    Projected,
    /// The full standardized feature space.
    Standardized,
}

/// Parameters for the segmentation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Features a record must have (all non-null) to be clustered.
    #[serde(default = "default_features")]
    pub features: Vec<Feature>,

    /// Number of clusters, 3..=5.
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Stop once no centre moves further than this.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default)]
    pub space: ClusterSpace,
}

fn default_features() -> Vec<Feature> {
    vec![
        Feature::Metric(Metric::Horsepower),
        Feature::Metric(Metric::EngineDisplacement),
        Feature::SpecificOutput,
    ]
}

fn default_k() -> usize {
    4
}

fn default_seed() -> u64 {
    42
}

fn default_max_iterations() -> usize {
    300
}

fn default_tolerance() -> f64 {
    1e-6
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            features: default_features(),
            k: default_k(),
            seed: default_seed(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            space: ClusterSpace::default(),
        }
    }
}

/// Top-level configuration shared by every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_sports_years")]
    pub sports_years: YearRange,

    #[serde(default = "default_epa_years")]
    pub epa_years: YearRange,

    /// Extra raw fuel labels merged over the built-in lookup table.
    #[serde(default)]
    pub extra_fuel_labels: BTreeMap<String, FuelCategory>,

    /// Drop performance brands/models from the EPA table.
    #[serde(default = "default_true")]
    pub exclude_performance_models: bool,

    /// Collapse repeated make/model/year rows in the sports table.
    #[serde(default = "default_true")]
    pub deduplicate_sports: bool,

    #[serde(default = "CompositeIndex::default_set")]
    pub indices: Vec<CompositeIndex>,

    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sports_years: default_sports_years(),
            epa_years: default_epa_years(),
            extra_fuel_labels: BTreeMap::new(),
            exclude_performance_models: true,
            deduplicate_sports: true,
            indices: CompositeIndex::default_set(),
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn year_range(&self, market: Market) -> YearRange {
        match market {
            Market::Sports => self.sports_years,
            Market::Epa => self.epa_years,
        }
    }

    pub fn index(&self, name: &str) -> Option<&CompositeIndex> {
        self.indices.iter().find(|idx| idx.name == name)
    }

    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).context("parsing config JSON")
    }

    /// Save configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path.as_ref(), text)
            .with_context(|| format!("writing config {}", path.as_ref().display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.sports_years, YearRange::new(2014, 2023));
        assert_eq!(config.epa_years, YearRange::new(2000, 2024));
        assert_eq!(config.segmentation.k, 4);
        assert!(config.index("sports_performance").is_some());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "segmentation": { "k": 3 } }"#).unwrap();
        assert_eq!(config.segmentation.k, 3);
        assert_eq!(config.segmentation.seed, 42);
        assert!(config.exclude_performance_models);
        assert_eq!(config.indices, CompositeIndex::default_set());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AnalysisConfig::default();
        config.extra_fuel_labels.insert("Hydrogen".into(), FuelCategory::Electric);
        config.segmentation.space = ClusterSpace::Standardized;
        config.to_json_file(&path).unwrap();

        let loaded = AnalysisConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_year_range_is_inclusive() {
        let range = YearRange::new(2014, 2023);
        assert!(range.contains(2014));
        assert!(range.contains(2023));
        assert!(!range.contains(2024));
    }
}
