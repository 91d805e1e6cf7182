use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::super::domain::Platform;
use super::aggregate::AggregationPolicy;
use super::normalizer::SCALE_MAX;

/// Weight applied to platforms missing from the weight table.
pub const DEFAULT_PLATFORM_WEIGHT: f64 = 1.0;

/// Declared raw-value bounds for a platform's authoritative metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// The range of values collectors have already normalized.
    pub const fn scale() -> Self {
        Self::new(0.0, SCALE_MAX)
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Static scoring tables, loaded once at start-up and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: BTreeMap<Platform, f64>,
    #[serde(default)]
    pub ranges: BTreeMap<Platform, MetricRange>,
    #[serde(default = "default_weight")]
    pub default_weight: f64,
    #[serde(default = "MetricRange::scale")]
    pub default_range: MetricRange,
    #[serde(default)]
    pub policy: AggregationPolicy,
}

fn default_weight() -> f64 {
    DEFAULT_PLATFORM_WEIGHT
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl ScoringConfig {
    /// Weights reflect relative judge difficulty; ranges cover the realistic top of each
    /// platform's rating or activity distribution.
    pub fn standard() -> Self {
        let table: [(&str, f64, MetricRange); 7] = [
            ("LEETCODE", 1.0, MetricRange::new(0.0, 3500.0)),
            ("CODEFORCES", 1.2, MetricRange::new(0.0, 4000.0)),
            ("CODECHEF", 1.1, MetricRange::new(0.0, 4000.0)),
            ("ATCODER", 1.2, MetricRange::new(0.0, 4000.0)),
            ("HACKERRANK", 0.8, MetricRange::new(0.0, 3000.0)),
            ("GITHUB", 0.9, MetricRange::new(0.0, 5000.0)),
            ("GITLAB", 0.9, MetricRange::new(0.0, 5000.0)),
        ];

        let mut weights = BTreeMap::new();
        let mut ranges = BTreeMap::new();
        for (name, weight, range) in table {
            weights.insert(Platform::new(name), weight);
            ranges.insert(Platform::new(name), range);
        }

        Self {
            weights,
            ranges,
            default_weight: DEFAULT_PLATFORM_WEIGHT,
            default_range: MetricRange::scale(),
            policy: AggregationPolicy::default(),
        }
    }

    /// Read a JSON scoring table. Omitted sections fall back to empty tables and defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ScoringConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ScoringConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_weight(mut self, platform: impl Into<Platform>, weight: f64) -> Self {
        self.weights.insert(platform.into(), weight);
        self
    }

    pub fn with_range(mut self, platform: impl Into<Platform>, range: MetricRange) -> Self {
        self.ranges.insert(platform.into(), range);
        self
    }

    pub fn with_policy(mut self, policy: AggregationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ScoringConfigError> {
        if !is_valid_weight(self.default_weight) {
            return Err(ScoringConfigError::InvalidDefaultWeight(self.default_weight));
        }
        if !self.default_range.is_valid() {
            return Err(ScoringConfigError::InvalidDefaultRange(self.default_range));
        }

        for (platform, weight) in &self.weights {
            if !is_valid_weight(*weight) {
                return Err(ScoringConfigError::InvalidWeight {
                    platform: platform.clone(),
                    weight: *weight,
                });
            }
        }

        for (platform, range) in &self.ranges {
            if !range.is_valid() {
                return Err(ScoringConfigError::InvalidRange {
                    platform: platform.clone(),
                    range: *range,
                });
            }
        }

        Ok(())
    }

    /// Weight for `platform`, falling back to the default weight. Builds report unlisted
    /// platforms once via [`ScoringConfig::is_weighted`].
    pub fn weight(&self, platform: &Platform) -> f64 {
        self.weights
            .get(platform)
            .copied()
            .unwrap_or(self.default_weight)
    }

    pub fn is_weighted(&self, platform: &Platform) -> bool {
        self.weights.contains_key(platform)
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    /// Normalization range for `platform`, falling back to the 0-100 scale.
    pub fn range(&self, platform: &Platform) -> MetricRange {
        match self.ranges.get(platform) {
            Some(range) => *range,
            None => {
                debug!(%platform, "no range configured for platform, using default range");
                self.default_range
            }
        }
    }
}

fn is_valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight >= 0.0
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringConfigError {
    #[error("weight {weight} for platform {platform} must be finite and non-negative")]
    InvalidWeight { platform: Platform, weight: f64 },
    #[error("range [{}, {}] for platform {platform} must be finite with min <= max", .range.min, .range.max)]
    InvalidRange { platform: Platform, range: MetricRange },
    #[error("default weight {0} must be finite and non-negative")]
    InvalidDefaultWeight(f64),
    #[error("default range [{}, {}] must be finite with min <= max", .0.min, .0.max)]
    InvalidDefaultRange(MetricRange),
    #[error("failed to read scoring config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid scoring config JSON: {0}")]
    Json(#[from] serde_json::Error),
}
