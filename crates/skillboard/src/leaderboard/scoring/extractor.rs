use serde::{Deserialize, Serialize};

use super::super::domain::MetricRecord;

/// Fields a metric record may carry, in the order they are probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScorableField {
    /// Already normalized to 0-100 by the collector.
    Score,
    Rating,
    ProblemsSolved,
}

impl ScorableField {
    pub fn ordered() -> [ScorableField; 3] {
        [
            ScorableField::Score,
            ScorableField::Rating,
            ScorableField::ProblemsSolved,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            ScorableField::Score => "score",
            ScorableField::Rating => "rating",
            ScorableField::ProblemsSolved => "problemsSolved",
        }
    }
}

/// The authoritative value selected from a record, with the field it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedMetric {
    pub field: ScorableField,
    pub value: f64,
}

/// Select the first numeric field in priority order.
pub fn extract_field(metrics: &MetricRecord) -> Option<ExtractedMetric> {
    ScorableField::ordered().into_iter().find_map(|field| {
        metrics
            .get(field.key())
            .and_then(|value| value.as_number())
            .map(|value| ExtractedMetric { field, value })
    })
}

/// Authoritative numeric value of a record, or `None` when nothing is scorable.
pub fn extract(metrics: &MetricRecord) -> Option<f64> {
    extract_field(metrics).map(|metric| metric.value)
}
