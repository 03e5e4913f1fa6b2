use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::TrainError;

/// Bounding-box mean average precision at IoU=0.50:0.95. Drives trial comparison.
pub const MAP_METRIC: &str = "mAP";

/// Segmentation mean average precision. Recorded when a trainer reports it,
/// never compared.
pub const SEGM_MAP_METRIC: &str = "segm_mAP";

/// Metrics reported by a training procedure at the end of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// 1-based count of completed epochs (the scheduler's time attribute).
    pub epoch: usize,
    pub metrics: HashMap<String, f64>,
    pub reported_at: DateTime<Utc>,
}

impl EpochReport {
    pub fn new(epoch: usize, metrics: HashMap<String, f64>) -> Self {
        Self {
            epoch,
            metrics,
            reported_at: Utc::now(),
        }
    }

    /// Convenience constructor for a report carrying only the bbox mAP.
    pub fn with_map(epoch: usize, map: f64) -> Self {
        let mut metrics = HashMap::new();
        metrics.insert(MAP_METRIC.to_string(), map);
        Self::new(epoch, metrics)
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Look up `name` and check that it is finite. Average precision
    /// metrics must also lie in [0, 1].
    pub fn checked_metric(&self, name: &str) -> Result<f64, TrainError> {
        let value = self.metric(name).ok_or_else(|| TrainError::MissingMetric {
            name: name.to_string(),
        })?;
        let bounded = name == MAP_METRIC || name == SEGM_MAP_METRIC;
        if !value.is_finite() || (bounded && !(0.0..=1.0).contains(&value)) {
            return Err(TrainError::InvalidMetric {
                name: name.to_string(),
                value,
            });
        }
        Ok(value)
    }
}
