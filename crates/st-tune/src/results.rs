//! Trial records of a finished tuning run and best-trial selection.

use serde::{Deserialize, Serialize};
use st_types::TuneError;

use crate::trial::{ObjectiveDirection, Trial, TrialResult, TrialStatus, TuneStatus};

/// Every trial of a finished run, in launch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultGrid {
    pub status: TuneStatus,
    pub trials: Vec<Trial>,
}

impl ResultGrid {
    pub fn new(status: TuneStatus, trials: Vec<Trial>) -> Self {
        Self { status, trials }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn errors(&self) -> impl Iterator<Item = &Trial> {
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Failed)
    }

    pub fn num_errors(&self) -> usize {
        self.errors().count()
    }

    /// Trials the scheduler stopped before their last epoch.
    pub fn num_terminated(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Stopped)
            .count()
    }

    /// Best successful trial by the final reported value of `metric`.
    ///
    /// Failed trials are excluded even when they reported earlier epochs.
    /// Ties go to the trial launched first.
    pub fn best_result(
        &self,
        metric: &str,
        direction: ObjectiveDirection,
    ) -> Result<TrialResult, TuneError> {
        let mut best: Option<TrialResult> = None;
        for result in self.trials.iter().filter_map(|t| t.result(metric)) {
            let improves = best
                .as_ref()
                .map_or(true, |b| direction.is_better(result.objective, b.objective));
            if improves {
                best = Some(result);
            }
        }
        best.ok_or_else(|| TuneError::NoSuccessfulTrials {
            metric: metric.to_string(),
        })
    }

    /// [`ResultGrid::best_result`] on the run's own metric and direction.
    pub fn get_best_result(&self) -> Result<TrialResult, TuneError> {
        let config = &self.status.config;
        self.best_result(&config.metric, config.direction)
    }
}
