//! Trial tracking and tuning run management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use st_types::{EpochReport, TrainConfig, MAP_METRIC};
use std::collections::HashMap;
use uuid::Uuid;

use crate::resources::WorkerResources;
use crate::search::Point;

/// Unique tuning run identifier.
pub type TuneId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    #[serde(alias = "max")]
    Maximize,
    #[serde(alias = "min")]
    Minimize,
}

impl ObjectiveDirection {
    /// Map a raw metric onto a scale where larger is always better.
    pub fn normalize(self, value: f64) -> f64 {
        match self {
            Self::Maximize => value,
            Self::Minimize => -value,
        }
    }

    /// True if `candidate` strictly improves on `incumbent`.
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        self.normalize(candidate) > self.normalize(incumbent)
    }
}

/// Top-level configuration for a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
    pub id: TuneId,
    pub name: String,

    /// Metric name to optimize; must be present in every epoch report.
    pub metric: String,

    /// Direction of optimization.
    pub direction: ObjectiveDirection,

    /// Number of trials to run.
    pub num_samples: usize,

    /// Quota each trial acquires from the pool before it starts.
    pub resources_per_trial: WorkerResources,

    /// Upper bound on simultaneously running trials, on top of what the
    /// pool allows.
    pub max_concurrent_trials: Option<usize>,

    pub created_at: DateTime<Utc>,
}

impl TuneConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            metric: MAP_METRIC.to_string(),
            direction: ObjectiveDirection::Maximize,
            num_samples: 20,
            resources_per_trial: WorkerResources::default(),
            max_concurrent_trials: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    pub fn with_objective(mut self, metric: &str, direction: ObjectiveDirection) -> Self {
        self.metric = metric.to_string();
        self.direction = direction;
        self
    }

    pub fn with_resources(mut self, resources: WorkerResources) -> Self {
        self.resources_per_trial = resources;
        self
    }

    pub fn with_max_concurrent_trials(mut self, n: usize) -> Self {
        self.max_concurrent_trials = Some(n);
        self
    }
}

/// Lifecycle state for a tuning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuneState {
    Pending,
    Running,
    Completed,
}

/// Aggregate status of a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneStatus {
    pub id: TuneId,
    pub config: TuneConfig,
    pub state: TuneState,
    pub trials_completed: usize,
    pub trials_stopped: usize,
    pub trials_failed: usize,
    pub trials_running: usize,
    pub best_trial: Option<TrialResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TuneStatus {
    pub fn new(config: TuneConfig) -> Self {
        Self {
            id: config.id,
            config,
            state: TuneState::Pending,
            trials_completed: 0,
            trials_stopped: 0,
            trials_failed: 0,
            trials_running: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = TuneState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = TuneState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Count a trial that just left the running state.
    pub fn record_outcome(&mut self, status: TrialStatus) {
        match status {
            TrialStatus::Completed => self.trials_completed += 1,
            TrialStatus::Stopped => self.trials_stopped += 1,
            TrialStatus::Failed => self.trials_failed += 1,
            TrialStatus::Pending | TrialStatus::Running => {}
        }
    }

    /// Update the best trial if `result` improves on the current best.
    pub fn update_best(&mut self, result: &TrialResult) {
        let improves = match &self.best_trial {
            None => true,
            Some(current) => self
                .config
                .direction
                .is_better(result.objective, current.objective),
        };
        if improves {
            self.best_trial = Some(result.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Individual trial
// ---------------------------------------------------------------------------

/// A single trial: one sampled point trained under its own configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub tune_id: TuneId,
    pub trial_number: usize,
    pub parameters: Point,
    /// Base configuration with `parameters` overlaid; `None` if the overlay
    /// was rejected.
    pub config: Option<TrainConfig>,
    pub status: TrialStatus,
    /// Append-only, one entry per accepted epoch report.
    pub history: Vec<EpochReport>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(skip)]
    pub(crate) stop_requested: bool,
}

impl Trial {
    pub fn new(tune_id: TuneId, trial_number: usize, parameters: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            tune_id,
            trial_number,
            parameters,
            config: None,
            status: TrialStatus::Pending,
            history: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            stop_requested: false,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn record(&mut self, report: EpochReport) {
        self.history.push(report);
    }

    pub fn mark_completed(&mut self) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_stopped(&mut self) {
        self.status = TrialStatus::Stopped;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TrialStatus::Completed | TrialStatus::Stopped | TrialStatus::Failed
        )
    }

    /// Finished without error; early-stopped trials count.
    pub fn is_successful(&self) -> bool {
        matches!(self.status, TrialStatus::Completed | TrialStatus::Stopped)
    }

    pub fn last_report(&self) -> Option<&EpochReport> {
        self.history.last()
    }

    /// Value of `metric` in the most recent report that carried it.
    pub fn final_metric(&self, metric: &str) -> Option<f64> {
        self.history
            .iter()
            .rev()
            .find_map(|r| r.metric(metric))
            .filter(|v| v.is_finite())
    }

    pub fn duration_seconds(&self) -> Option<u64> {
        let (start, end) = (self.started_at?, self.finished_at?);
        u64::try_from((end - start).num_seconds()).ok()
    }

    /// Summary of a successful trial scored on `metric`.
    pub fn result(&self, metric: &str) -> Option<TrialResult> {
        if !self.is_successful() {
            return None;
        }
        let objective = self.final_metric(metric)?;
        Some(TrialResult {
            trial_id: self.id,
            trial_number: self.trial_number,
            objective,
            metrics: self
                .last_report()
                .map(|r| r.metrics.clone())
                .unwrap_or_default(),
            parameters: self.parameters.clone(),
            config: self.config.clone()?,
            epochs: self.history.len(),
            duration_seconds: self.duration_seconds(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    /// Ran every configured epoch.
    Completed,
    /// Stopped by the scheduler at an epoch boundary.
    Stopped,
    Failed,
}

/// Result of a single trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub trial_number: usize,
    /// Final value of the tuned metric.
    pub objective: f64,
    /// Everything the last report carried.
    pub metrics: HashMap<String, f64>,
    pub parameters: Point,
    pub config: TrainConfig,
    pub epochs: usize,
    pub duration_seconds: Option<u64>,
}
