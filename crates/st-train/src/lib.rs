//! # st-train
//!
//! Contract between the tuner and a training procedure, the per-trial metric
//! channel, and the two shipped trainers: one that drives an external
//! training process and a deterministic surrogate for dry runs.

mod process;
mod reporter;
mod schedule;
mod split;
mod surrogate;

use async_trait::async_trait;
use st_types::{TrainConfig, TrainError};

pub use process::{parse_metrics_line, ProcessTrainer};
pub use reporter::{Decision, ReportRequest, Reporter};
pub use schedule::StepLr;
pub use split::{DatasetSplit, EVAL_HOLDOUT};
pub use surrogate::SurrogateTrainer;

/// A training procedure the tuner can launch.
///
/// For `config.num_epochs` epochs an implementation trains, evaluates, and,
/// when `config.report_to_tuner` is set, sends the epoch's metrics through
/// `reporter`. A `TrainError::Stopped` returned by the reporter must be
/// propagated unchanged so the trial ends at that epoch boundary.
#[async_trait]
pub trait Trainable: Send + Sync {
    async fn train(&self, config: TrainConfig, reporter: Reporter) -> Result<(), TrainError>;

    /// Human-readable trainer name.
    fn name(&self) -> &str;
}
