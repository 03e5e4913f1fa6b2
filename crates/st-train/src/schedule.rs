use serde::{Deserialize, Serialize};
use st_types::TrainConfig;

/// Step decay: the learning rate is multiplied by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepLr {
    pub base_lr: f64,
    pub step_size: usize,
    pub gamma: f64,
}

impl StepLr {
    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            base_lr: config.lr,
            step_size: config.step_size.max(1),
            gamma: config.gamma,
        }
    }

    /// Learning rate in effect during 0-based `epoch`.
    pub fn lr_at(&self, epoch: usize) -> f64 {
        self.base_lr * self.gamma.powi((epoch / self.step_size) as i32)
    }
}
