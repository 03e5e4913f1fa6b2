use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use st_types::TrainError;

/// Number of samples held out for evaluation.
pub const EVAL_HOLDOUT: usize = 50;

/// Train/eval index split over a dataset of fixed length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Vec<usize>,
    pub eval: Vec<usize>,
}

impl DatasetSplit {
    /// Permute `0..len` and keep the last `holdout` indices for evaluation.
    pub fn random<R: Rng>(len: usize, holdout: usize, rng: &mut R) -> Result<Self, TrainError> {
        if len <= holdout {
            return Err(TrainError::DatasetTooSmall { len, holdout });
        }
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);
        let eval = indices.split_off(len - holdout);
        Ok(Self {
            train: indices,
            eval,
        })
    }

    /// Optimizer steps per training epoch.
    pub fn train_batches(&self, batch_size: usize) -> usize {
        self.train.len().div_ceil(batch_size.max(1))
    }
}
