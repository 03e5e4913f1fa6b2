//! Deterministic stand-in for the fine-tuning run, used for dry runs.
//!
//! The learning curve peaks near `lr = 0.005 * sqrt(batch_size / 2)`,
//! saturates with the number of epochs weighted by the step-decayed learning
//! rate, and diverges above `divergence_lr`.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use st_types::{EpochReport, TrainConfig, TrainError, MAP_METRIC, SEGM_MAP_METRIC};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::reporter::Reporter;
use crate::schedule::StepLr;
use crate::split::{DatasetSplit, EVAL_HOLDOUT};
use crate::Trainable;

/// Best bbox mAP the surrogate can reach.
const PEAK_MAP: f64 = 0.82;
/// Width of the learning-rate optimum in decades.
const LR_WIDTH: f64 = 0.45;

#[derive(Debug, Clone)]
pub struct SurrogateTrainer {
    /// Size of the simulated dataset (the pedestrian set has 170 images).
    pub dataset_len: usize,
    pub seed: u64,
    /// Wall-clock time spent per epoch.
    pub epoch_delay: Duration,
    /// Learning rates at or above this make the loss blow up.
    pub divergence_lr: f64,
}

impl Default for SurrogateTrainer {
    fn default() -> Self {
        Self {
            dataset_len: 170,
            seed: 0,
            epoch_delay: Duration::ZERO,
            divergence_lr: 0.09,
        }
    }
}

impl SurrogateTrainer {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_epoch_delay(mut self, delay: Duration) -> Self {
        self.epoch_delay = delay;
        self
    }

    pub fn with_divergence_lr(mut self, lr: f64) -> Self {
        self.divergence_lr = lr;
        self
    }

    /// Asymptotic bbox mAP for a configuration.
    pub fn ceiling(config: &TrainConfig) -> f64 {
        let optimum = 0.005 * (config.batch_size as f64 / 2.0).sqrt();
        let distance = config.lr.log10() - optimum.log10();
        let momentum_penalty = (config.momentum - 0.9).abs() * 0.2;
        PEAK_MAP * (-(distance * distance) / (2.0 * LR_WIDTH * LR_WIDTH)).exp() - momentum_penalty
    }

    /// Bbox mAP after each of the `config.num_epochs` epochs, without noise.
    pub fn curve(config: &TrainConfig) -> Vec<f64> {
        let schedule = StepLr::from_config(config);
        let ceiling = Self::ceiling(config);
        let mut progress = 0.0;
        (0..config.num_epochs)
            .map(|epoch| {
                progress += (schedule.lr_at(epoch) / config.lr).powf(0.25);
                (ceiling * (1.0 - (-0.9 * progress).exp())).clamp(0.0, 1.0)
            })
            .collect()
    }
}

#[async_trait]
impl Trainable for SurrogateTrainer {
    async fn train(&self, config: TrainConfig, reporter: Reporter) -> Result<(), TrainError> {
        let mut rng = StdRng::seed_from_u64(
            self.seed ^ config.lr.to_bits() ^ (config.batch_size as u64).rotate_left(32),
        );
        let split = DatasetSplit::random(self.dataset_len, EVAL_HOLDOUT, &mut rng)?;
        let steps = split.train_batches(config.batch_size);
        let curve = Self::curve(&config);

        for (epoch, clean) in curve.into_iter().enumerate() {
            if !self.epoch_delay.is_zero() {
                tokio::time::sleep(self.epoch_delay).await;
            }
            if config.lr >= self.divergence_lr {
                return Err(TrainError::ExecutionFailed {
                    message: format!("loss is NaN at epoch {epoch}, stopping training"),
                });
            }

            let bbox = (clean + rng.random_range(-0.005..0.005)).clamp(0.0, 1.0);
            debug!(epoch, steps, bbox, "surrogate epoch");

            let mut metrics = HashMap::new();
            metrics.insert(MAP_METRIC.to_string(), bbox);
            metrics.insert(SEGM_MAP_METRIC.to_string(), bbox * 0.93);
            let report = EpochReport::new(epoch + 1, metrics);

            if config.report_to_tuner {
                reporter.report(report).await?;
            } else {
                Reporter::disabled().report(report).await?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "surrogate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::Decision;

    #[test]
    fn curve_is_monotone_and_bounded() {
        let curve = SurrogateTrainer::curve(&TrainConfig::default());
        assert_eq!(curve.len(), 10);
        assert!(curve.windows(2).all(|w| w[1] >= w[0]));
        assert!(curve.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn default_lr_beats_extremes() {
        let good = SurrogateTrainer::ceiling(&TrainConfig::default());
        let low = SurrogateTrainer::ceiling(&TrainConfig {
            lr: 1e-4,
            ..TrainConfig::default()
        });
        let high = SurrogateTrainer::ceiling(&TrainConfig {
            lr: 0.08,
            ..TrainConfig::default()
        });
        assert!(good > low && good > high);
    }

    #[tokio::test]
    async fn reports_every_epoch() {
        let (reporter, mut rx) = Reporter::channel(1);
        let config = TrainConfig::default().with_epochs(4);
        let trainer = SurrogateTrainer::default();
        let run = tokio::spawn(async move { trainer.train(config, reporter).await });

        let mut epochs = Vec::new();
        while let Some(request) = rx.recv().await {
            assert!(request.report.metric(MAP_METRIC).is_some());
            assert!(request.report.metric(SEGM_MAP_METRIC).is_some());
            epochs.push(request.report.epoch);
            request.reply.send(Decision::Continue).unwrap();
        }
        assert_eq!(epochs, vec![1, 2, 3, 4]);
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stop_ends_training_at_epoch_boundary() {
        let (reporter, mut rx) = Reporter::channel(1);
        let trainer = SurrogateTrainer::default();
        let run = tokio::spawn(async move { trainer.train(TrainConfig::default(), reporter).await });

        let request = rx.recv().await.unwrap();
        request.reply.send(Decision::Stop).unwrap();
        assert_eq!(run.await.unwrap(), Err(TrainError::Stopped));
    }

    #[tokio::test]
    async fn large_lr_diverges() {
        let trainer = SurrogateTrainer::default();
        let config = TrainConfig {
            lr: 0.095,
            ..TrainConfig::default()
        };
        let result = trainer.train(config, Reporter::disabled()).await;
        assert!(matches!(result, Err(TrainError::ExecutionFailed { .. })));
    }
}
