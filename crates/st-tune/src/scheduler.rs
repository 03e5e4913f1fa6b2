//! Trial schedulers: decide after every epoch report whether a trial may go on.

use serde::{Deserialize, Serialize};
use st_train::Decision;
use st_types::TuneError;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Early-stopping policy consulted on every reported result.
///
/// `objective` is oriented so that larger is better.
pub trait TrialScheduler: Send {
    fn on_trial_result(&mut self, trial_id: Uuid, epoch: usize, objective: f64) -> Decision;

    /// The trial is gone (finished, stopped or failed).
    fn on_trial_complete(&mut self, _trial_id: Uuid) {}

    fn name(&self) -> &str;
}

/// Runs every trial to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoScheduler;

impl TrialScheduler for FifoScheduler {
    fn on_trial_result(&mut self, _trial_id: Uuid, _epoch: usize, _objective: f64) -> Decision {
        Decision::Continue
    }

    fn name(&self) -> &str {
        "fifo"
    }
}

/// Parameters of [`AshaScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AshaConfig {
    /// Epoch cap; trials reaching it are stopped.
    pub max_t: usize,
    /// Epochs every trial runs before it can be stopped early.
    pub grace_period: usize,
    /// Rung spacing and the fraction of trials (1/rf) promoted past each rung.
    pub reduction_factor: f64,
}

impl Default for AshaConfig {
    fn default() -> Self {
        Self {
            max_t: 10,
            grace_period: 4,
            reduction_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Rung {
    milestone: usize,
    recorded: HashMap<Uuid, f64>,
}

/// Asynchronous successive halving.
///
/// Rungs sit at `grace_period * rf^k` epochs below `max_t`. The first time a
/// trial reaches a rung its objective is compared with everything already
/// recorded there; if it falls below the `1 - 1/rf` quantile the trial is
/// stopped. Trials never wait for peers, so a rung's cutoff tightens as more
/// trials arrive.
#[derive(Debug, Clone)]
pub struct AshaScheduler {
    config: AshaConfig,
    /// Highest milestone first.
    rungs: Vec<Rung>,
}

impl AshaScheduler {
    pub fn new(config: AshaConfig) -> Result<Self, TuneError> {
        let invalid = |message: &str| TuneError::InvalidScheduler {
            message: message.to_string(),
        };
        if config.grace_period == 0 {
            return Err(invalid("grace_period must be at least 1"));
        }
        if config.max_t < config.grace_period {
            return Err(invalid("max_t must be at least grace_period"));
        }
        if !(config.reduction_factor > 1.0) {
            return Err(invalid("reduction_factor must be greater than 1"));
        }

        let ratio = config.max_t as f64 / config.grace_period as f64;
        let max_rungs = (ratio.ln() / config.reduction_factor.ln() + 1.0 + 1e-9) as i32;
        let rungs = (0..max_rungs)
            .rev()
            .map(|k| (config.grace_period as f64 * config.reduction_factor.powi(k)) as usize)
            .filter(|milestone| *milestone < config.max_t)
            .map(|milestone| Rung {
                milestone,
                recorded: HashMap::new(),
            })
            .collect();

        Ok(Self { config, rungs })
    }

    pub fn config(&self) -> &AshaConfig {
        &self.config
    }

    /// Rung milestones, ascending.
    pub fn milestones(&self) -> Vec<usize> {
        self.rungs.iter().rev().map(|r| r.milestone).collect()
    }

    fn cutoff(&self, recorded: &HashMap<Uuid, f64>) -> Option<f64> {
        let mut values: Vec<f64> = recorded.values().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(percentile(&values, 1.0 - 1.0 / self.config.reduction_factor))
    }
}

/// Linearly interpolated quantile `q` in [0, 1] of ascending `sorted`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

impl TrialScheduler for AshaScheduler {
    fn on_trial_result(&mut self, trial_id: Uuid, epoch: usize, objective: f64) -> Decision {
        if epoch >= self.config.max_t {
            return Decision::Stop;
        }

        for i in 0..self.rungs.len() {
            let rung = &self.rungs[i];
            if epoch < rung.milestone || rung.recorded.contains_key(&trial_id) {
                continue;
            }
            let cutoff = self.cutoff(&rung.recorded);
            let decision = match cutoff {
                Some(cutoff) if objective < cutoff => Decision::Stop,
                _ => Decision::Continue,
            };
            debug!(
                trial = %trial_id,
                milestone = rung.milestone,
                objective,
                ?cutoff,
                ?decision,
                "rung comparison"
            );
            self.rungs[i].recorded.insert(trial_id, objective);
            return decision;
        }
        Decision::Continue
    }

    fn name(&self) -> &str {
        "asha"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asha(max_t: usize, grace_period: usize, reduction_factor: f64) -> AshaScheduler {
        AshaScheduler::new(AshaConfig {
            max_t,
            grace_period,
            reduction_factor,
        })
        .unwrap()
    }

    #[test]
    fn milestones_follow_geometric_spacing() {
        assert_eq!(asha(10, 4, 2.0).milestones(), vec![4, 8]);
        assert_eq!(asha(81, 1, 3.0).milestones(), vec![1, 3, 9, 27]);
        assert_eq!(asha(100, 1, 4.0).milestones(), vec![1, 4, 16, 64]);
        assert!(asha(4, 4, 2.0).milestones().is_empty());
    }

    #[test]
    fn rejects_invalid_parameters() {
        for config in [
            AshaConfig {
                max_t: 10,
                grace_period: 0,
                reduction_factor: 2.0,
            },
            AshaConfig {
                max_t: 3,
                grace_period: 4,
                reduction_factor: 2.0,
            },
            AshaConfig {
                max_t: 10,
                grace_period: 1,
                reduction_factor: 1.0,
            },
        ] {
            assert!(matches!(
                AshaScheduler::new(config),
                Err(TuneError::InvalidScheduler { .. })
            ));
        }
    }

    #[test]
    fn never_stops_before_grace_period() {
        let mut scheduler = asha(10, 4, 2.0);
        // A strong peer sets a high bar at every rung.
        let leader = Uuid::new_v4();
        for epoch in 1..=9 {
            scheduler.on_trial_result(leader, epoch, 0.9);
        }
        let laggard = Uuid::new_v4();
        for epoch in 1..4 {
            assert_eq!(
                scheduler.on_trial_result(laggard, epoch, 0.01),
                Decision::Continue
            );
        }
        assert_eq!(scheduler.on_trial_result(laggard, 4, 0.01), Decision::Stop);
    }

    #[test]
    fn weak_trial_is_cut_at_rung() {
        let mut scheduler = asha(10, 4, 2.0);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        // First arrival at a rung has nothing to compare against.
        assert_eq!(scheduler.on_trial_result(a, 4, 0.5), Decision::Continue);
        assert_eq!(scheduler.on_trial_result(b, 4, 0.7), Decision::Continue);
        // Median of {0.5, 0.7} is 0.6.
        assert_eq!(scheduler.on_trial_result(c, 4, 0.55), Decision::Stop);
        // Reporting again at the same rung is not re-judged.
        assert_eq!(scheduler.on_trial_result(a, 5, 0.1), Decision::Continue);
    }

    #[test]
    fn stops_at_max_t() {
        let mut scheduler = asha(10, 4, 2.0);
        let id = Uuid::new_v4();
        assert_eq!(scheduler.on_trial_result(id, 10, 0.99), Decision::Stop);
    }

    #[test]
    fn fifo_never_stops() {
        let mut scheduler = FifoScheduler;
        for epoch in 1..100 {
            assert_eq!(
                scheduler.on_trial_result(Uuid::new_v4(), epoch, -1.0),
                Decision::Continue
            );
        }
    }

    #[test]
    fn percentile_interpolates() {
        assert_eq!(percentile(&[1.0], 0.5), 1.0);
        assert_eq!(percentile(&[1.0, 3.0], 0.5), 2.0);
        assert!((percentile(&[1.0, 2.0, 3.0, 4.0], 2.0 / 3.0) - 3.0).abs() < 1e-12);
    }
}
