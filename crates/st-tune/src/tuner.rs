//! The trial orchestrator.
//!
//! `Tuner::fit` owns the searcher and the scheduler and runs a single event
//! loop. Each trial runs in its own task: it waits for its resource lease,
//! trains, and forwards every epoch report to the loop, which answers with
//! the scheduler's decision. Nothing a trial does can fail the run; the only
//! run-level errors are setup errors raised before the first trial starts.

use serde_json::Value;
use st_train::{Decision, ReportRequest, Reporter, Trainable};
use st_types::{ConfigError, EpochReport, StResult, TrainConfig, TrainError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::resources::{ResourcePool, WorkerResources};
use crate::results::ResultGrid;
use crate::scheduler::{FifoScheduler, TrialScheduler};
use crate::search::{Point, RandomSearch, SearchSpace, SearchStrategy};
use crate::trial::{Trial, TrialStatus, TuneConfig, TuneStatus};

enum TrialEvent {
    Started {
        idx: usize,
    },
    Report {
        idx: usize,
        request: ReportRequest,
    },
    Finished {
        idx: usize,
        outcome: Result<(), TrainError>,
    },
}

/// Runs `num_samples` trials of a training procedure over a search space.
pub struct Tuner<T: Trainable + 'static> {
    trainable: Arc<T>,
    base_config: TrainConfig,
    space: SearchSpace,
    config: TuneConfig,
    searcher: Box<dyn SearchStrategy>,
    scheduler: Box<dyn TrialScheduler>,
    pool: ResourcePool,
}

impl<T: Trainable + 'static> Tuner<T> {
    /// Random search, FIFO scheduling, and a pool holding exactly one trial.
    pub fn new(trainable: T, base_config: TrainConfig, space: SearchSpace, config: TuneConfig) -> Self {
        Self {
            trainable: Arc::new(trainable),
            searcher: Box::new(RandomSearch::new(space.clone())),
            scheduler: Box::new(FifoScheduler),
            pool: ResourcePool::new(config.resources_per_trial),
            base_config,
            space,
            config,
        }
    }

    pub fn with_searcher(mut self, searcher: impl SearchStrategy + 'static) -> Self {
        self.searcher = Box::new(searcher);
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl TrialScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    pub fn with_pool(mut self, pool: ResourcePool) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &TuneConfig {
        &self.config
    }

    /// Setup checks; any failure here aborts the run before a trial starts.
    pub fn validate(&self) -> StResult<()> {
        self.space.validate()?;
        self.searcher.check(&self.space)?;
        if let Some(key) = self.space.names().find(|k| !TrainConfig::is_known_key(k)) {
            return Err(ConfigError::UnknownKey {
                key: key.to_string(),
            }
            .into());
        }
        self.base_config.validate()?;
        self.pool.check_fits(&self.config.resources_per_trial)?;
        if self.config.num_samples == 0 {
            return Err(st_types::validation_error!("num_samples must be at least 1"));
        }
        if self.config.max_concurrent_trials == Some(0) {
            return Err(st_types::validation_error!(
                "max_concurrent_trials must be at least 1"
            ));
        }
        Ok(())
    }

    fn concurrency(&self) -> usize {
        let pool_limit = self
            .pool
            .max_concurrent(&self.config.resources_per_trial)
            .unwrap_or(self.config.num_samples);
        self.config
            .max_concurrent_trials
            .map_or(pool_limit, |n| n.min(pool_limit))
            .max(1)
    }

    /// Copy of the base configuration with `point` overlaid and tuner
    /// reporting forced on.
    fn trial_config(&self, point: &Point) -> Result<TrainConfig, ConfigError> {
        let overrides: HashMap<String, Value> = point
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Ok(self
            .base_config
            .overlay(&overrides)?
            .with_tuner_reporting(true))
    }

    /// Run every trial and collect the results.
    pub async fn fit(mut self) -> StResult<ResultGrid> {
        self.validate()?;

        let mut status = TuneStatus::new(self.config.clone());
        status.mark_running();
        let limit = self.concurrency();
        info!(
            name = %self.config.name,
            num_samples = self.config.num_samples,
            concurrency = limit,
            searcher = self.searcher.name(),
            scheduler = self.scheduler.name(),
            trainer = self.trainable.name(),
            "starting tuning run"
        );

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut trials: Vec<Trial> = Vec::with_capacity(self.config.num_samples);
        let mut in_flight = 0usize;
        let mut exhausted = false;

        loop {
            while !exhausted && in_flight < limit && trials.len() < self.config.num_samples {
                let Some(point) = self.searcher.suggest(1).pop() else {
                    info!(launched = trials.len(), "search space exhausted");
                    exhausted = true;
                    break;
                };
                let idx = trials.len();
                let mut trial = Trial::new(status.id, idx, point);
                match self.trial_config(&trial.parameters) {
                    Ok(config) => {
                        trial.config = Some(config.clone());
                        self.launch(idx, config, events_tx.clone());
                        in_flight += 1;
                    }
                    Err(e) => {
                        warn!(trial = idx, error = %e, "rejected sampled configuration");
                        trial.mark_failed(e.to_string());
                        status.record_outcome(TrialStatus::Failed);
                    }
                }
                trials.push(trial);
            }

            if in_flight == 0 {
                break;
            }
            let Some(event) = events_rx.recv().await else {
                break;
            };

            match event {
                TrialEvent::Started { idx } => {
                    let trial = &mut trials[idx];
                    trial.mark_running();
                    status.trials_running += 1;
                    info!(trial = idx, id = %trial.id, params = ?trial.parameters, "trial started");
                }
                TrialEvent::Report { idx, request } => {
                    let decision = self.on_report(&mut trials[idx], &mut status, request.report);
                    // A trial that died meanwhile has dropped its receiver.
                    let _ = request.reply.send(decision);
                }
                TrialEvent::Finished { idx, outcome } => {
                    in_flight -= 1;
                    self.on_finished(&mut trials[idx], &mut status, outcome);
                }
            }
        }

        status.trials_running = 0;
        status.mark_completed();
        info!(
            completed = status.trials_completed,
            stopped = status.trials_stopped,
            failed = status.trials_failed,
            best = ?status.best_trial.as_ref().map(|b| b.objective),
            "tuning run finished"
        );
        Ok(ResultGrid::new(status, trials))
    }

    fn on_report(
        &mut self,
        trial: &mut Trial,
        status: &mut TuneStatus,
        report: EpochReport,
    ) -> Decision {
        let idx = trial.trial_number;
        let value = match report.checked_metric(&self.config.metric) {
            Ok(value) => value,
            Err(e) => {
                warn!(trial = idx, epoch = report.epoch, error = %e, "invalid report, failing trial");
                if trial.is_finished() {
                    return Decision::Stop;
                }
                trial.mark_failed(e.to_string());
                status.trials_running = status.trials_running.saturating_sub(1);
                status.record_outcome(TrialStatus::Failed);
                return Decision::Stop;
            }
        };

        let epoch = report.epoch;
        trial.record(report);
        let objective = self.config.direction.normalize(value);
        let decision = self.scheduler.on_trial_result(trial.id, epoch, objective);
        debug!(trial = idx, epoch, metric = value, ?decision, "trial reported");
        if decision == Decision::Stop {
            trial.stop_requested = true;
        }
        decision
    }

    fn on_finished(
        &mut self,
        trial: &mut Trial,
        status: &mut TuneStatus,
        outcome: Result<(), TrainError>,
    ) {
        let idx = trial.trial_number;
        self.scheduler.on_trial_complete(trial.id);
        if trial.status == TrialStatus::Failed {
            // Already counted when its report was rejected.
            return;
        }
        if trial.status == TrialStatus::Running {
            status.trials_running = status.trials_running.saturating_sub(1);
        }

        match outcome {
            Ok(()) => trial.mark_completed(),
            Err(e) if e.is_stop() && trial.stop_requested => trial.mark_stopped(),
            Err(e) if e.is_stop() => {
                warn!(trial = idx, "trial stopped without a scheduler decision");
                trial.mark_failed("stopped without a scheduler decision".to_string());
            }
            Err(e) => {
                warn!(trial = idx, id = %trial.id, error = %e, "trial failed");
                trial.mark_failed(e.to_string());
            }
        }
        status.record_outcome(trial.status);

        if let Some(result) = trial.result(&self.config.metric) {
            self.searcher
                .report(&trial.parameters, self.config.direction.normalize(result.objective));
            status.update_best(&result);
            info!(
                trial = idx,
                status = ?trial.status,
                epochs = result.epochs,
                metric = result.objective,
                "trial finished"
            );
        }
    }

    fn launch(&self, idx: usize, config: TrainConfig, events: mpsc::UnboundedSender<TrialEvent>) {
        let trainable = Arc::clone(&self.trainable);
        let pool = self.pool.clone();
        let request = self.config.resources_per_trial;
        tokio::spawn(async move {
            let outcome = run_trial(idx, trainable, pool, request, config, &events).await;
            let _ = events.send(TrialEvent::Finished { idx, outcome });
        });
    }
}

async fn run_trial<T: Trainable + 'static>(
    idx: usize,
    trainable: Arc<T>,
    pool: ResourcePool,
    request: WorkerResources,
    config: TrainConfig,
    events: &mpsc::UnboundedSender<TrialEvent>,
) -> Result<(), TrainError> {
    let _lease = pool
        .acquire(request)
        .await
        .map_err(|e| TrainError::ExecutionFailed {
            message: e.to_string(),
        })?;
    let _ = events.send(TrialEvent::Started { idx });

    let (reporter, mut reports) = Reporter::channel(1);
    let worker = tokio::spawn(async move { trainable.train(config, reporter).await });
    let forward = async {
        while let Some(request) = reports.recv().await {
            if events.send(TrialEvent::Report { idx, request }).is_err() {
                break;
            }
        }
    };

    let (joined, ()) = tokio::join!(worker, forward);
    joined.unwrap_or_else(|e| Err(join_failure(e)))
}

fn join_failure(error: JoinError) -> TrainError {
    let message = if error.is_panic() {
        format!("trial panicked: {}", panic_message(error.into_panic()))
    } else {
        error.to_string()
    };
    TrainError::ExecutionFailed { message }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{AshaConfig, AshaScheduler};
    use crate::search::ParameterValue;
    use crate::trial::ObjectiveDirection;
    use async_trait::async_trait;
    use serde_json::json;
    use st_train::SurrogateTrainer;
    use st_types::{StError, TuneError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Reports a constant mAP per epoch derived from the learning rate.
    /// `lr > fail_above` fails, `batch_size == panic_batch` panics, and
    /// `loss_offset` adds a `loss` metric above 1.
    #[derive(Default)]
    struct ScriptedTrainer {
        fail_above: Option<f64>,
        panic_batch: Option<usize>,
        bad_metric_below: Option<f64>,
        loss_offset: Option<f64>,
        delay: Option<Duration>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Trainable for ScriptedTrainer {
        async fn train(&self, config: TrainConfig, reporter: Reporter) -> Result<(), TrainError> {
            assert!(config.report_to_tuner);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let result = self.run(&config, &reporter).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    impl ScriptedTrainer {
        async fn run(&self, config: &TrainConfig, reporter: &Reporter) -> Result<(), TrainError> {
            if Some(config.batch_size) == self.panic_batch {
                panic!("CUDA out of memory");
            }
            for epoch in 1..=config.num_epochs {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail_above.is_some_and(|max| config.lr > max) {
                    return Err(TrainError::ExecutionFailed {
                        message: "loss is NaN".into(),
                    });
                }
                let map = if self.bad_metric_below.is_some_and(|min| config.lr < min) {
                    f64::NAN
                } else {
                    config.lr * 10.0
                };
                let mut report = EpochReport::with_map(epoch, map);
                if let Some(offset) = self.loss_offset {
                    report.metrics.insert("loss".to_string(), offset + map);
                }
                reporter.report(report).await?;
            }
            Ok(())
        }
    }

    fn lr_point(lr: f64) -> Point {
        let mut point = HashMap::new();
        point.insert("lr".to_string(), ParameterValue::Float(lr));
        point
    }

    fn lr_space() -> SearchSpace {
        SearchSpace::new().add_uniform("lr", 0.001, 0.09)
    }

    fn scripted_tuner(trainer: ScriptedTrainer, lrs: &[f64]) -> Tuner<ScriptedTrainer> {
        let base = TrainConfig::default().with_epochs(3);
        let space = lr_space();
        let searcher = RandomSearch::new(space.clone())
            .with_seed(11)
            .with_points_to_evaluate(lrs.iter().copied().map(lr_point).collect());
        let config = TuneConfig::new("scripted").with_num_samples(lrs.len());
        Tuner::new(trainer, base, space, config).with_searcher(searcher)
    }

    #[tokio::test]
    async fn pedestrian_scenario_evaluates_initial_point() {
        let space = SearchSpace::new()
            .add_qlog_uniform("lr", 1e-4, 1e-1, 1e-4)
            .add_choice("batch_size", vec![json!(2), json!(4)]);
        let mut initial = HashMap::new();
        initial.insert("lr".to_string(), ParameterValue::Float(0.005));
        initial.insert("batch_size".to_string(), ParameterValue::Int(2));

        let searcher = crate::search::TpeSearch::new(space.clone())
            .with_seed(7)
            .with_points_to_evaluate(vec![initial]);
        let scheduler = AshaScheduler::new(AshaConfig::default()).unwrap();
        let pool = ResourcePool::new(WorkerResources {
            num_cpus: 16,
            num_gpus: 4,
        });

        let grid = Tuner::new(
            SurrogateTrainer::default().with_seed(3),
            TrainConfig::default(),
            space.clone(),
            TuneConfig::new("pedestrians"),
        )
        .with_searcher(searcher)
        .with_scheduler(scheduler)
        .with_pool(pool)
        .fit()
        .await
        .unwrap();

        assert_eq!(grid.len(), 20);
        let first = &grid.trials()[0];
        assert_eq!(first.parameters["lr"].as_f64(), Some(0.005));
        assert_eq!(first.config.as_ref().unwrap().batch_size, 2);
        assert!(grid.trials().iter().all(|t| space.contains(&t.parameters)));
        assert!(grid.trials().iter().all(Trial::is_finished));

        let best = grid.get_best_result().unwrap();
        assert!(grid.trials().iter().any(|t| t.id == best.trial_id));
        for result in grid.trials().iter().filter_map(|t| t.result("mAP")) {
            assert!(best.objective >= result.objective);
        }
        // Learning rates at or above 0.09 diverge.
        for trial in grid.trials() {
            if trial.config.as_ref().unwrap().lr >= 0.09 {
                assert_eq!(trial.status, TrialStatus::Failed);
            }
        }
    }

    #[tokio::test]
    async fn trial_configs_are_independent_copies() {
        let lrs = [0.01, 0.02, 0.03];
        let grid = scripted_tuner(ScriptedTrainer::default(), &lrs)
            .fit()
            .await
            .unwrap();

        let base = TrainConfig::default().with_epochs(3);
        for (trial, lr) in grid.trials().iter().zip(lrs) {
            let config = trial.config.as_ref().unwrap();
            assert_eq!(config.lr, lr);
            assert!(config.report_to_tuner);
            assert_eq!(
                config,
                &TrainConfig {
                    lr,
                    report_to_tuner: true,
                    ..base.clone()
                }
            );
            assert_eq!(trial.status, TrialStatus::Completed);
            assert_eq!(trial.history.len(), 3);
        }
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let trainer = ScriptedTrainer {
            fail_above: Some(0.05),
            panic_batch: None,
            ..Default::default()
        };
        let grid = scripted_tuner(trainer, &[0.01, 0.08, 0.04, 0.07])
            .fit()
            .await
            .unwrap();

        assert_eq!(grid.num_errors(), 2);
        assert_eq!(grid.status.trials_failed, 2);
        assert_eq!(grid.status.trials_completed, 2);
        let best = grid.get_best_result().unwrap();
        assert_eq!(best.trial_number, 2);
        assert!((best.objective - 0.4).abs() < 1e-12);
        assert_eq!(grid.status.best_trial.as_ref().map(|b| b.trial_id), Some(best.trial_id));
        for failed in grid.errors() {
            assert!(failed.error.as_deref().unwrap().contains("NaN"));
        }
    }

    #[tokio::test]
    async fn panicking_trial_is_marked_failed() {
        let trainer = ScriptedTrainer {
            panic_batch: Some(4),
            ..Default::default()
        };
        let space = lr_space().add_choice("batch_size", vec![json!(2), json!(4)]);
        let mut points = Vec::new();
        for batch_size in [4, 2] {
            let mut point = lr_point(0.02);
            point.insert("batch_size".to_string(), ParameterValue::Int(batch_size));
            points.push(point);
        }
        let searcher = RandomSearch::new(space.clone()).with_points_to_evaluate(points);
        let grid = Tuner::new(
            trainer,
            TrainConfig::default().with_epochs(2),
            space,
            TuneConfig::new("panics").with_num_samples(2),
        )
        .with_searcher(searcher)
        .fit()
        .await
        .unwrap();

        assert_eq!(grid.trials()[0].status, TrialStatus::Failed);
        assert!(grid.trials()[0]
            .error
            .as_deref()
            .unwrap()
            .contains("CUDA out of memory"));
        assert_eq!(grid.trials()[1].status, TrialStatus::Completed);
        assert_eq!(grid.get_best_result().unwrap().trial_number, 1);
    }

    #[tokio::test]
    async fn invalid_metric_fails_trial() {
        let trainer = ScriptedTrainer {
            bad_metric_below: Some(0.015),
            ..Default::default()
        };
        let grid = scripted_tuner(trainer, &[0.01, 0.02]).fit().await.unwrap();
        let bad = &grid.trials()[0];
        assert_eq!(bad.status, TrialStatus::Failed);
        assert!(bad.history.is_empty());
        assert_eq!(grid.trials()[1].status, TrialStatus::Completed);
        assert_eq!(grid.status.trials_failed, 1);
    }

    #[tokio::test]
    async fn all_failed_has_no_best_result() {
        let trainer = ScriptedTrainer {
            fail_above: Some(0.0),
            ..Default::default()
        };
        let grid = scripted_tuner(trainer, &[0.01, 0.02]).fit().await.unwrap();
        assert_eq!(grid.num_errors(), 2);
        assert_eq!(
            grid.get_best_result(),
            Err(TuneError::NoSuccessfulTrials {
                metric: "mAP".into()
            })
        );
    }

    #[tokio::test]
    async fn asha_stops_weak_trial_at_grace_period() {
        let base = TrainConfig::default();
        let space = lr_space();
        let searcher = RandomSearch::new(space.clone())
            .with_points_to_evaluate(vec![lr_point(0.08), lr_point(0.01)]);
        let grid = Tuner::new(
            ScriptedTrainer::default(),
            base,
            space,
            TuneConfig::new("asha").with_num_samples(2),
        )
        .with_searcher(searcher)
        .with_scheduler(AshaScheduler::new(AshaConfig::default()).unwrap())
        .fit()
        .await
        .unwrap();

        let (strong, weak) = (&grid.trials()[0], &grid.trials()[1]);
        assert_eq!(strong.history.len(), 10);
        assert_eq!(strong.status, TrialStatus::Stopped);
        assert_eq!(weak.history.len(), 4);
        assert_eq!(weak.status, TrialStatus::Stopped);
        assert_eq!(grid.num_terminated(), 2);
        assert_eq!(grid.get_best_result().unwrap().trial_number, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_limits_concurrent_trials() {
        let trainer = ScriptedTrainer {
            delay: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let lrs = [0.01, 0.02, 0.03, 0.04, 0.05];
        let tuner = scripted_tuner(trainer, &lrs).with_pool(ResourcePool::new(WorkerResources {
            num_cpus: 8,
            num_gpus: 2,
        }));
        let trainable = Arc::clone(&tuner.trainable);
        let grid = tuner.fit().await.unwrap();

        assert_eq!(grid.status.trials_completed, 5);
        assert_eq!(trainable.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn max_concurrent_trials_caps_pool() {
        let trainer = ScriptedTrainer {
            delay: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        let mut tuner = scripted_tuner(trainer, &[0.01, 0.02, 0.03]).with_pool(ResourcePool::new(
            WorkerResources {
                num_cpus: 64,
                num_gpus: 8,
            },
        ));
        tuner.config.max_concurrent_trials = Some(1);
        assert_eq!(tuner.concurrency(), 1);
        let trainable = Arc::clone(&tuner.trainable);
        tuner.fit().await.unwrap();
        assert_eq!(trainable.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn setup_errors_abort_before_any_trial() {
        let unknown_key = Tuner::new(
            ScriptedTrainer::default(),
            TrainConfig::default(),
            SearchSpace::new().add_uniform("learning_rate", 0.001, 0.1),
            TuneConfig::new("bad-key"),
        );
        let trainable = Arc::clone(&unknown_key.trainable);
        assert!(matches!(
            unknown_key.fit().await,
            Err(StError::Config(ConfigError::UnknownKey { .. }))
        ));
        assert_eq!(trainable.peak.load(Ordering::SeqCst), 0);

        let oversized = Tuner::new(
            ScriptedTrainer::default(),
            TrainConfig::default(),
            lr_space(),
            TuneConfig::new("big").with_resources(WorkerResources {
                num_cpus: 4,
                num_gpus: 2,
            }),
        )
        .with_pool(ResourcePool::new(WorkerResources::default()));
        assert!(matches!(
            oversized.fit().await,
            Err(StError::Tune(TuneError::QuotaExceedsPool { .. }))
        ));

        let mut foreign = lr_point(0.01);
        foreign.insert("dropout".to_string(), ParameterValue::Float(0.1));
        let foreign_point = Tuner::new(
            ScriptedTrainer::default(),
            TrainConfig::default(),
            lr_space(),
            TuneConfig::new("foreign-point"),
        )
        .with_searcher(RandomSearch::new(lr_space()).with_points_to_evaluate(vec![foreign]));
        let trainable = Arc::clone(&foreign_point.trainable);
        assert!(matches!(
            foreign_point.fit().await,
            Err(StError::Tune(TuneError::InvalidSearchSpace { .. }))
        ));
        assert_eq!(trainable.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn minimize_direction_selects_lowest() {
        let tuner = scripted_tuner(ScriptedTrainer::default(), &[0.03, 0.01, 0.02]);
        let config = tuner.config.clone().with_objective("mAP", ObjectiveDirection::Minimize);
        let tuner = Tuner { config, ..tuner };
        let grid = tuner.fit().await.unwrap();
        assert_eq!(grid.get_best_result().unwrap().trial_number, 1);
    }

    #[tokio::test]
    async fn unbounded_metric_can_be_minimized() {
        let trainer = ScriptedTrainer {
            loss_offset: Some(2.0),
            ..Default::default()
        };
        let tuner = scripted_tuner(trainer, &[0.03, 0.01, 0.02]);
        let config = tuner.config.clone().with_objective("loss", ObjectiveDirection::Minimize);
        let grid = Tuner { config, ..tuner }.fit().await.unwrap();

        assert_eq!(grid.num_errors(), 0);
        let best = grid.get_best_result().unwrap();
        assert_eq!(best.trial_number, 1);
        assert!((best.objective - 2.1).abs() < 1e-12);
    }
}
