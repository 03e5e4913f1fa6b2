//! `segtune` settings file.
//!
//! A single JSON document; every field is optional and falls back to the
//! pedestrian fine-tuning defaults.

use serde::{Deserialize, Serialize};
use serde_json::json;
use st_train::{ProcessTrainer, Trainable};
use st_tune::{
    AshaConfig, AshaScheduler, FifoScheduler, ObjectiveDirection, ParameterValue, Point,
    RandomSearch, ResourcePool, SearchSpace, TpeSearch, TuneConfig, Tuner, WorkerResources,
};
use st_types::{validation_error, StResult, TrainConfig, MAP_METRIC};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearcherKind {
    #[default]
    Tpe,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Asha,
    Fifo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TuneSettings {
    pub name: String,
    /// Configuration every trial starts from.
    pub base_config: TrainConfig,
    pub search_space: SearchSpace,
    /// Evaluated first, in order; missing dimensions are sampled.
    pub points_to_evaluate: Vec<Point>,
    pub searcher: SearcherKind,
    pub scheduler: SchedulerKind,
    pub asha: AshaConfig,
    pub num_samples: usize,
    pub metric: String,
    pub mode: ObjectiveDirection,
    pub resources_per_trial: WorkerResources,
    /// Pool shared by all trials. Defaults to this machine's cores and the
    /// per-trial GPU count.
    pub pool: Option<WorkerResources>,
    pub max_concurrent_trials: Option<usize>,
    /// External training command; required unless running dry.
    pub trainer: Option<ProcessTrainer>,
    pub seed: Option<u64>,
}

impl Default for TuneSettings {
    fn default() -> Self {
        let mut initial = HashMap::new();
        initial.insert("lr".to_string(), ParameterValue::Float(0.005));
        initial.insert("batch_size".to_string(), ParameterValue::Int(2));

        Self {
            name: "pedestrian-maskrcnn".to_string(),
            base_config: TrainConfig::default(),
            search_space: SearchSpace::new()
                .add_qlog_uniform("lr", 1e-4, 1e-1, 1e-4)
                .add_choice("batch_size", vec![json!(2), json!(4)]),
            points_to_evaluate: vec![initial],
            searcher: SearcherKind::Tpe,
            scheduler: SchedulerKind::Asha,
            asha: AshaConfig::default(),
            num_samples: 20,
            metric: MAP_METRIC.to_string(),
            mode: ObjectiveDirection::Maximize,
            resources_per_trial: WorkerResources::default(),
            pool: None,
            max_concurrent_trials: None,
            trainer: None,
            seed: None,
        }
    }
}

impl TuneSettings {
    /// Read and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> StResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from `path`, or the defaults when no file is given.
    pub fn resolve(path: Option<&Path>) -> StResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line or environment overrides.
    pub fn with_overrides(mut self, num_samples: Option<usize>, seed: Option<u64>) -> Self {
        if let Some(n) = num_samples {
            self.num_samples = n;
        }
        if seed.is_some() {
            self.seed = seed;
        }
        self
    }

    pub fn validate(&self) -> StResult<()> {
        self.base_config.validate()?;
        self.search_space.validate()?;
        for point in &self.points_to_evaluate {
            self.search_space.check_point(point)?;
        }
        if self.num_samples == 0 {
            return Err(validation_error!("num_samples must be at least 1"));
        }
        if self.scheduler == SchedulerKind::Asha {
            AshaScheduler::new(self.asha)?;
        }
        Ok(())
    }

    pub fn tune_config(&self) -> TuneConfig {
        let config = TuneConfig::new(self.name.clone())
            .with_num_samples(self.num_samples)
            .with_objective(&self.metric, self.mode)
            .with_resources(self.resources_per_trial);
        match self.max_concurrent_trials {
            Some(n) => config.with_max_concurrent_trials(n),
            None => config,
        }
    }

    pub fn resource_pool(&self) -> ResourcePool {
        match self.pool {
            Some(total) => ResourcePool::new(total),
            None => ResourcePool::local(self.resources_per_trial.num_gpus),
        }
    }

    /// Assemble a tuner for `trainable` with the configured searcher,
    /// scheduler and pool.
    pub fn tuner<T: Trainable + 'static>(&self, trainable: T) -> StResult<Tuner<T>> {
        self.validate()?;
        let space = self.search_space.clone();
        let tuner = Tuner::new(
            trainable,
            self.base_config.clone(),
            space.clone(),
            self.tune_config(),
        )
        .with_pool(self.resource_pool());

        let points = self.points_to_evaluate.clone();
        let tuner = match self.searcher {
            SearcherKind::Tpe => {
                let mut searcher = TpeSearch::new(space).with_points_to_evaluate(points);
                if let Some(seed) = self.seed {
                    searcher = searcher.with_seed(seed);
                }
                tuner.with_searcher(searcher)
            }
            SearcherKind::Random => {
                let mut searcher = RandomSearch::new(space).with_points_to_evaluate(points);
                if let Some(seed) = self.seed {
                    searcher = searcher.with_seed(seed);
                }
                tuner.with_searcher(searcher)
            }
        };

        Ok(match self.scheduler {
            SchedulerKind::Asha => tuner.with_scheduler(AshaScheduler::new(self.asha)?),
            SchedulerKind::Fifo => tuner.with_scheduler(FifoScheduler),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_train::SurrogateTrainer;
    use st_types::{ConfigError, StError, TuneError};
    use std::io::Write;

    fn write_settings(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_pedestrian_run() {
        let settings = TuneSettings::default();
        assert_eq!(settings.num_samples, 20);
        assert_eq!(settings.asha, AshaConfig::default());
        assert_eq!(settings.resources_per_trial.num_cpus, 4);
        assert_eq!(settings.resources_per_trial.num_gpus, 1);
        assert_eq!(settings.points_to_evaluate.len(), 1);
        assert!(settings.search_space.contains(&settings.points_to_evaluate[0]));
        settings.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_settings(
            r#"{
                "num_samples": 4,
                "searcher": "random",
                "asha": {"max_t": 6, "grace_period": 2, "reduction_factor": 3.0},
                "base_config": {"batch_size": 4, "shuffle": true, "lr": 0.01, "momentum": 0.9,
                    "weight_decay": 0.0005, "step_size": 3, "gamma": 0.1, "num_epochs": 6,
                    "raytune": true},
                "trainer": {"program": "python", "args": ["train.py"]}
            }"#,
        );
        let settings = TuneSettings::load(file.path()).unwrap();
        assert_eq!(settings.num_samples, 4);
        assert_eq!(settings.searcher, SearcherKind::Random);
        assert_eq!(settings.asha.max_t, 6);
        assert_eq!(settings.base_config.batch_size, 4);
        assert_eq!(settings.metric, "mAP");
        assert_eq!(settings.trainer.unwrap().args, vec!["train.py"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_settings(r#"{"num_sample": 4}"#);
        assert!(matches!(
            TuneSettings::load(file.path()),
            Err(StError::Serialization(_))
        ));
    }

    #[test]
    fn initial_point_outside_space_is_rejected() {
        let file = write_settings(r#"{"points_to_evaluate": [{"lr": 0.5}]}"#);
        assert!(matches!(
            TuneSettings::load(file.path()),
            Err(StError::Tune(TuneError::InvalidSearchSpace { .. }))
        ));
    }

    #[test]
    fn invalid_base_config_is_rejected() {
        let mut settings = TuneSettings::default();
        settings.base_config.batch_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(StError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn overrides_take_precedence() {
        let settings = TuneSettings {
            seed: Some(1),
            ..TuneSettings::default()
        }
        .with_overrides(Some(3), None);
        assert_eq!(settings.num_samples, 3);
        assert_eq!(settings.seed, Some(1));

        let settings = settings.with_overrides(None, Some(9));
        assert_eq!(settings.seed, Some(9));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            TuneSettings::resolve(Some(Path::new("/nonexistent/segtune.json"))),
            Err(StError::Io(_))
        ));
        assert!(TuneSettings::resolve(None).is_ok());
    }

    #[tokio::test]
    async fn dry_run_tuning_finds_a_best_trial() {
        let settings = TuneSettings {
            num_samples: 6,
            seed: Some(5),
            pool: Some(WorkerResources {
                num_cpus: 8,
                num_gpus: 2,
            }),
            ..TuneSettings::default()
        };
        let grid = settings
            .tuner(SurrogateTrainer::default().with_seed(5))
            .unwrap()
            .fit()
            .await
            .unwrap();
        assert_eq!(grid.len(), 6);
        let best = grid.get_best_result().unwrap();
        assert!(best.objective > 0.0);
        assert_eq!(grid.trials()[0].parameters["lr"].as_f64(), Some(0.005));
    }
}
