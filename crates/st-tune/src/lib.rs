//! # st-tune
//!
//! Hyperparameter search over a training procedure: search spaces and
//! searchers (random, TPE), early-stopping schedulers (FIFO, ASHA), a shared
//! CPU/GPU resource pool, per-trial bookkeeping and the [`Tuner`] that runs
//! it all.
//!
//! ```no_run
//! use serde_json::json;
//! use st_train::SurrogateTrainer;
//! use st_tune::{AshaConfig, AshaScheduler, SearchSpace, TpeSearch, TuneConfig, Tuner};
//! use st_types::TrainConfig;
//!
//! # async fn run() -> st_types::StResult<()> {
//! let space = SearchSpace::new()
//!     .add_qlog_uniform("lr", 1e-4, 1e-1, 1e-4)
//!     .add_choice("batch_size", vec![json!(2), json!(4)]);
//! let grid = Tuner::new(
//!     SurrogateTrainer::default(),
//!     TrainConfig::default(),
//!     space.clone(),
//!     TuneConfig::new("pedestrians"),
//! )
//! .with_searcher(TpeSearch::new(space))
//! .with_scheduler(AshaScheduler::new(AshaConfig::default())?)
//! .fit()
//! .await?;
//! println!("{:?}", grid.get_best_result()?.config);
//! # Ok(())
//! # }
//! ```

pub mod resources;
pub mod results;
pub mod scheduler;
pub mod search;
mod tpe;
pub mod trial;
pub mod tuner;

pub use resources::{ResourceLease, ResourcePool, WorkerResources};
pub use results::ResultGrid;
pub use scheduler::{AshaConfig, AshaScheduler, FifoScheduler, TrialScheduler};
pub use search::{
    ParameterDef, ParameterKind, ParameterValue, Point, RandomSearch, SearchSpace,
    SearchStrategy, TpeSearch,
};
pub use trial::{
    ObjectiveDirection, Trial, TrialResult, TrialStatus, TuneConfig, TuneId, TuneState,
    TuneStatus,
};
pub use tuner::Tuner;
