//! # segtune
//!
//! Command-line interface: fine-tune once, search hyperparameters, or adapt
//! a checkpoint's prediction heads to a new class count.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use st_model::{replace_heads, DetectionNetwork};
use st_train::{ProcessTrainer, Reporter, SurrogateTrainer, Trainable};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod settings;

use settings::TuneSettings;

#[derive(Parser)]
#[command(name = "segtune", version)]
#[command(about = "Fine-tune and tune Mask R-CNN pedestrian segmenters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one fine-tuning job with the base configuration
    Train {
        /// Settings file (JSON)
        #[arg(short, long, env = "SEGTUNE_CONFIG")]
        config: Option<PathBuf>,

        /// Use the synthetic learning curve instead of the trainer command
        #[arg(long)]
        dry_run: bool,
    },

    /// Search hyperparameters and report the best trial
    Tune {
        /// Settings file (JSON)
        #[arg(short, long, env = "SEGTUNE_CONFIG")]
        config: Option<PathBuf>,

        /// Use the synthetic learning curve instead of the trainer command
        #[arg(long)]
        dry_run: bool,

        /// Number of trials
        #[arg(short = 'n', long, env = "SEGTUNE_NUM_SAMPLES")]
        num_samples: Option<usize>,

        /// Seed for the searcher and the synthetic trainer
        #[arg(long, env = "SEGTUNE_SEED")]
        seed: Option<u64>,

        /// Write every trial's record here (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the box and mask predictors of a checkpoint
    Adapt {
        /// Pre-trained checkpoint (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the adapted checkpoint
        #[arg(short, long)]
        output: PathBuf,

        /// Classes including background
        #[arg(long, default_value_t = 2)]
        num_classes: usize,

        /// Seed for the new heads' initialisation
        #[arg(long, env = "SEGTUNE_SEED")]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "segtune=info,st_tune=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train { config, dry_run } => {
            let settings = TuneSettings::resolve(config.as_deref())?;
            if dry_run {
                let trainer = SurrogateTrainer::default().with_seed(settings.seed.unwrap_or(0));
                run_train(trainer, &settings).await
            } else {
                run_train(process_trainer(&settings)?, &settings).await
            }
        }

        Commands::Tune {
            config,
            dry_run,
            num_samples,
            seed,
            output,
        } => {
            let settings =
                TuneSettings::resolve(config.as_deref())?.with_overrides(num_samples, seed);
            if dry_run {
                let trainer = SurrogateTrainer::default().with_seed(settings.seed.unwrap_or(0));
                run_tune(trainer, &settings, output.as_deref()).await
            } else {
                run_tune(process_trainer(&settings)?, &settings, output.as_deref()).await
            }
        }

        Commands::Adapt {
            input,
            output,
            num_classes,
            seed,
        } => run_adapt(&input, &output, num_classes, seed),
    }
}

fn process_trainer(settings: &TuneSettings) -> anyhow::Result<ProcessTrainer> {
    match &settings.trainer {
        Some(trainer) => Ok(trainer.clone()),
        None => bail!(
            "no trainer command configured; set `trainer` in the settings file or pass --dry-run"
        ),
    }
}

async fn run_train<T: Trainable>(trainer: T, settings: &TuneSettings) -> anyhow::Result<()> {
    settings.base_config.validate()?;
    let config = settings.base_config.clone().with_tuner_reporting(false);
    info!(trainer = trainer.name(), %config, "starting training run");
    trainer.train(config, Reporter::disabled()).await?;
    info!("training finished");
    Ok(())
}

async fn run_tune<T: Trainable + 'static>(
    trainer: T,
    settings: &TuneSettings,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let grid = settings.tuner(trainer)?.fit().await?;
    info!(
        trials = grid.len(),
        errors = grid.num_errors(),
        terminated = grid.num_terminated(),
        "search finished"
    );

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&grid)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write results to {}", path.display()))?;
        info!(path = %path.display(), "wrote trial records");
    }

    let best = grid.get_best_result()?;
    println!("Best trial config: {}", best.config);
    println!("Best trial final {}: {}", settings.metric, best.objective);
    Ok(())
}

fn run_adapt(input: &Path, output: &Path, num_classes: usize, seed: Option<u64>) -> anyhow::Result<()> {
    let mut network = DetectionNetwork::load(input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let replaced = replace_heads(&mut network, num_classes, &mut rng)?;
    network.save(output)?;
    println!(
        "Adapted {} from {} to {} classes (box head {} features, mask head {} channels)",
        network.architecture,
        replaced.previous_classes,
        replaced.num_classes,
        replaced.box_in_features,
        replaced.mask_in_channels
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_tune_arguments() {
        let cli = Cli::try_parse_from([
            "segtune",
            "tune",
            "--dry-run",
            "-n",
            "5",
            "--seed",
            "42",
            "--output",
            "results.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Tune {
                dry_run,
                num_samples,
                seed,
                output,
                ..
            } => {
                assert!(dry_run);
                assert_eq!(num_samples, Some(5));
                assert_eq!(seed, Some(42));
                assert_eq!(output, Some(PathBuf::from("results.json")));
            }
            _ => panic!("expected tune"),
        }
    }

    #[test]
    fn adapt_defaults_to_two_classes() {
        let cli = Cli::try_parse_from(["segtune", "adapt", "-i", "in.json", "-o", "out.json"]).unwrap();
        match cli.command {
            Commands::Adapt { num_classes, .. } => assert_eq!(num_classes, 2),
            _ => panic!("expected adapt"),
        }
    }

    #[test]
    fn tune_without_trainer_needs_dry_run() {
        let err = process_trainer(&TuneSettings::default()).unwrap_err();
        assert!(err.to_string().contains("--dry-run"));
    }

    #[tokio::test]
    async fn dry_run_train_completes() {
        let settings = TuneSettings::default();
        run_train(SurrogateTrainer::default(), &settings).await.unwrap();
    }

    #[tokio::test]
    async fn tune_writes_results_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let settings = TuneSettings {
            num_samples: 3,
            seed: Some(2),
            pool: Some(st_tune::WorkerResources::default()),
            ..TuneSettings::default()
        };
        run_tune(SurrogateTrainer::default(), &settings, Some(&path))
            .await
            .unwrap();

        let grid: st_tune::ResultGrid =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(grid.len(), 3);
    }
}
