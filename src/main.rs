//! Salin - Machine Translation Evaluation Harness
//!
//! Entry point for the `salin` command: builds train/valid/test splits from a
//! parallel corpus, translates the test subset with NLLB or Google Translate,
//! and scores the predictions with BLEU and COMET.

use anyhow::Result;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use salin::cli::{Args, Commands};
use salin::config::Config;
use salin::translate::ProviderKind;
use salin::workflow::{EvaluateOptions, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;
    info!("Starting Salin - Machine Translation Evaluation Harness");

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("salin.toml").exists() {
                info!("Found salin.toml in current directory, loading...");
                Config::from_file("salin.toml")?
            } else {
                Config::default()
            }
        }
    };

    let workflow = Workflow::new(config.clone())?;

    match args.command {
        Commands::Split { manifest, version, seed, held_out } => {
            info!("Building split '{}' from {}", version, manifest.display());

            let seed = seed.or(config.data.seed).unwrap_or_else(rand::random);
            info!("Shuffling with seed {}", seed);
            let mut rng = StdRng::seed_from_u64(seed);

            let dataset = workflow.build_split(&manifest, &version, held_out, &mut rng).await?;
            println!(
                "Split '{}': train {}, valid {}, test {}",
                version,
                dataset.train.len(),
                dataset.valid.len(),
                dataset.test.len()
            );
        }
        Commands::Evaluate { version, providers, predictions, sample, save_predictions } => {
            info!("Evaluating split '{}'", version);

            let providers = match (providers, &predictions) {
                (Some(names), _) => ProviderKind::parse_list(&names)?,
                (None, Some(_)) => Vec::new(),
                (None, None) => vec![ProviderKind::Nllb],
            };
            let options = EvaluateOptions { sample, save_predictions };

            let results = workflow.evaluate(&version, &providers, predictions, &options).await?;
            for result in &results {
                info!("{}: BLEU {:.2}", result.label, result.report.bleu.score);
            }
        }
        Commands::Finetune { version } => {
            info!("Fine-tuning {} on split '{}'", config.neural.base_model, version);
            let output_dir = workflow.finetune(&version).await?;
            println!("Fine-tuned model saved to {}", output_dir.display());
        }
        Commands::Dump { version, output } => {
            let count = workflow.dump_test_sources(&version, &output).await?;
            println!("Wrote {} test sentences to {}", count, output.display());
        }
        Commands::List => {
            let (splits, models) = workflow.list_artifacts()?;
            let cwd = std::env::current_dir()?;

            if splits.is_empty() {
                println!("No saved splits found.");
            } else {
                println!("\nSaved Splits:");
                println!("{:<20} {:<8} {:<8} {:<8} {:<8} {:<26}", "Version", "Mode", "Train", "Valid", "Test", "Created");
                println!("{}", "-".repeat(80));
                for split in &splits {
                    println!(
                        "{:<20} {:<8} {:<8} {:<8} {:<8} {:<26}",
                        split.version,
                        format!("{:?}", split.mode).to_lowercase(),
                        split.train,
                        split.valid,
                        split.test,
                        split.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }

            if models.is_empty() {
                println!("\nNo fine-tuned models found.");
            } else {
                println!("\nFine-tuned Models:");
                for model in &models {
                    let shown = pathdiff::diff_paths(model, &cwd).unwrap_or_else(|| model.clone());
                    println!("  {}", shown.display());
                }
            }
        }
    }

    info!("Salin completed successfully");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".salin").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "salin.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("salin.log").display()
    );

    Ok(())
}
