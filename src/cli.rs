use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a train/valid/test split from the corpora listed in a manifest
    Split {
        /// Manifest with 2 paths (source, target) or 4 (train source/target, test source/target)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Version name to save the split under
        #[arg(long)]
        version: String,

        /// Random seed for the shuffle (a fresh one is drawn and logged otherwise)
        #[arg(long)]
        seed: Option<u64>,

        /// Fraction of the corpus held out from training
        #[arg(long)]
        held_out: Option<f64>,
    },

    /// Translate the test subset of a saved split and score the results
    Evaluate {
        /// Version of a saved split
        #[arg(long)]
        version: String,

        /// Providers to evaluate (comma-separated: nllb, finetuned, google)
        #[arg(short, long)]
        providers: Option<String>,

        /// Score manually produced predictions from this file
        #[arg(long)]
        predictions: Option<PathBuf>,

        /// Only translate and score the first test sentence
        #[arg(long)]
        sample: bool,

        /// Directory to write each provider's predictions to
        #[arg(long)]
        save_predictions: Option<PathBuf>,
    },

    /// Fine-tune the base neural model on a saved split
    Finetune {
        /// Version of a saved split
        #[arg(long)]
        version: String,
    },

    /// Write the test sources of a saved split for manual translation
    Dump {
        /// Version of a saved split
        #[arg(long)]
        version: String,

        /// Output text file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List saved splits and fine-tuned models
    List,
}
