use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::{self, Corpus};
use crate::error::{Result, SalinError};
use crate::report::{ProviderScores, ReportWriter};
use crate::scoring::Scorer;
use crate::split::{SplitBuilder, SplitDataset, SplitMode, SplitStore, SplitSummary};
use crate::translate::neural::{self, NeuralTranslator};
use crate::translate::{ProviderKind, Translator, TranslatorFactory};

/// Corpus file paths listed in a manifest, one per line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// Two lines: source path, target path
    Single { source: PathBuf, target: PathBuf },
    /// Four lines: train source, train target, test source, test target
    Dual {
        train_source: PathBuf,
        train_target: PathBuf,
        test_source: PathBuf,
        test_target: PathBuf,
    },
}

impl Manifest {
    pub async fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = corpus::read_existing(path).await?;
        let lines: Vec<PathBuf> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect();

        match lines.as_slice() {
            [source, target] => Ok(Self::Single {
                source: source.clone(),
                target: target.clone(),
            }),
            [train_source, train_target, test_source, test_target] => Ok(Self::Dual {
                train_source: train_source.clone(),
                train_target: train_target.clone(),
                test_source: test_source.clone(),
                test_target: test_target.clone(),
            }),
            _ => Err(SalinError::Config(format!(
                "Manifest {} must list 2 or 4 paths, found {}",
                path.display(),
                lines.len()
            ))),
        }
    }
}

/// Where one set of predictions comes from
pub enum PredictionSource {
    /// Translate the test sources with a provider
    Translator(Box<dyn Translator>),
    /// Read manually produced predictions from a file
    File(PathBuf),
}

impl PredictionSource {
    pub fn label(&self) -> String {
        match self {
            Self::Translator(translator) => translator.label().to_string(),
            Self::File(_) => "manual".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Only translate and score the first test sentence, printing it
    pub sample: bool,
    /// Directory to write each provider's predictions to
    pub save_predictions: Option<PathBuf>,
}

pub struct Workflow {
    config: Config,
    store: SplitStore,
    scorer: Scorer,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let scorer = Scorer::from_config(&config.scoring)?;
        Ok(Self::with_scorer(config, scorer))
    }

    pub fn with_scorer(config: Config, scorer: Scorer) -> Self {
        let store = SplitStore::new(&config.data.artifact_dir);
        Self {
            config,
            store,
            scorer,
        }
    }

    /// Build a split from the corpora listed in a manifest and save it under `version`
    pub async fn build_split<P: AsRef<Path>, R: Rng + ?Sized>(
        &self,
        manifest_path: P,
        version: &str,
        held_out_fraction: Option<f64>,
        rng: &mut R,
    ) -> Result<SplitDataset> {
        let manifest = Manifest::read(manifest_path).await?;
        let policy = self.config.data.blank_lines;
        let mut builder = SplitBuilder::new(&self.config.data);
        if let Some(fraction) = held_out_fraction {
            builder = builder.with_held_out_fraction(fraction)?;
        }

        let (dataset, mode) = match manifest {
            Manifest::Single { source, target } => {
                let corpus = Corpus::read_parallel(&source, &target, policy).await?;
                (builder.build_single(corpus, rng), SplitMode::Single)
            }
            Manifest::Dual {
                train_source,
                train_target,
                test_source,
                test_target,
            } => {
                let train = Corpus::read_parallel(&train_source, &train_target, policy).await?;
                let test = Corpus::read_parallel(&test_source, &test_target, policy).await?;
                (builder.build_dual(train, test, rng), SplitMode::Dual)
            }
        };

        self.store.save(version, mode, &dataset).await?;
        Ok(dataset)
    }

    pub async fn load_split(&self, version: &str) -> Result<SplitDataset> {
        self.store.load(version).await
    }

    /// Evaluate the chosen providers (and an optional predictions file) on a saved split
    pub async fn evaluate(
        &self,
        version: &str,
        providers: &[ProviderKind],
        predictions_file: Option<PathBuf>,
        options: &EvaluateOptions,
    ) -> Result<Vec<ProviderScores>> {
        let dataset = self.load_split(version).await?;

        let mut sources = Vec::new();
        for kind in providers {
            let translator = TranslatorFactory::create_translator(*kind, &self.config, version)?;
            sources.push(PredictionSource::Translator(translator));
        }
        if let Some(path) = predictions_file {
            sources.push(PredictionSource::File(path));
        }
        if sources.is_empty() {
            return Err(SalinError::Config(
                "Nothing to evaluate: give at least one provider or a predictions file".to_string(),
            ));
        }

        let results = self.evaluate_sources(&dataset, sources, options).await?;
        ReportWriter::new(&self.config.report.file).write(&results).await?;
        Ok(results)
    }

    /// Obtain predictions from every source over the test subset and score them
    pub async fn evaluate_sources(
        &self,
        dataset: &SplitDataset,
        sources: Vec<PredictionSource>,
        options: &EvaluateOptions,
    ) -> Result<Vec<ProviderScores>> {
        let test = if options.sample {
            Corpus {
                pairs: dataset.test.pairs.iter().take(1).cloned().collect(),
            }
        } else {
            dataset.test.clone()
        };
        let test_sources = test.sources();
        let references = test.references();

        if test.is_empty() {
            warn!("Test subset is empty; scores will be degenerate");
        }

        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let label = source.label();
            info!("Evaluating {} on {} test sentences", label, test.len());

            let mut predictions = match &source {
                PredictionSource::Translator(translator) => translator.translate_batch(&test_sources).await?,
                PredictionSource::File(path) => corpus::load_predictions(path).await?,
            };
            if options.sample {
                predictions.truncate(1);
                print_sample(&test, &predictions);
            }

            if let Some(dir) = &options.save_predictions {
                let path = save_predictions(dir, &label, &predictions).await?;
                info!("Saved {} predictions to {}", label, path.display());
            }

            let report = self
                .scorer
                .score(&predictions, &references, Some(test_sources.as_slice()))
                .await?;
            results.push(ProviderScores { label, report });
        }

        Ok(results)
    }

    /// Fine-tune the base neural model on the train/valid subsets of a saved split
    pub async fn finetune(&self, version: &str) -> Result<PathBuf> {
        let dataset = self.load_split(version).await?;
        let translator = NeuralTranslator::pretrained(self.config.neural.clone())?;
        translator.check_availability().await?;
        translator
            .finetune(&dataset, &self.config.data.artifact_dir, version)
            .await
    }

    /// Write the test sources of a saved split for manual translation
    pub async fn dump_test_sources<P: AsRef<Path>>(&self, version: &str, output: P) -> Result<usize> {
        let dataset = self.load_split(version).await?;
        let sources = dataset.test.sources();
        corpus::write_text_dump(&sources, output).await?;
        Ok(sources.len())
    }

    /// Saved splits and fine-tuned models in the artifact directory
    pub fn list_artifacts(&self) -> Result<(Vec<SplitSummary>, Vec<PathBuf>)> {
        let splits = self.store.list()?;
        let models = neural::list_finetuned_models(&self.config.data.artifact_dir);
        Ok((splits, models))
    }
}

fn print_sample(test: &Corpus, predictions: &[String]) {
    if let (Some(pair), Some(prediction)) = (test.pairs.first(), predictions.first()) {
        println!("original: {}", pair.source_text);
        println!("pred: {}", prediction);
        println!("label: {}", pair.target_text);
    }
}

/// Written in the dump layout so empty predictions survive a reload
async fn save_predictions(dir: &Path, label: &str, predictions: &[String]) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.txt", label));
    corpus::write_text_dump(predictions, &path).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BleuTokenizer;
    use crate::corpus::BilingualPair;
    use crate::scoring::Bleu;
    use assert_fs::prelude::*;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;

    /// Looks translations up in a fixed dictionary
    struct DictionaryTranslator {
        entries: HashMap<String, String>,
    }

    #[async_trait]
    impl Translator for DictionaryTranslator {
        fn label(&self) -> &str {
            "dictionary"
        }

        async fn translate(&self, text: &str) -> Result<String> {
            self.entries
                .get(text)
                .cloned()
                .ok_or_else(|| SalinError::Translation(format!("unknown sentence: {}", text)))
        }
    }

    fn workflow(dir: &Path) -> Workflow {
        let mut config = Config::default();
        config.data.artifact_dir = dir.to_path_buf();
        config.report.file = dir.join("all_scores.txt");
        let scorer = Scorer::new(Bleu::new(BleuTokenizer::Mteval13a, false, true), None, 32);
        Workflow::with_scorer(config, scorer)
    }

    fn pair(id: usize, source: &str, target: &str) -> BilingualPair {
        BilingualPair {
            id,
            source_text: source.to_string(),
            target_text: target.to_string(),
        }
    }

    fn dataset() -> SplitDataset {
        SplitDataset {
            train: Corpus {
                pairs: vec![pair(0, "Salamat.", "Thanks.")],
            },
            valid: Corpus::default(),
            test: Corpus {
                pairs: vec![pair(1, "Kumain ako.", "I ate."), pair(2, "Kumain ako.", "I ate.")],
            },
        }
    }

    fn dictionary() -> Box<dyn Translator> {
        let entries = HashMap::from([("Kumain ako.".to_string(), "I ate.".to_string())]);
        Box::new(DictionaryTranslator { entries })
    }

    #[tokio::test]
    async fn test_manifest_with_two_or_four_lines() {
        let dir = assert_fs::TempDir::new().unwrap();
        let single = dir.child("paths.txt");
        single.write_str("data/train.tg\ndata/train.en\n").unwrap();
        let dual = dir.child("paths_dual.txt");
        dual.write_str("a.tg\na.en\nb.tg\nb.en\n").unwrap();
        let broken = dir.child("paths_broken.txt");
        broken.write_str("a.tg\na.en\nb.tg\n").unwrap();

        assert_eq!(
            Manifest::read(single.path()).await.unwrap(),
            Manifest::Single {
                source: PathBuf::from("data/train.tg"),
                target: PathBuf::from("data/train.en"),
            }
        );
        assert!(matches!(Manifest::read(dual.path()).await.unwrap(), Manifest::Dual { .. }));
        assert!(matches!(Manifest::read(broken.path()).await, Err(SalinError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_split_from_manifest_and_reload() {
        let dir = assert_fs::TempDir::new().unwrap();
        let source = dir.child("corpus.tg");
        let target = dir.child("corpus.en");
        let source_lines: Vec<String> = (0..100).map(|i| format!("pangungusap {}", i)).collect();
        let target_lines: Vec<String> = (0..100).map(|i| format!("sentence {}", i)).collect();
        source.write_str(&source_lines.join("\n")).unwrap();
        target.write_str(&target_lines.join("\n")).unwrap();
        let manifest = dir.child("paths.txt");
        manifest
            .write_str(&format!("{}\n{}\n", source.path().display(), target.path().display()))
            .unwrap();

        let workflow = workflow(dir.path());
        let mut rng = StdRng::seed_from_u64(42);
        let built = workflow
            .build_split(manifest.path(), "v1", None, &mut rng)
            .await
            .unwrap();

        assert_eq!((built.train.len(), built.valid.len(), built.test.len()), (80, 10, 10));
        assert_eq!(workflow.load_split("v1").await.unwrap(), built);
    }

    #[tokio::test]
    async fn test_out_of_range_held_out_is_rejected() {
        let dir = assert_fs::TempDir::new().unwrap();
        let source = dir.child("corpus.tg");
        let target = dir.child("corpus.en");
        source
            .write_str(&(0..10).map(|i| format!("pangungusap {}\n", i)).collect::<String>())
            .unwrap();
        target
            .write_str(&(0..10).map(|i| format!("sentence {}\n", i)).collect::<String>())
            .unwrap();
        let manifest = dir.child("paths.txt");
        manifest
            .write_str(&format!("{}\n{}\n", source.path().display(), target.path().display()))
            .unwrap();
        let workflow = workflow(dir.path());

        for fraction in [1.5, -3.0] {
            let result = workflow
                .build_split(manifest.path(), "v1", Some(fraction), &mut StdRng::seed_from_u64(1))
                .await;
            assert!(matches!(result, Err(SalinError::Config(_))));
        }
        assert!(matches!(workflow.load_split("v1").await, Err(SalinError::MissingArtifact(_))));
    }

    #[tokio::test]
    async fn test_missing_manifest_is_missing_artifact() {
        let dir = assert_fs::TempDir::new().unwrap();

        let result = Manifest::read(dir.path().join("paths.txt")).await;

        assert!(matches!(result, Err(SalinError::MissingArtifact(_))));
    }

    #[tokio::test]
    async fn test_saved_predictions_with_empty_line_score_again() {
        let dir = assert_fs::TempDir::new().unwrap();
        let workflow = workflow(dir.path());
        let mut split = dataset();
        split.test.pairs.insert(1, pair(3, "Hmm.", "Hmm?"));
        let entries = HashMap::from([
            ("Kumain ako.".to_string(), "I ate.".to_string()),
            ("Hmm.".to_string(), String::new()),
        ]);
        let options = EvaluateOptions {
            sample: false,
            save_predictions: Some(dir.path().join("predictions")),
        };

        let translated = workflow
            .evaluate_sources(
                &split,
                vec![PredictionSource::Translator(Box::new(DictionaryTranslator { entries }))],
                &options,
            )
            .await
            .unwrap();
        let reloaded = workflow
            .evaluate_sources(
                &split,
                vec![PredictionSource::File(dir.path().join("predictions/dictionary.txt"))],
                &EvaluateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(reloaded[0].report.bleu, translated[0].report.bleu);
    }

    #[tokio::test]
    async fn test_evaluate_translator_and_file_predictions() {
        let dir = assert_fs::TempDir::new().unwrap();
        let predictions = dir.child("manual.txt");
        predictions.write_str("I ate.\n\nI eat.\n\n").unwrap();
        let workflow = workflow(dir.path());

        let results = workflow
            .evaluate_sources(
                &dataset(),
                vec![
                    PredictionSource::Translator(dictionary()),
                    PredictionSource::File(predictions.path().to_path_buf()),
                ],
                &EvaluateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, "dictionary");
        assert!((results[0].report.bleu.score - 100.0).abs() < 1e-9);
        assert_eq!(results[1].label, "manual");
        assert!(results[1].report.bleu.score < 100.0);
    }

    #[tokio::test]
    async fn test_short_predictions_file_is_length_mismatch() {
        let dir = assert_fs::TempDir::new().unwrap();
        let predictions = dir.child("manual.txt");
        predictions.write_str("I ate.\n").unwrap();

        let result = workflow(dir.path())
            .evaluate_sources(
                &dataset(),
                vec![PredictionSource::File(predictions.path().to_path_buf())],
                &EvaluateOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(SalinError::LengthMismatch { .. })));
    }

    #[tokio::test]
    async fn test_sample_mode_scores_first_sentence_and_saves_predictions() {
        let dir = assert_fs::TempDir::new().unwrap();
        let options = EvaluateOptions {
            sample: true,
            save_predictions: Some(dir.path().join("predictions")),
        };

        let results = workflow(dir.path())
            .evaluate_sources(&dataset(), vec![PredictionSource::Translator(dictionary())], &options)
            .await
            .unwrap();

        assert_eq!(results[0].report.bleu.sys_len, 3);
        dir.child("predictions/dictionary.txt").assert("I ate.\n\n");
    }

    #[tokio::test]
    async fn test_empty_test_subset_is_degenerate_not_fatal() {
        let dir = assert_fs::TempDir::new().unwrap();
        let empty = SplitDataset::default();

        let results = workflow(dir.path())
            .evaluate_sources(&empty, vec![PredictionSource::Translator(dictionary())], &EvaluateOptions::default())
            .await
            .unwrap();

        assert_eq!(results[0].report.bleu.score, 0.0);
    }

    #[tokio::test]
    async fn test_evaluate_unknown_version_is_missing_artifact() {
        let dir = assert_fs::TempDir::new().unwrap();

        let result = workflow(dir.path())
            .evaluate("v9", &[ProviderKind::Nllb], None, &EvaluateOptions::default())
            .await;

        assert!(matches!(result, Err(SalinError::MissingArtifact(_))));
    }

    #[tokio::test]
    async fn test_dump_test_sources() {
        let dir = assert_fs::TempDir::new().unwrap();
        let workflow = workflow(dir.path());
        SplitStore::new(dir.path())
            .save("v1", SplitMode::Single, &dataset())
            .await
            .unwrap();

        let count = workflow
            .dump_test_sources("v1", dir.path().join("test.tg"))
            .await
            .unwrap();

        assert_eq!(count, 2);
        dir.child("test.tg").assert("Kumain ako.\n\nKumain ako.\n\n");
    }
}
