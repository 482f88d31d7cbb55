use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::BlankLinePolicy;
use crate::error::{Result, SalinError};

/// One source sentence and its aligned reference translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualPair {
    pub id: usize,
    pub source_text: String,
    pub target_text: String,
}

/// Cleaned, id-numbered pairs read from two line-aligned files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub pairs: Vec<BilingualPair>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn sources(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.source_text.clone()).collect()
    }

    pub fn references(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.target_text.clone()).collect()
    }

    /// Read both files and clean them into a corpus
    pub async fn read_parallel<P: AsRef<Path>>(
        source_path: P,
        target_path: P,
        policy: BlankLinePolicy,
    ) -> Result<Self> {
        let source_path = source_path.as_ref();
        let target_path = target_path.as_ref();
        info!(
            "Reading parallel corpus: {} / {}",
            source_path.display(),
            target_path.display()
        );

        let source = read_lines(source_path).await?;
        let target = read_lines(target_path).await?;

        Preprocessor::new(policy).clean(source, target)
    }
}

/// Cleans raw line-aligned bilingual text.
pub struct Preprocessor {
    policy: BlankLinePolicy,
}

impl Preprocessor {
    pub fn new(policy: BlankLinePolicy) -> Self {
        Self { policy }
    }

    /// Strip newlines, drop blank lines and untranslated pairs, then number the survivors.
    pub fn clean(&self, source: Vec<String>, target: Vec<String>) -> Result<Corpus> {
        let raw_count = (source.len(), target.len());

        let source: Vec<String> = source.into_iter().map(strip_newline).collect();
        let target: Vec<String> = target.into_iter().map(strip_newline).collect();

        let (source, target): (Vec<String>, Vec<String>) = match self.policy {
            BlankLinePolicy::Paired => {
                // Files may differ only by trailing blank lines
                let (source, target) = if source.len() != target.len() {
                    (trim_trailing_blank(source), trim_trailing_blank(target))
                } else {
                    (source, target)
                };
                ensure_aligned(&source, &target)?;
                source
                    .into_iter()
                    .zip(target)
                    .filter(|(s, t)| !s.is_empty() && !t.is_empty())
                    .unzip()
            }
            BlankLinePolicy::Independent => (
                source.into_iter().filter(|s| !s.is_empty()).collect(),
                target.into_iter().filter(|t| !t.is_empty()).collect(),
            ),
        };

        ensure_aligned(&source, &target)?;

        // Sentences left untranslated in the target file
        let identical: HashSet<usize> = source
            .iter()
            .zip(&target)
            .enumerate()
            .filter(|(_, (s, t))| s == t)
            .map(|(i, _)| i)
            .collect();

        if !identical.is_empty() {
            debug!("Dropping {} self-identical pairs", identical.len());
        }

        let source: Vec<String> = source
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !identical.contains(i))
            .map(|(_, s)| s)
            .collect();
        let target: Vec<String> = target
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !identical.contains(i))
            .map(|(_, t)| t)
            .collect();

        ensure_aligned(&source, &target)?;

        let pairs: Vec<BilingualPair> = source
            .into_iter()
            .zip(target)
            .enumerate()
            .map(|(id, (source_text, target_text))| BilingualPair {
                id,
                source_text,
                target_text,
            })
            .collect();

        info!(
            "Cleaned corpus: {} pairs kept from {}/{} raw lines",
            pairs.len(),
            raw_count.0,
            raw_count.1
        );

        Ok(Corpus { pairs })
    }
}

fn strip_newline(line: String) -> String {
    if line.contains(['\n', '\r']) {
        line.replace(['\n', '\r'], "")
    } else {
        line
    }
}

fn trim_trailing_blank(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn ensure_aligned(source: &[String], target: &[String]) -> Result<()> {
    if source.len() != target.len() {
        return Err(SalinError::Alignment {
            source_lines: source.len(),
            target_lines: target.len(),
        });
    }
    Ok(())
}

async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = read_existing(path).await?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Read a file, reporting a missing one as `MissingArtifact`
pub(crate) async fn read_existing(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(SalinError::MissingArtifact(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Write source sentences one per line, each followed by a blank separator line
pub async fn write_text_dump<P: AsRef<Path>>(sentences: &[String], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut content = String::new();
    for sentence in sentences {
        content.push_str(sentence);
        content.push_str("\n\n");
    }
    tokio::fs::write(path, content).await?;
    info!("Wrote {} sentences to {}", sentences.len(), path.display());
    Ok(())
}

/// Read a predictions file, either one per line or in the dump layout.
///
/// A file with an even number of lines whose every second line is blank is read
/// as a dump and its separator lines are dropped. Any other file keeps every line,
/// so blank lines stand for empty predictions.
pub async fn load_predictions<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let lines: Vec<String> = read_lines(path).await?.into_iter().map(strip_newline).collect();

    let dump_shaped = !lines.is_empty()
        && lines.len() % 2 == 0
        && lines.iter().skip(1).step_by(2).all(|l| l.trim().is_empty());
    let predictions: Vec<String> = if dump_shaped {
        lines.into_iter().step_by(2).collect()
    } else {
        lines
    };
    if predictions.is_empty() {
        warn!("Predictions file {} is empty", path.display());
    }
    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_drops_identical_and_blank_lines() {
        let source = lines(&["Kumain ako.", "Kumain ako.", ""]);
        let target = lines(&["I ate.", "Kumain ako.", ""]);

        let corpus = Preprocessor::new(BlankLinePolicy::Paired).clean(source, target).unwrap();

        assert_eq!(
            corpus.pairs,
            vec![BilingualPair {
                id: 0,
                source_text: "Kumain ako.".to_string(),
                target_text: "I ate.".to_string(),
            }]
        );
    }

    #[test]
    fn test_independent_policy_matches_on_scenario() {
        let source = lines(&["Kumain ako.", "Kumain ako.", ""]);
        let target = lines(&["I ate.", "Kumain ako.", ""]);

        let corpus = Preprocessor::new(BlankLinePolicy::Independent)
            .clean(source, target)
            .unwrap();

        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.pairs[0].target_text, "I ate.");
    }

    #[test]
    fn test_paired_policy_keeps_alignment_with_uneven_blanks() {
        let source = lines(&["Salamat.", "", "Oo."]);
        let target = lines(&["Thanks.", "Hello.", "Yes."]);

        let corpus = Preprocessor::new(BlankLinePolicy::Paired).clean(source, target).unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.pairs[1].source_text, "Oo.");
        assert_eq!(corpus.pairs[1].target_text, "Yes.");
        assert_eq!(corpus.pairs[1].id, 1);
    }

    #[test]
    fn test_independent_policy_fails_on_uneven_blanks() {
        let source = lines(&["Salamat.", "", "Oo."]);
        let target = lines(&["Thanks.", "Hello.", "Yes."]);

        let result = Preprocessor::new(BlankLinePolicy::Independent).clean(source, target);

        assert!(matches!(
            result,
            Err(SalinError::Alignment { source_lines: 2, target_lines: 3 })
        ));
    }

    #[test]
    fn test_paired_policy_rejects_unequal_raw_files() {
        let result = Preprocessor::new(BlankLinePolicy::Paired)
            .clean(lines(&["a", "b"]), lines(&["x"]));
        assert!(matches!(result, Err(SalinError::Alignment { .. })));
    }

    #[test]
    fn test_cleaned_pairs_are_never_identical_or_empty() {
        let source = lines(&["a", "b", "", "c", "d\r", "e"]);
        let target = lines(&["a", "B", "", "C", "d", ""]);

        let corpus = Preprocessor::new(BlankLinePolicy::Paired).clean(source, target).unwrap();

        for (i, pair) in corpus.pairs.iter().enumerate() {
            assert_eq!(pair.id, i);
            assert_ne!(pair.source_text, pair.target_text);
            assert!(!pair.source_text.is_empty());
            assert!(!pair.target_text.is_empty());
        }
        assert_eq!(corpus.len(), 2);
    }

    #[tokio::test]
    async fn test_read_parallel_from_files() {
        let dir = assert_fs::TempDir::new().unwrap();
        let source = dir.child("train.tg");
        let target = dir.child("train.en");
        source.write_str("Kumain ako.\nKumain ako.\n\nSalamat po.\n").unwrap();
        target.write_str("I ate.\nKumain ako.\n\nThank you.\n").unwrap();

        let corpus = Corpus::read_parallel(source.path(), target.path(), BlankLinePolicy::Paired)
            .await
            .unwrap();

        assert_eq!(corpus.sources(), lines(&["Kumain ako.", "Salamat po."]));
        assert_eq!(corpus.references(), lines(&["I ate.", "Thank you."]));
    }

    #[tokio::test]
    async fn test_missing_corpus_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let missing = dir.path().join("missing.tg");

        let result = Corpus::read_parallel(&missing, &missing, BlankLinePolicy::Paired).await;

        assert!(matches!(result, Err(SalinError::MissingArtifact(_))));
    }

    #[test]
    fn test_paired_policy_ignores_trailing_blank_lines() {
        let source = lines(&["a", "b", ""]);
        let target = lines(&["x", "y"]);

        let corpus = Preprocessor::new(BlankLinePolicy::Paired).clean(source, target).unwrap();

        assert_eq!(corpus.references(), lines(&["x", "y"]));
    }

    #[tokio::test]
    async fn test_dump_keeps_empty_predictions() {
        let dir = assert_fs::TempDir::new().unwrap();
        let dump = dir.child("predictions.txt");
        let predictions = lines(&["I ate.", "", "Yes."]);

        write_text_dump(&predictions, dump.path()).await.unwrap();
        let loaded = load_predictions(dump.path()).await.unwrap();

        assert_eq!(loaded, predictions);
    }

    #[tokio::test]
    async fn test_plain_predictions_keep_blank_lines() {
        let dir = assert_fs::TempDir::new().unwrap();
        let file = dir.child("predictions.txt");
        file.write_str("I ate.\n\nYes.\n").unwrap();

        let loaded = load_predictions(file.path()).await.unwrap();

        assert_eq!(loaded, lines(&["I ate.", "", "Yes."]));
    }

    #[tokio::test]
    async fn test_dump_then_load_predictions() {
        let dir = assert_fs::TempDir::new().unwrap();
        let dump = dir.child("test_sources.txt");
        let sentences = lines(&["Kumain ako.", "Salamat po."]);

        write_text_dump(&sentences, dump.path()).await.unwrap();
        dump.assert("Kumain ako.\n\nSalamat po.\n\n");

        let loaded = load_predictions(dump.path()).await.unwrap();
        assert_eq!(loaded, sentences);
    }
}
