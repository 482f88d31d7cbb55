use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{BleuTokenizer, ScoringConfig};

const MAX_NGRAM_ORDER: usize = 4;

// mteval-v13a punctuation rules, applied in order
static RE_SYMBOLS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([\x7B-\x7E\x5B-\x60\x20-\x26\x28-\x2B\x3A-\x40\x2F])").expect("Invalid symbol regex")
});
static RE_PERIOD_COMMA_AFTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^0-9])([\.,])").expect("Invalid punctuation regex"));
static RE_PERIOD_COMMA_BEFORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\.,])([^0-9])").expect("Invalid punctuation regex"));
static RE_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9])(-)").expect("Invalid dash regex"));

/// Corpus-level BLEU in the shape sacreBLEU reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BleuScore {
    pub score: f64,
    pub counts: Vec<u64>,
    pub totals: Vec<u64>,
    pub precisions: Vec<f64>,
    pub bp: f64,
    pub sys_len: u64,
    pub ref_len: u64,
}

/// sacreBLEU-compatible corpus BLEU against a single reference per segment.
#[derive(Debug, Clone)]
pub struct Bleu {
    tokenizer: BleuTokenizer,
    lowercase: bool,
    effective_order: bool,
}

impl Bleu {
    pub fn new(tokenizer: BleuTokenizer, lowercase: bool, effective_order: bool) -> Self {
        Self {
            tokenizer,
            lowercase,
            effective_order,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.tokenizer, config.lowercase, config.effective_order)
    }

    /// Score aligned predictions against references. Callers check equal lengths.
    pub fn corpus_score(&self, predictions: &[String], references: &[String]) -> BleuScore {
        let mut counts = vec![0u64; MAX_NGRAM_ORDER];
        let mut totals = vec![0u64; MAX_NGRAM_ORDER];
        let mut sys_len = 0u64;
        let mut ref_len = 0u64;

        for (prediction, reference) in predictions.iter().zip(references) {
            let hyp = self.tokenize(prediction);
            let refs = self.tokenize(reference);
            sys_len += hyp.len() as u64;
            ref_len += refs.len() as u64;

            for n in 1..=MAX_NGRAM_ORDER {
                let hyp_ngrams = ngrams(&hyp, n);
                let ref_ngrams = ngrams(&refs, n);
                let matched: usize = hyp_ngrams
                    .iter()
                    .map(|(gram, &count)| count.min(ref_ngrams.get(gram).copied().unwrap_or(0)))
                    .sum();
                counts[n - 1] += matched as u64;
                totals[n - 1] += hyp.len().saturating_sub(n - 1) as u64;
            }
        }

        self.compute(counts, totals, sys_len, ref_len)
    }

    fn compute(&self, counts: Vec<u64>, totals: Vec<u64>, sys_len: u64, ref_len: u64) -> BleuScore {
        let mut precisions = vec![0.0; MAX_NGRAM_ORDER];

        let bp = if sys_len == 0 {
            0.0
        } else if sys_len < ref_len {
            (1.0 - ref_len as f64 / sys_len as f64).exp()
        } else {
            1.0
        };

        // exp smoothing: halve the pseudo-precision for every order without a match
        let mut smooth = 1.0;
        let mut eff_order = MAX_NGRAM_ORDER;
        for n in 1..=MAX_NGRAM_ORDER {
            if totals[n - 1] == 0 {
                if self.effective_order {
                    eff_order = n - 1;
                }
                break;
            }
            if counts[n - 1] == 0 {
                smooth *= 2.0;
                precisions[n - 1] = 100.0 / (smooth * totals[n - 1] as f64);
            } else {
                precisions[n - 1] = 100.0 * counts[n - 1] as f64 / totals[n - 1] as f64;
            }
        }

        let used = &precisions[..eff_order];
        let score = if sys_len == 0 || eff_order == 0 || used.iter().any(|&p| p <= 0.0) {
            0.0
        } else {
            let log_sum: f64 = used.iter().map(|p| p.ln()).sum();
            bp * (log_sum / eff_order as f64).exp()
        };

        BleuScore {
            score,
            counts,
            totals,
            precisions,
            bp,
            sys_len,
            ref_len,
        }
    }

    fn tokenize(&self, line: &str) -> Vec<String> {
        let line = if self.lowercase {
            line.to_lowercase()
        } else {
            line.to_string()
        };
        let line = match self.tokenizer {
            BleuTokenizer::Mteval13a => tokenize_13a(&line),
            BleuTokenizer::Whitespace => line,
        };
        line.split_whitespace().map(str::to_string).collect()
    }
}

/// mteval-v13a tokenization
pub fn tokenize_13a(line: &str) -> String {
    let mut line = line
        .replace("<skipped>", "")
        .replace("-\n", "")
        .replace('\n', " ");
    if line.contains('&') {
        line = line
            .replace("&quot;", "\"")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">");
    }

    let line = format!(" {} ", line);
    let line = RE_SYMBOLS.replace_all(&line, " ${1} ");
    let line = RE_PERIOD_COMMA_AFTER.replace_all(&line, "${1} ${2} ");
    let line = RE_PERIOD_COMMA_BEFORE.replace_all(&line, " ${1} ${2}");
    let line = RE_DASH.replace_all(&line, "${1} ${2} ");

    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut grams = HashMap::new();
    if tokens.len() < n {
        return grams;
    }
    for window in tokens.windows(n) {
        *grams.entry(window).or_insert(0) += 1;
    }
    grams
}
