use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::huffman::{build_codes, HuffmanCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Word2VecConfig {
    pub size: usize,
    pub window: usize,
    pub min_count: u64,
    pub epochs: usize,
    pub alpha: f32,
    pub min_alpha: f32,
    /// Downsampling threshold for frequent tokens, 0 disables it.
    pub sample: f64,
    /// Hierarchical softmax over a Huffman tree.
    pub hs: bool,
    /// Noise words per positive pair, 0 disables negative sampling.
    pub negative: usize,
    pub seed: u64,
}

impl Default for Word2VecConfig {
    fn default() -> Self {
        Self {
            size: 256,
            window: 5,
            min_count: 15,
            epochs: 7,
            alpha: 0.025,
            min_alpha: 0.0001,
            sample: 1e-3,
            hs: true,
            negative: 5,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub token: String,
    pub count: u64,
    pub vector: Vec<f32>,
}

/// Skip-gram embedding: one vector per retained token, sorted by descending count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word2Vec {
    config: Word2VecConfig,
    entries: Vec<Entry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

const NEG_TABLE_DOMAIN: f64 = 2_147_483_647.0;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-20.0, 20.0)).exp())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f32, x: &[f32], y: &mut [f32]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

impl Word2Vec {
    /// Reads a whitespace-delimited corpus, one sentence per line.
    pub fn load_sentences(path: &Path) -> Result<Vec<Vec<String>>> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read corpus '{}'", path.display()))?;
        let re = Regex::new(r"\S+")?;
        Ok(text
            .lines()
            .map(|line| re.find_iter(line).map(|m| m.as_str().to_string()).collect())
            .collect())
    }

    pub fn train(sentences: &[Vec<String>], config: &Word2VecConfig) -> Result<Self> {
        if config.size == 0 {
            bail!("embedding size must be positive");
        }

        // count and first-seen position, equal counts keep corpus order
        let mut counts: HashMap<&str, (u64, usize)> = HashMap::new();
        for (seen, token) in sentences.iter().flatten().enumerate() {
            counts.entry(token.as_str()).or_insert((0, seen)).0 += 1;
        }
        let mut ranked: Vec<(&str, u64, usize)> = counts
            .into_iter()
            .filter(|&(_, (c, _))| c >= config.min_count)
            .map(|(t, (c, first))| (t, c, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
        let sorted: Vec<(&str, u64)> = ranked.into_iter().map(|(t, c, _)| (t, c)).collect();
        if sorted.is_empty() {
            bail!(
                "no token reaches min_count={}; the corpus is too small",
                config.min_count
            );
        }

        let index: HashMap<String, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, (t, _))| (t.to_string(), i))
            .collect();
        let counts: Vec<u64> = sorted.iter().map(|&(_, c)| c).collect();
        let retained: u64 = counts.iter().sum();
        tracing::info!(
            "word2vec vocabulary: {} tokens, {} retained occurrences",
            counts.len(),
            retained
        );

        let corpus: Vec<Vec<usize>> = sentences
            .iter()
            .map(|s| s.iter().filter_map(|t| index.get(t).copied()).collect())
            .collect();

        let mut trainer = SkipGram::new(&counts, config);
        trainer.run(&corpus, retained);

        let entries = sorted
            .iter()
            .zip(trainer.syn0.chunks(config.size))
            .map(|(&(token, count), v)| Entry {
                token: token.to_string(),
                count,
                vector: v.to_vec(),
            })
            .collect();
        Ok(Self {
            config: config.clone(),
            entries,
            index,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write embedding to '{}'", path.display()))?;
        tracing::debug!("saved embedding model to '{}'", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| {
            format!(
                "Cannot read embedding '{}'. Run 'embed' first.",
                path.display()
            )
        })?;
        let mut model: Self = serde_json::from_str(&json)
            .with_context(|| format!("Malformed embedding file '{}'", path.display()))?;
        if model.config.size == 0 {
            bail!("embedding '{}' has size 0", path.display());
        }
        if let Some(bad) = model.entries.iter().find(|e| e.vector.len() != model.config.size) {
            bail!(
                "token {:?} has a {}-wide vector, expected {}",
                bad.token,
                bad.vector.len(),
                model.config.size
            );
        }
        model.index = model
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.token.clone(), i))
            .collect();
        Ok(model)
    }

    pub fn dim(&self) -> usize {
        self.config.size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in descending count order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn vector(&self, token: &str) -> Option<&[f32]> {
        self.index.get(token).map(|&i| self.entries[i].vector.as_slice())
    }

    pub fn count(&self, token: &str) -> Option<u64> {
        self.index.get(token).map(|&i| self.entries[i].count)
    }

    /// Nearest tokens to `token` by cosine similarity, best first.
    pub fn most_similar(&self, token: &str, topn: usize) -> Option<Vec<(String, f32)>> {
        let query = self.vector(token)?;
        let qn = dot(query, query).sqrt();
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .filter(|e| e.token != token)
            .map(|e| {
                let norm = qn * dot(&e.vector, &e.vector).sqrt();
                let sim = if norm > 0.0 { dot(query, &e.vector) / norm } else { 0.0 };
                (e.token.clone(), sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(topn);
        Some(scored)
    }
}

struct SkipGram<'a> {
    config: &'a Word2VecConfig,
    counts: &'a [u64],
    syn0: Vec<f32>,
    syn1: Vec<f32>,
    syn1neg: Vec<f32>,
    codes: Vec<HuffmanCode>,
    cum_table: Vec<u32>,
    rng: StdRng,
}

impl<'a> SkipGram<'a> {
    fn new(counts: &'a [u64], config: &'a Word2VecConfig) -> Self {
        let n = counts.len();
        let dim = config.size;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let syn0 = (0..n * dim)
            .map(|_| (rng.gen::<f32>() - 0.5) / dim as f32)
            .collect();
        let codes = if config.hs { build_codes(counts) } else { Vec::new() };
        let syn1 = if config.hs { vec![0.0; n * dim] } else { Vec::new() };
        let syn1neg = if config.negative > 0 { vec![0.0; n * dim] } else { Vec::new() };
        let cum_table = if config.negative > 0 { Self::cum_table(counts) } else { Vec::new() };
        Self {
            config,
            counts,
            syn0,
            syn1,
            syn1neg,
            codes,
            cum_table,
            rng,
        }
    }

    /// Cumulative unigram^0.75 distribution scaled to `NEG_TABLE_DOMAIN`.
    fn cum_table(counts: &[u64]) -> Vec<u32> {
        let total: f64 = counts.iter().map(|&c| (c as f64).powf(0.75)).sum();
        let mut acc = 0.0;
        counts
            .iter()
            .map(|&c| {
                acc += (c as f64).powf(0.75);
                (acc / total * NEG_TABLE_DOMAIN).round() as u32
            })
            .collect()
    }

    fn keep_probabilities(&self, retained: u64) -> Vec<f64> {
        if self.config.sample <= 0.0 {
            return vec![1.0; self.counts.len()];
        }
        let threshold = self.config.sample * retained as f64;
        self.counts
            .iter()
            .map(|&c| {
                let c = c as f64;
                (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0)
            })
            .collect()
    }

    fn run(&mut self, corpus: &[Vec<usize>], retained: u64) {
        let keep = self.keep_probabilities(retained);
        let total_words = retained as f64 * self.config.epochs as f64;
        let mut processed = 0u64;

        for epoch in 0..self.config.epochs {
            let mut pairs = 0usize;
            for sentence in corpus {
                let alpha = {
                    let progress = (processed as f64 / total_words).min(1.0) as f32;
                    (self.config.alpha - (self.config.alpha - self.config.min_alpha) * progress)
                        .max(self.config.min_alpha)
                };
                processed += sentence.len() as u64;

                let kept: Vec<usize> = sentence
                    .iter()
                    .copied()
                    .filter(|&w| keep[w] >= 1.0 || keep[w] >= self.rng.gen::<f64>())
                    .collect();
                for (pos, &word) in kept.iter().enumerate() {
                    let reduced = self.rng.gen_range(0..self.config.window.max(1));
                    let span = self.config.window.saturating_sub(reduced);
                    let start = pos.saturating_sub(span);
                    let end = (pos + span + 1).min(kept.len());
                    for (ctx_pos, &context) in kept.iter().enumerate().take(end).skip(start) {
                        if ctx_pos != pos {
                            self.train_pair(word, context, alpha);
                            pairs += 1;
                        }
                    }
                }
            }
            tracing::debug!("word2vec epoch {}: {} pairs", epoch + 1, pairs);
        }
    }

    /// Updates the input vector of `context` to predict `word`.
    fn train_pair(&mut self, word: usize, context: usize, alpha: f32) {
        let dim = self.config.size;
        let l1 = context * dim..(context + 1) * dim;
        let mut neu1e = vec![0.0f32; dim];

        if self.config.hs {
            let code = &self.codes[word];
            for (&point, &bit) in code.points.iter().zip(&code.codes) {
                let row = point * dim..(point + 1) * dim;
                let f = sigmoid(dot(&self.syn0[l1.clone()], &self.syn1[row.clone()]));
                let g = (1.0 - bit as f32 - f) * alpha;
                axpy(g, &self.syn1[row.clone()], &mut neu1e);
                axpy(g, &self.syn0[l1.clone()], &mut self.syn1[row]);
            }
        }

        if self.config.negative > 0 {
            let domain = *self.cum_table.last().unwrap_or(&0);
            let mut targets = vec![(word, 1.0f32)];
            while targets.len() <= self.config.negative && domain > 0 {
                let draw = self.rng.gen_range(0..domain);
                let noise = self.cum_table.partition_point(|&v| v <= draw);
                if noise != word && noise < self.counts.len() {
                    targets.push((noise, 0.0));
                } else if self.counts.len() == 1 {
                    break;
                }
            }
            for (target, label) in targets {
                let row = target * dim..(target + 1) * dim;
                let f = sigmoid(dot(&self.syn0[l1.clone()], &self.syn1neg[row.clone()]));
                let g = (label - f) * alpha;
                axpy(g, &self.syn1neg[row.clone()], &mut neu1e);
                axpy(g, &self.syn0[l1.clone()], &mut self.syn1neg[row]);
            }
        }

        axpy(1.0, &neu1e, &mut self.syn0[l1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn corpus() -> Vec<Vec<String>> {
        let lines = [
            "a b c a b c a b c",
            "x y z x y z x y z",
            "a b c a b c",
            "x y z x y z",
            "a b a b q",
        ];
        lines
            .iter()
            .map(|l| l.split(' ').map(str::to_string).collect())
            .collect()
    }

    fn small_config() -> Word2VecConfig {
        Word2VecConfig {
            size: 8,
            window: 2,
            min_count: 2,
            epochs: 20,
            sample: 0.0,
            ..Word2VecConfig::default()
        }
    }

    #[test]
    fn vocabulary_is_sorted_by_count_and_filtered() {
        let model = Word2Vec::train(&corpus(), &small_config()).unwrap();
        let counts: Vec<u64> = model.entries().iter().map(|e| e.count).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(model.entries()[0].token, "a");
        assert_eq!(model.count("a"), Some(7));
        assert!(model.vector("q").is_none(), "below min_count");
        assert_eq!(model.len(), 6);
        assert!(model.entries().iter().all(|e| e.vector.len() == 8));
    }

    #[test]
    fn equal_counts_keep_first_occurrence_order() {
        let sentences: Vec<Vec<String>> = ["啦 爽 啦", "爽 a"]
            .iter()
            .map(|l| l.split(' ').map(str::to_string).collect())
            .collect();
        let config = Word2VecConfig {
            min_count: 1,
            ..small_config()
        };
        let model = Word2Vec::train(&sentences, &config).unwrap();
        let tokens: Vec<&str> = model.entries().iter().map(|e| e.token.as_str()).collect();
        assert_eq!(tokens, vec!["啦", "爽", "a"]);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let a = Word2Vec::train(&corpus(), &small_config()).unwrap();
        let b = Word2Vec::train(&corpus(), &small_config()).unwrap();
        assert_eq!(a.entries(), b.entries());
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        let config = Word2VecConfig {
            min_count: 1000,
            ..small_config()
        };
        assert!(Word2Vec::train(&corpus(), &config).is_err());
    }

    #[test]
    fn most_similar_excludes_query_and_ranks_by_cosine() {
        let model = Word2Vec::train(&corpus(), &small_config()).unwrap();
        let hits = model.most_similar("a", 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|(t, _)| t != "a"));
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(model.most_similar("?", 3).is_none());
    }

    #[test]
    fn save_and_load_restore_lookups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w2v.json");
        let model = Word2Vec::train(&corpus(), &small_config()).unwrap();
        model.save(&path).unwrap();

        let loaded = Word2Vec::load(&path).unwrap();
        assert_eq!(loaded.dim(), 8);
        assert_eq!(loaded.vector("y"), model.vector("y"));
        assert_eq!(loaded.count("z"), model.count("z"));
    }

    #[test]
    fn load_rejects_zero_width() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w2v.json");
        fs::write(&path, r#"{"config": {"size": 0}, "entries": []}"#).unwrap();
        assert!(Word2Vec::load(&path).is_err());
    }

    #[test]
    fn load_sentences_splits_on_whitespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.txt");
        fs::write(&path, "你 好\n\na  b\n").unwrap();
        let sentences = Word2Vec::load_sentences(&path).unwrap();
        assert_eq!(
            sentences,
            vec![
                vec!["你".to_string(), "好".to_string()],
                vec![],
                vec!["a".to_string(), "b".to_string()],
            ]
        );
    }

    #[test]
    fn hs_only_and_negative_only_both_train() {
        for (hs, negative) in [(true, 0), (false, 3)] {
            let config = Word2VecConfig {
                hs,
                negative,
                ..small_config()
            };
            let model = Word2Vec::train(&corpus(), &config).unwrap();
            assert!(model.entries().iter().all(|e| e.vector.iter().all(|v| v.is_finite())));
        }
    }
}
