use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::embedding::word2vec::Word2VecConfig;

/// Every knob of the pipeline. Missing JSON fields fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub raw_text: String,
    pub corpus: String,
    pub embedding_file: String,
    pub checkpoint_dir: String,

    pub word2vec: Word2VecConfig,

    pub seq_len: usize,
    pub batch_size: usize,
    /// Windows held in the shuffle buffer.
    pub buffer_size: usize,
    pub lstm_units: i64,
    /// Total epochs; resumed runs stop once this many are done.
    pub epochs: usize,
    pub learning_rate: f64,
    pub keep_checkpoints: usize,
    pub shuffle_seed: u64,

    pub seed_text: String,
    pub gen_length: usize,
    pub sample_seed: Option<i64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data"),
            raw_text: "text_1.txt".into(),
            corpus: "c_chat_char.txt".into(),
            embedding_file: "word2vec_256.json".into(),
            checkpoint_dir: "training_checkpoints".into(),
            word2vec: Word2VecConfig::default(),
            seq_len: 30,
            batch_size: 32,
            buffer_size: 20_000,
            lstm_units: 768,
            epochs: 50,
            learning_rate: 1e-3,
            keep_checkpoints: 5,
            shuffle_seed: 42,
            seed_text: "爽啦".into(),
            gen_length: 20,
            sample_seed: None,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config, or returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config '{}'", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Malformed config '{}'", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn raw_text_path(&self) -> PathBuf {
        self.base_dir.join(&self.raw_text)
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.base_dir.join(&self.corpus)
    }

    pub fn embedding_path(&self) -> PathBuf {
        self.base_dir.join(&self.embedding_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.base_dir.join(&self.checkpoint_dir)
    }
}
