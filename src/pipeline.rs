use anyhow::{bail, Context, Result};
use tch::{nn, Device};

use crate::checkpoint::CheckpointManager;
use crate::config::PipelineConfig;
use crate::dataset::{read_text, CharDataset};
use crate::embedding::word2vec::Word2Vec;
use crate::metrics::MetricsLogger;
use crate::model::embedding_matrix::weight_matrix;
use crate::model::generate::generate_seq;
use crate::model::lstm::CharLstm;
use crate::model::training::{train_model, TrainOptions};
use crate::tokenizer::segment::segment_file;
use crate::tokenizer::vocab::Vocab;

pub fn device() -> Device {
    let device = Device::cuda_if_available();
    if matches!(device, Device::Cuda(_)) {
        tracing::info!("Found GPU at: {:?}", device);
    } else {
        tracing::info!("No GPU found, training on CPU");
    }
    device
}

pub fn segment(cfg: &PipelineConfig) -> Result<usize> {
    let (input, output) = (cfg.raw_text_path(), cfg.corpus_path());
    tracing::info!("Segmenting '{}' into '{}'", input.display(), output.display());
    let lines = segment_file(&input, &output)?;
    tracing::info!("Corpus written: {} lines", lines);
    Ok(lines)
}

/// Trains the skip-gram embedding on the segmented corpus and persists it.
/// The returned model is the one reloaded from disk.
pub fn embed(cfg: &PipelineConfig) -> Result<Word2Vec> {
    let sentences = Word2Vec::load_sentences(&cfg.corpus_path())?;
    tracing::info!("Training word2vec on {} sentences", sentences.len());
    let model = Word2Vec::train(&sentences, &cfg.word2vec)?;
    let path = cfg.embedding_path();
    model.save(&path)?;
    tracing::info!("Embedding saved to '{}'", path.display());
    Word2Vec::load(&path)
}

pub fn load_vocab(cfg: &PipelineConfig) -> Result<(Word2Vec, Vocab)> {
    let embedding = Word2Vec::load(&cfg.embedding_path())?;
    if embedding.is_empty() {
        bail!("embedding '{}' has no tokens", cfg.embedding_path().display());
    }
    let vocab = Vocab::from_embedding(&embedding);
    if vocab.is_empty() {
        bail!("embedding '{}' has no single-character tokens", cfg.embedding_path().display());
    }
    tracing::info!("Vocabulary Size: {}", vocab.len());
    Ok((embedding, vocab))
}

fn checkpoints(cfg: &PipelineConfig) -> Result<CheckpointManager> {
    CheckpointManager::new(cfg.checkpoint_path(), cfg.keep_checkpoints)
}

pub fn train(cfg: &PipelineConfig, fresh: bool) -> Result<Vec<f64>> {
    let device = device();
    let (embedding, vocab) = load_vocab(cfg)?;

    let text = read_text(&cfg.raw_text_path())?;
    let ids = vocab.encode(&text);
    let dataset = CharDataset::new(&ids, cfg.seq_len);
    tracing::info!(
        "Dataset: {} characters, {} windows of {}",
        ids.len(),
        dataset.len(),
        cfg.seq_len + 1
    );

    let matrix = weight_matrix(&embedding, &vocab);
    let mut vs = nn::VarStore::new(device);
    let mut model = CharLstm::new(&vs.root(), &matrix, cfg.lstm_units);

    let checkpoints = checkpoints(cfg)?;
    let metrics = MetricsLogger::new(checkpoints.dir());

    let options = TrainOptions {
        epochs: cfg.epochs,
        batch_size: cfg.batch_size,
        buffer_size: cfg.buffer_size,
        learning_rate: cfg.learning_rate,
        shuffle_seed: cfg.shuffle_seed,
        fresh,
    };
    train_model(&mut vs, &mut model, &dataset, &options, &checkpoints, &metrics, Some(cfg))
}

/// Rebuilds the trained network for batch size 1 from the latest checkpoint and samples from it.
pub fn generate(cfg: &PipelineConfig, seed: &str, n_char: usize) -> Result<String> {
    let device = device();
    let checkpoints = checkpoints(cfg)?;
    let trained = checkpoints.load_config()?;
    let (embedding, vocab) = load_vocab(cfg)?;

    let matrix = weight_matrix(&embedding, &vocab);
    let mut vs = nn::VarStore::new(device);
    let mut model = CharLstm::new(&vs.root(), &matrix, trained.lstm_units);
    let epoch = checkpoints
        .restore(&mut vs)
        .context("Checkpoint does not match the current embedding or lstm_units")?;
    if epoch.is_none() {
        bail!(
            "no checkpoint in '{}'. Run 'train' first.",
            checkpoints.dir().display()
        );
    }

    if let Some(s) = cfg.sample_seed {
        tch::manual_seed(s);
    }
    Ok(generate_seq(&mut model, &vocab, seed, n_char, device))
}

pub fn similar(cfg: &PipelineConfig, token: &str, topn: usize) -> Result<Vec<(String, f32)>> {
    let embedding = Word2Vec::load(&cfg.embedding_path())?;
    match embedding.most_similar(token, topn) {
        Some(hits) => Ok(hits),
        None => bail!("'{}' is not in the embedding vocabulary", token),
    }
}

/// Every phase in order: segment, embed, train, generate.
pub fn run(cfg: &PipelineConfig) -> Result<String> {
    segment(cfg)?;
    embed(cfg)?;
    train(cfg, false)?;
    generate(cfg, &cfg.seed_text, cfg.gen_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::word2vec::Word2VecConfig;
    use std::fs;
    use tempfile::tempdir;

    fn config(base: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            base_dir: base.to_path_buf(),
            word2vec: Word2VecConfig {
                size: 6,
                min_count: 2,
                epochs: 2,
                ..Word2VecConfig::default()
            },
            seq_len: 5,
            batch_size: 2,
            buffer_size: 8,
            lstm_units: 8,
            epochs: 2,
            sample_seed: Some(1),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn full_pipeline_produces_text_of_expected_length() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let lines: Vec<&str> = std::iter::repeat("爽啦 今天好棒 哈哈哈").take(40).collect();
        fs::write(cfg.raw_text_path(), lines.join("\n")).unwrap();

        let text = run(&cfg).unwrap();
        assert!(text.starts_with("爽啦"));
        assert_eq!(text.chars().count(), 2 + 20);

        assert!(cfg.corpus_path().exists());
        assert!(cfg.embedding_path().exists());
        assert!(cfg.checkpoint_path().join("metrics.csv").exists());
        let hits = similar(&cfg, "哈", 3).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn changed_lstm_units_leave_the_trained_config_usable() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let lines: Vec<&str> = std::iter::repeat("爽啦 今天好棒 哈哈哈").take(40).collect();
        fs::write(cfg.raw_text_path(), lines.join("\n")).unwrap();
        segment(&cfg).unwrap();
        embed(&cfg).unwrap();
        train(&cfg, false).unwrap();

        let wider = PipelineConfig {
            lstm_units: 12,
            epochs: 3,
            ..cfg.clone()
        };
        assert!(train(&wider, false).is_err());
        let stored = checkpoints(&cfg).unwrap().load_config().unwrap();
        assert_eq!(stored.lstm_units, 8);

        let text = generate(&wider, "爽", 4).unwrap();
        assert_eq!(text.chars().count(), 5);
    }

    #[test]
    fn generate_without_checkpoint_fails() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        assert!(generate(&cfg, "爽", 3).is_err());
    }
}
