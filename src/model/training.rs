use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tch::nn::{self, OptimizerConfig};
use tch::Tensor;

use crate::checkpoint::CheckpointManager;
use crate::config::PipelineConfig;
use crate::dataset::CharDataset;
use crate::metrics::MetricsLogger;
use crate::model::lstm::CharLstm;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub buffer_size: usize,
    pub learning_rate: f64,
    pub shuffle_seed: u64,
    /// Ignore existing checkpoints and start from epoch 0.
    pub fresh: bool,
}

pub fn train_single_epoch(
    model: &mut CharLstm,
    opt: &mut nn::Optimizer,
    batches: &[(Tensor, Tensor)],
) -> f64 {
    model.reset_states();
    let mut total_loss = 0.0;
    let mut steps = 0;
    for (xs, ys) in batches {
        let logits = model.forward(xs);
        let loss = model.loss(&logits, ys);
        opt.backward_step(&loss);
        total_loss += loss.double_value(&[]);
        steps += 1;
    }
    if steps > 0 {
        total_loss / steps as f64
    } else {
        0.0
    }
}

/// Trains epochs `start_epoch + 1 ..= options.epochs`, saving a checkpoint and a
/// metrics row after each one. Returns the per-epoch mean losses.
pub fn train_loop(
    vs: &nn::VarStore,
    model: &mut CharLstm,
    dataset: &CharDataset,
    options: &TrainOptions,
    start_epoch: usize,
    checkpoints: &CheckpointManager,
    metrics: &MetricsLogger,
) -> Result<Vec<f64>> {
    let mut opt = nn::Adam::default().build(vs, options.learning_rate)?;
    let mut rng = StdRng::seed_from_u64(options.shuffle_seed.wrapping_add(start_epoch as u64));
    let mut losses = Vec::new();
    let training_start = Instant::now();

    for epoch in (start_epoch + 1)..=options.epochs {
        let epoch_start = Instant::now();
        let batches = dataset.batches(options.batch_size, options.buffer_size, &mut rng, vs.device());
        let epoch_loss = train_single_epoch(model, &mut opt, &batches);
        let elapsed = epoch_start.elapsed().as_secs_f64();

        tracing::info!(
            "Epoch {}/{}: loss = {:.6} ({} batches, {:.2}s)",
            epoch,
            options.epochs,
            epoch_loss,
            batches.len(),
            elapsed
        );
        metrics.log_epoch(epoch, epoch_loss, training_start.elapsed().as_secs_f64())?;
        checkpoints.save(vs, epoch)?;

        if losses.is_empty() {
            let remaining = options.epochs - epoch;
            let estimate = elapsed * remaining as f64;
            tracing::info!(
                "Estimated remaining training time: {:.2} seconds ({:.2} minutes) for {} epochs.",
                estimate,
                estimate / 60.0,
                remaining
            );
        }
        losses.push(epoch_loss);
    }

    tracing::info!(
        "Training completed in {:.2} seconds for {} epochs.",
        training_start.elapsed().as_secs_f64(),
        losses.len()
    );
    Ok(losses)
}

/// Resumes from the latest checkpoint (unless `fresh`) and trains up to the epoch total.
/// `snapshot` is written next to the weights once they are known to fit the model.
pub fn train_model(
    vs: &mut nn::VarStore,
    model: &mut CharLstm,
    dataset: &CharDataset,
    options: &TrainOptions,
    checkpoints: &CheckpointManager,
    metrics: &MetricsLogger,
    snapshot: Option<&PipelineConfig>,
) -> Result<Vec<f64>> {
    if dataset.len() < options.batch_size || options.batch_size == 0 {
        bail!(
            "{} windows of {} characters cannot fill one batch of {}",
            dataset.len(),
            dataset.seq_len() + 1,
            options.batch_size
        );
    }

    let start_epoch = if options.fresh {
        checkpoints.clear()?;
        metrics.reset()?;
        0
    } else {
        checkpoints
            .restore(vs)
            .context("Checkpoint does not fit this model (embedding or lstm_units changed), use --fresh")?
            .unwrap_or(0)
    };
    if let Some(cfg) = snapshot {
        checkpoints.save_config(cfg)?;
    }
    if start_epoch >= options.epochs {
        tracing::info!(
            "checkpoint already at epoch {}, nothing to train (epochs = {})",
            start_epoch,
            options.epochs
        );
        return Ok(Vec::new());
    }
    if start_epoch > 0 {
        tracing::info!("resuming training after epoch {}", start_epoch);
    }

    train_loop(vs, model, dataset, options, start_epoch, checkpoints, metrics)
}
