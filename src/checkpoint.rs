// Checkpoint directory layout:
//   ckpt_epoch_{N}.ot   weights after epoch N (the newest `keep` are retained)
//   checkpoint.json     pointer to the latest weights
//   config.json         pipeline config the weights were trained with

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tch::nn::VarStore;

use crate::config::PipelineConfig;

const POINTER_FILE: &str = "checkpoint.json";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LatestPointer {
    epoch: usize,
    file: String,
}

pub struct CheckpointManager {
    dir: PathBuf,
    keep: usize,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self {
            dir,
            keep: keep.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn weights_file(epoch: usize) -> String {
        format!("ckpt_epoch_{epoch}.ot")
    }

    pub fn save(&self, vs: &VarStore, epoch: usize) -> Result<PathBuf> {
        let file = Self::weights_file(epoch);
        let path = self.dir.join(&file);
        vs.save(&path)
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let pointer = LatestPointer { epoch, file };
        fs::write(
            self.dir.join(POINTER_FILE),
            serde_json::to_string_pretty(&pointer)?,
        )
        .with_context(|| format!("Failed to write {POINTER_FILE}"))?;

        self.prune()?;
        tracing::debug!("saved checkpoint: epoch {}", epoch);
        Ok(path)
    }

    /// Epoch and path of the newest checkpoint, `None` before the first save.
    pub fn latest(&self) -> Result<Option<(usize, PathBuf)>> {
        let pointer_path = self.dir.join(POINTER_FILE);
        if !pointer_path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&pointer_path)
            .with_context(|| format!("Cannot read '{}'", pointer_path.display()))?;
        let pointer: LatestPointer = serde_json::from_str(&json)
            .with_context(|| format!("Malformed '{}'", pointer_path.display()))?;
        let path = self.dir.join(pointer.file);
        if !path.exists() {
            tracing::warn!(
                "'{}' points at missing weights '{}'",
                pointer_path.display(),
                path.display()
            );
            return Ok(None);
        }
        Ok(Some((pointer.epoch, path)))
    }

    /// Loads the newest weights into `vs`. Returns the epoch they were saved at.
    pub fn restore(&self, vs: &mut VarStore) -> Result<Option<usize>> {
        match self.latest()? {
            Some((epoch, path)) => {
                tracing::info!("latest checkpoint: {}", path.display());
                vs.load(&path)
                    .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
                Ok(Some(epoch))
            }
            None => {
                tracing::info!("latest checkpoint: none");
                Ok(None)
            }
        }
    }

    /// Removes all weights and the pointer. The config snapshot and `metrics.csv` are
    /// left to the caller.
    pub fn clear(&self) -> Result<()> {
        for (_, path) in self.saved_epochs()? {
            fs::remove_file(&path)
                .with_context(|| format!("Cannot remove '{}'", path.display()))?;
        }
        let pointer = self.dir.join(POINTER_FILE);
        if pointer.exists() {
            fs::remove_file(&pointer)?;
        }
        Ok(())
    }

    pub fn save_config(&self, cfg: &PipelineConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<PipelineConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Run 'train' before 'generate'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn saved_epochs(&self) -> Result<Vec<(usize, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let epoch = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("ckpt_epoch_"))
                .and_then(|n| n.strip_suffix(".ot"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(epoch) = epoch {
                found.push((epoch, path));
            }
        }
        found.sort_by_key(|(epoch, _)| *epoch);
        Ok(found)
    }

    fn prune(&self) -> Result<()> {
        let saved = self.saved_epochs()?;
        let excess = saved.len().saturating_sub(self.keep);
        for (epoch, path) in saved.into_iter().take(excess) {
            fs::remove_file(&path)
                .with_context(|| format!("Cannot prune '{}'", path.display()))?;
            tracing::debug!("pruned checkpoint: epoch {}", epoch);
        }
        Ok(())
    }
}
