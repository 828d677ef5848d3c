use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const HEADER: &str = "epoch,train_loss,elapsed_secs";

/// Appends one CSV row per finished epoch. Resumed runs keep appending to the same file.
pub struct MetricsLogger {
    path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("metrics.csv"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops the rows of earlier runs; the next row rewrites the header.
    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Cannot remove metrics file '{}'", self.path.display()))?;
        }
        Ok(())
    }

    pub fn log_epoch(&self, epoch: usize, train_loss: f64, elapsed_secs: f64) -> Result<()> {
        let needs_header = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open metrics file '{}'", self.path.display()))?;
        if needs_header {
            writeln!(file, "{HEADER}")?;
        }
        writeln!(file, "{epoch},{train_loss:.6},{elapsed_secs:.2}")?;
        Ok(())
    }
}
