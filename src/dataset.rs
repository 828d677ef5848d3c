use anyhow::{Context, Result};
use rand::Rng;
use std::fs;
use std::path::Path;
use tch::{Device, Tensor};

/// Reads the whole raw text, dropping a leading UTF-8 byte order mark.
/// `\r\n` and lone `\r` line endings become `\n`, as in the segmented corpus.
pub fn read_text(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read training text '{}'", path.display()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Consecutive `seq_len + 1` windows of ids. Each window gives an input
/// (`w[..seq_len]`) and a target shifted by one (`w[1..]`).
pub struct CharDataset {
    windows: Vec<Vec<i64>>,
    seq_len: usize,
}

impl CharDataset {
    pub fn new(ids: &[i64], seq_len: usize) -> Self {
        let windows = if seq_len == 0 {
            Vec::new()
        } else {
            ids.chunks_exact(seq_len + 1).map(<[i64]>::to_vec).collect()
        };
        Self { windows, seq_len }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn split_input_target(window: &[i64]) -> (&[i64], &[i64]) {
        (&window[..window.len() - 1], &window[1..])
    }

    /// Window order after a bounded shuffle: a buffer of `buffer_size` windows is
    /// filled in order and each output is drawn uniformly from it.
    pub fn shuffled_order<R: Rng>(&self, buffer_size: usize, rng: &mut R) -> Vec<usize> {
        let buffer_size = buffer_size.max(1);
        let mut upcoming = 0..self.windows.len();
        let mut buffer: Vec<usize> = upcoming.by_ref().take(buffer_size).collect();
        let mut order = Vec::with_capacity(self.windows.len());
        while !buffer.is_empty() {
            let pick = rng.gen_range(0..buffer.len());
            order.push(buffer[pick]);
            match upcoming.next() {
                Some(next) => buffer[pick] = next,
                None => {
                    buffer.swap_remove(pick);
                }
            }
        }
        order
    }

    /// Shuffled `(input, target)` batches of shape `[batch_size, seq_len]`;
    /// a trailing partial batch is dropped.
    pub fn batches<R: Rng>(
        &self,
        batch_size: usize,
        buffer_size: usize,
        rng: &mut R,
        device: Device,
    ) -> Vec<(Tensor, Tensor)> {
        if batch_size == 0 {
            return Vec::new();
        }
        let order = self.shuffled_order(buffer_size, rng);
        order
            .chunks_exact(batch_size)
            .map(|chunk| {
                let mut xs = Vec::with_capacity(batch_size * self.seq_len);
                let mut ys = Vec::with_capacity(batch_size * self.seq_len);
                for &i in chunk {
                    let (input, target) = Self::split_input_target(&self.windows[i]);
                    xs.extend_from_slice(input);
                    ys.extend_from_slice(target);
                }
                let shape = [batch_size as i64, self.seq_len as i64];
                (
                    Tensor::of_slice(&xs).view(shape).to_device(device),
                    Tensor::of_slice(&ys).view(shape).to_device(device),
                )
            })
            .collect()
    }
}
