//! Append-only training record.
//!
//! One entry per epoch of `{epoch, train_loss, valid_loss, lr}`, with
//! perplexity columns derived at run end and the total wall-clock time,
//! serialized as a flat JSON object of parallel arrays.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SeqGanError};

/// Perplexity of a mean cross-entropy loss.
pub fn perplexity(loss: f32) -> f32 {
    loss.exp()
}

/// Per-epoch metric log for one training phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainRecord {
    pub epoch: Vec<usize>,
    pub train_loss: Vec<f32>,
    pub valid_loss: Vec<f32>,
    pub lr: Vec<f32>,
    pub train_ppl: Vec<f32>,
    pub valid_ppl: Vec<f32>,
    pub train_time: Vec<String>,
}

impl TrainRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch's metrics.
    pub fn push_epoch(&mut self, epoch: usize, train_loss: f32, valid_loss: f32, lr: f32) {
        self.epoch.push(epoch);
        self.train_loss.push(train_loss);
        self.valid_loss.push(valid_loss);
        self.lr.push(lr);
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    /// Derive the perplexity columns and stamp the total training time.
    pub fn finalize(&mut self, elapsed: Duration) {
        self.train_ppl = self
            .train_loss
            .iter()
            .map(|&loss| round2(perplexity(loss)))
            .collect();
        self.valid_ppl = self
            .valid_loss
            .iter()
            .map(|&loss| round2(perplexity(loss)))
            .collect();

        let (mins, secs) = mins_secs(elapsed);
        self.train_time.push(format!("{mins}min {secs}sec"));
    }

    /// Serialize the record to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SeqGanError::io(format!("creating {}", parent.display()), e))?;
        }
        let data = serde_json::to_string(self).map_err(|e| SeqGanError::Serialization {
            message: format!("record serialization failed: {e}"),
        })?;
        std::fs::write(path, data)
            .map_err(|e| SeqGanError::io(format!("writing record {}", path.display()), e))
    }
}

/// Split a duration into whole minutes and leftover seconds.
pub fn mins_secs(elapsed: Duration) -> (u64, u64) {
    let total = elapsed.as_secs();
    (total / 60, total % 60)
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
