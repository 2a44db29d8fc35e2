//! Training configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SeqGanError};
use crate::model::{DiscriminatorConfig, GeneratorConfig};

/// All knobs for pretraining and the adversarial phase, loadable from a
/// JSON file. Unset fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Vocabulary size (token ids are `0..vocab_size`).
    pub vocab_size: usize,
    /// Maximum (padded) sequence length.
    pub max_len: usize,
    /// Padding token id; masked out of every loss.
    pub pad_idx: u32,
    /// Token fed to the generator at decoding step 0.
    pub start_idx: u32,
    /// Optional end-of-sequence token id.
    pub eos_idx: Option<u32>,
    /// Embedding dimension for both models.
    pub embed_dim: usize,
    /// GRU hidden dimension for both models.
    pub hidden_dim: usize,
    /// Sequences per batch.
    pub batch_size: usize,
    /// Adam learning rate.
    pub learning_rate: f32,
    /// Epochs of generator MLE pretraining.
    pub gen_epochs: usize,
    /// Epochs of discriminator pretraining.
    pub dis_epochs: usize,
    /// Epochs of adversarial training.
    pub n_epochs: usize,
    /// Monte-Carlo rollouts per prefix for reward estimation.
    pub num_rollouts: usize,
    /// Discriminator steps per generator step in the adversarial loop.
    pub dis_steps_per_gen: usize,
    /// Weight of the teacher-forcing MLE term mixed into generator
    /// updates; 0 disables mixing.
    pub mle_weight: f32,
    /// Label smoothing for the discriminator's real targets.
    pub label_smoothing: f32,
    /// Global gradient-norm clip; `None` disables clipping.
    pub max_grad_norm: Option<f32>,
    /// Subtract a running-mean baseline from rewards.
    pub use_baseline: bool,
    /// Clamp rewards into `[eps, 1-eps]` before use.
    pub reward_clamp_eps: f32,
    /// Seed for weight init, shuffling, and sampling.
    pub seed: u64,
    /// Best validation loss seen so far; threaded through the epoch
    /// driver, mutated as training progresses.
    pub best_valid_loss: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            vocab_size: 5000,
            max_len: 20,
            pad_idx: 0,
            start_idx: 1,
            eos_idx: None,
            embed_dim: 32,
            hidden_dim: 64,
            batch_size: 64,
            learning_rate: 1e-3,
            gen_epochs: 10,
            dis_epochs: 3,
            n_epochs: 10,
            num_rollouts: 8,
            dis_steps_per_gen: 1,
            mle_weight: 0.5,
            label_smoothing: 0.0,
            max_grad_norm: Some(5.0),
            use_baseline: true,
            reward_clamp_eps: 1e-4,
            seed: 42,
            best_valid_loss: f32::INFINITY,
        }
    }
}

impl TrainConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SeqGanError::io(format!("reading config {}", path.display()), e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| SeqGanError::Serialization {
            message: format!("config {}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        fn fail(field: &str, message: impl Into<String>) -> Result<()> {
            Err(SeqGanError::Config {
                field: field.into(),
                message: message.into(),
            })
        }

        if self.vocab_size < 2 {
            return fail("vocab_size", "must be at least 2");
        }
        if self.pad_idx as usize >= self.vocab_size {
            return fail("pad_idx", "must lie inside the vocabulary");
        }
        if self.start_idx as usize >= self.vocab_size {
            return fail("start_idx", "must lie inside the vocabulary");
        }
        if let Some(eos) = self.eos_idx {
            if eos as usize >= self.vocab_size {
                return fail("eos_idx", "must lie inside the vocabulary");
            }
            if eos == self.pad_idx {
                return fail("eos_idx", "must differ from pad_idx");
            }
        }
        if self.max_len == 0 {
            return fail("max_len", "must be positive");
        }
        if self.embed_dim == 0 || self.hidden_dim == 0 {
            return fail("embed_dim/hidden_dim", "must be positive");
        }
        if self.batch_size == 0 {
            return fail("batch_size", "must be positive");
        }
        if !(self.learning_rate > 0.0) {
            return fail("learning_rate", "must be positive");
        }
        if self.num_rollouts == 0 {
            return fail("num_rollouts", "must be at least 1");
        }
        if self.dis_steps_per_gen == 0 {
            return fail("dis_steps_per_gen", "must be at least 1");
        }
        if self.mle_weight < 0.0 {
            return fail("mle_weight", "must be non-negative");
        }
        if !(0.0..0.5).contains(&self.label_smoothing) {
            return fail("label_smoothing", "must be in [0, 0.5)");
        }
        if !(self.reward_clamp_eps > 0.0 && self.reward_clamp_eps < 0.5) {
            return fail("reward_clamp_eps", "must be in (0, 0.5)");
        }
        Ok(())
    }

    /// The generator architecture implied by this configuration.
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            vocab_size: self.vocab_size,
            embed_dim: self.embed_dim,
            hidden_dim: self.hidden_dim,
            max_len: self.max_len,
            pad_idx: self.pad_idx,
            start_idx: self.start_idx,
            eos_idx: self.eos_idx,
        }
    }

    /// The discriminator architecture implied by this configuration.
    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig {
            vocab_size: self.vocab_size,
            embed_dim: self.embed_dim,
            hidden_dim: self.hidden_dim,
        }
    }
}
