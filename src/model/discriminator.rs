//! Discriminator: real-vs-generated sequence classifier.
//!
//! Consumes a full padded token sequence and produces one realness logit.
//! Training goes through `forward_logits` (graph-attached, paired with the
//! logits-form BCE loss); reward extraction goes through `score`, which is
//! graph-free: no gradient ever flows from a reward back into the
//! generator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::DiscriminatorConfig;
use super::generator::load_named_params;
use super::gru::GruCell;
use super::xavier_weight;
use crate::autograd::ops::{embedding, linear, sigmoid_scalar};
use crate::autograd::{no_grad, Tensor};
use crate::checkpoint::TensorState;
use crate::data::SequenceBatch;
use crate::error::Result;

/// Embedding + GRU + single-logit head.
pub struct Discriminator {
    pub config: DiscriminatorConfig,
    embedding: Tensor, // [vocab, embed] flat
    cell: GruCell,
    w_out: Tensor, // [1, hidden] flat
    b_out: Tensor, // [1]
}

impl Discriminator {
    /// Create a discriminator with freshly initialized weights.
    pub fn new<R: Rng>(config: DiscriminatorConfig, rng: &mut R) -> Self {
        let embedding = xavier_weight(rng, config.vocab_size, config.embed_dim);
        let cell = GruCell::new(config.embed_dim, config.hidden_dim, rng);
        let w_out = xavier_weight(rng, 1, config.hidden_dim);
        let b_out = Tensor::zeros(1, true);
        Self {
            config,
            embedding,
            cell,
            w_out,
            b_out,
        }
    }

    /// Create a discriminator from a seed (reproducible initialization).
    pub fn with_seed(config: DiscriminatorConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(config, &mut rng)
    }

    /// Realness logits `[batch]`, graph-attached for BCE training.
    ///
    /// # Errors
    ///
    /// Fails on out-of-vocabulary token ids.
    pub fn forward_logits(&self, batch: &SequenceBatch) -> Result<Tensor> {
        batch.check_vocab(self.config.vocab_size)?;

        let b = batch.batch_size;
        let mut h = Tensor::zeros(b * self.config.hidden_dim, false);
        for t in 0..batch.seq_len {
            let x = embedding(&self.embedding, &batch.column(t), self.config.embed_dim);
            h = self.cell.forward(&x, &h);
        }
        Ok(linear(
            &h,
            &self.w_out,
            &self.b_out,
            self.config.hidden_dim,
            1,
        ))
    }

    /// Probability that each sequence is real, in `[0, 1]`. Graph-free:
    /// this is the reward-source view of the discriminator.
    pub fn score(&self, batch: &SequenceBatch) -> Result<Vec<f32>> {
        no_grad(|| {
            let logits = self.forward_logits(batch)?;
            let scores = logits.data().iter().map(|&x| sigmoid_scalar(x)).collect();
            Ok(scores)
        })
    }

    /// Trainable parameters in a stable order.
    pub fn params(&self) -> Vec<Tensor> {
        self.named_params().into_iter().map(|(_, t)| t).collect()
    }

    /// Parameters with their checkpoint names.
    pub fn named_params(&self) -> Vec<(String, Tensor)> {
        let mut params = vec![("embedding.weight".to_string(), self.embedding.clone())];
        params.extend(self.cell.named_params("gru"));
        params.push(("out.weight".to_string(), self.w_out.clone()));
        params.push(("out.bias".to_string(), self.b_out.clone()));
        params
    }

    /// Snapshot all parameters for checkpointing.
    pub fn state(&self) -> Vec<TensorState> {
        self.named_params()
            .into_iter()
            .map(|(name, tensor)| TensorState {
                name,
                data: tensor.to_vec(),
            })
            .collect()
    }

    /// Restore parameters from a checkpoint, validating names and shapes.
    pub fn load_state(&mut self, states: &[TensorState]) -> Result<()> {
        load_named_params(&self.named_params(), states)
    }
}
