//! Autoregressive generator policy.
//!
//! The generator is the stochastic policy of the adversarial phase: it
//! exposes a teacher-forced `score` pass (used for the MLE loss and for
//! recomputing log-probabilities of already-sampled actions) and
//! graph-free `sample`/`complete` passes that draw token sequences from
//! the per-step categorical distribution. Gradients never flow through a
//! sample; the policy-gradient estimator multiplies `score` log-probs by
//! detached rewards instead.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::GeneratorConfig;
use super::gru::GruCell;
use super::{log_softmax_row, xavier_weight};
use crate::autograd::ops::{embedding, linear};
use crate::autograd::{no_grad, Tensor};
use crate::checkpoint::TensorState;
use crate::data::SequenceBatch;
use crate::error::{Result, SeqGanError};

/// Sequences drawn from the generator plus the sampling-time
/// log-probability of every drawn action.
#[derive(Debug, Clone)]
pub struct SampledSequences {
    /// The sampled token ids, padded past each sequence's length.
    pub batch: SequenceBatch,
    /// log π(token_t | prefix) per position, row-major `[batch, len]`;
    /// zero at padded positions after an early end token.
    pub log_probs: Vec<f32>,
    /// True length of each sequence (`max_len` unless an end token fired).
    pub lengths: Vec<usize>,
}

/// Embedding + GRU + vocabulary-softmax head.
pub struct Generator {
    pub config: GeneratorConfig,
    embedding: Tensor, // [vocab, embed] flat
    cell: GruCell,
    w_out: Tensor, // [vocab, hidden] flat
    b_out: Tensor, // [vocab]
}

impl Generator {
    /// Create a generator with freshly initialized weights.
    pub fn new<R: Rng>(config: GeneratorConfig, rng: &mut R) -> Self {
        let embedding = xavier_weight(rng, config.vocab_size, config.embed_dim);
        let cell = GruCell::new(config.embed_dim, config.hidden_dim, rng);
        let w_out = xavier_weight(rng, config.vocab_size, config.hidden_dim);
        let b_out = Tensor::zeros(config.vocab_size, true);
        Self {
            config,
            embedding,
            cell,
            w_out,
            b_out,
        }
    }

    /// Create a generator from a seed (reproducible initialization).
    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(config, &mut rng)
    }

    /// One decoding step over a whole batch: embeds `input_ids`, advances
    /// the recurrence, and projects to vocabulary logits `[batch, vocab]`.
    fn step(&self, input_ids: &[u32], h: &Tensor) -> (Tensor, Tensor) {
        let x = embedding(&self.embedding, input_ids, self.config.embed_dim);
        let h_next = self.cell.forward(&x, h);
        let logits = linear(
            &h_next,
            &self.w_out,
            &self.b_out,
            self.config.hidden_dim,
            self.config.vocab_size,
        );
        (logits, h_next)
    }

    /// Teacher-forced scoring: per-step vocabulary logits for predicting
    /// each position of `batch`, graph-attached for backpropagation.
    ///
    /// The input at position 0 is the start token; at position t it is the
    /// batch's token t-1 (padding included; padded positions are masked
    /// out by the losses, not here).
    ///
    /// # Errors
    ///
    /// Fails on an empty batch or out-of-vocabulary token ids.
    pub fn score(&self, batch: &SequenceBatch) -> Result<Vec<Tensor>> {
        batch.check_vocab(self.config.vocab_size)?;

        let b = batch.batch_size;
        let mut h = Tensor::zeros(b * self.config.hidden_dim, false);
        let mut per_step = Vec::with_capacity(batch.seq_len);

        for t in 0..batch.seq_len {
            let inputs: Vec<u32> = if t == 0 {
                vec![self.config.start_idx; b]
            } else {
                batch.column(t - 1)
            };
            let (logits, h_next) = self.step(&inputs, &h);
            h = h_next;
            per_step.push(logits);
        }
        Ok(per_step)
    }

    /// Draw `batch_size` sequences of up to `max_len` tokens from the
    /// current policy (multinomial per step, never greedy).
    ///
    /// Runs graph-free; the returned log-probabilities are plain floats.
    pub fn sample(
        &self,
        batch_size: usize,
        max_len: usize,
        rng: &mut StdRng,
    ) -> Result<SampledSequences> {
        if batch_size == 0 || max_len == 0 {
            return Err(SeqGanError::EmptyBatch {
                context: format!("sample(batch_size={batch_size}, max_len={max_len})"),
            });
        }

        no_grad(|| {
            let vocab = self.config.vocab_size;
            let mut tokens = vec![self.config.pad_idx; batch_size * max_len];
            let mut log_probs = vec![0.0f32; batch_size * max_len];
            let mut lengths = vec![max_len; batch_size];
            let mut finished = vec![false; batch_size];

            let mut h = Tensor::zeros(batch_size * self.config.hidden_dim, false);
            let mut inputs = vec![self.config.start_idx; batch_size];

            for t in 0..max_len {
                let (logits, h_next) = self.step(&inputs, &h);
                h = h_next;

                let logits_data = logits.data();
                let rows = logits_data.as_slice().expect("contiguous");
                for b in 0..batch_size {
                    if finished[b] {
                        continue;
                    }
                    let row = &rows[b * vocab..(b + 1) * vocab];
                    let lp = log_softmax_row(row);
                    let token = sample_categorical(&lp, rng);
                    tokens[b * max_len + t] = token as u32;
                    log_probs[b * max_len + t] = lp[token];

                    if self.config.eos_idx == Some(token as u32) {
                        finished[b] = true;
                        lengths[b] = t + 1;
                    }
                }

                inputs = (0..batch_size)
                    .map(|b| {
                        if finished[b] && lengths[b] <= t {
                            self.config.pad_idx
                        } else {
                            tokens[b * max_len + t]
                        }
                    })
                    .collect();
            }

            let batch = SequenceBatch::new(tokens, batch_size, max_len)?;
            Ok(SampledSequences {
                batch,
                log_probs,
                lengths,
            })
        })
    }

    /// Complete every prefix to `config.max_len` tokens by sampling the
    /// remaining positions from the current policy. This is the Monte-Carlo
    /// rollout primitive. Rows whose prefix already contains the end
    /// token are padded out unchanged.
    pub fn complete(&self, prefix: &SequenceBatch, rng: &mut StdRng) -> Result<SequenceBatch> {
        prefix.check_vocab(self.config.vocab_size)?;
        let full_len = self.config.max_len;
        if prefix.seq_len > full_len {
            return Err(SeqGanError::ShapeMismatch {
                name: "rollout prefix".into(),
                expected: full_len,
                actual: prefix.seq_len,
            });
        }

        no_grad(|| {
            let b = prefix.batch_size;
            let p = prefix.seq_len;
            let vocab = self.config.vocab_size;

            let mut tokens = vec![self.config.pad_idx; b * full_len];
            for row in 0..b {
                tokens[row * full_len..row * full_len + p].copy_from_slice(prefix.row(row));
            }
            let mut finished: Vec<bool> = (0..b)
                .map(|row| match self.config.eos_idx {
                    Some(eos) => prefix.row(row).contains(&eos),
                    None => false,
                })
                .collect();

            let mut h = Tensor::zeros(b * self.config.hidden_dim, false);
            for t in 0..full_len {
                let inputs: Vec<u32> = if t == 0 {
                    vec![self.config.start_idx; b]
                } else {
                    (0..b).map(|row| tokens[row * full_len + t - 1]).collect()
                };

                // The recurrence always advances; the output projection and
                // draw are only needed for positions past the prefix.
                let x = embedding(&self.embedding, &inputs, self.config.embed_dim);
                h = self.cell.forward(&x, &h);
                if t < p {
                    continue;
                }

                let logits = linear(
                    &h,
                    &self.w_out,
                    &self.b_out,
                    self.config.hidden_dim,
                    vocab,
                );
                let logits_data = logits.data();
                let rows = logits_data.as_slice().expect("contiguous");
                for row in 0..b {
                    if finished[row] {
                        continue;
                    }
                    let lp = log_softmax_row(&rows[row * vocab..(row + 1) * vocab]);
                    let token = sample_categorical(&lp, rng) as u32;
                    tokens[row * full_len + t] = token;
                    if self.config.eos_idx == Some(token) {
                        finished[row] = true;
                    }
                }
            }

            SequenceBatch::new(tokens, b, full_len)
        })
    }

    /// Trainable parameters in a stable order (the optimizer's moment
    /// buffers are positional).
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

/// Draw an index from log-probabilities via inverse-CDF sampling.
fn sample_categorical(log_probs: &[f32], rng: &mut StdRng) -> usize {
    let r: f32 = rng.random();
    let mut acc = 0.0f32;
    for (i, &lp) in log_probs.iter().enumerate() {
        acc += lp.exp();
        if r < acc {
            return i;
        }
    }
    log_probs.len() - 1
}

/// Copy checkpointed tensors into live parameters by name.
pub(crate) fn load_named_params(
    params: &[(String, Tensor)],
    states: &[TensorState],
) -> Result<()> {
    for (name, tensor) in params {
        let state = states
            .iter()
            .find(|s| &s.name == name)
            .ok_or_else(|| SeqGanError::Serialization {
                message: format!("checkpoint is missing parameter '{name}'"),
            })?;
        if state.data.len() != tensor.len() {
            return Err(SeqGanError::ShapeMismatch {
                name: name.clone(),
                expected: tensor.len(),
                actual: state.data.len(),
            });
        }
        tensor
            .data_mut()
            .iter_mut()
            .zip(&state.data)
            .for_each(|(dst, &src)| *dst = src);
    }
    Ok(())
}
