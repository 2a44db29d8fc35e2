//! Adversarial training loop.
//!
//! The two-state machine of the GAN phase: DISCRIMINATOR_STEP trains the
//! classifier on one real batch against a freshly sampled fake batch
//! (generator output treated as fixed data; sampling is graph-free);
//! GENERATOR_STEP samples a fresh batch, prices every decoding step with
//! Monte-Carlo rollout rewards, and applies a REINFORCE update, optionally
//! mixed with a teacher-forcing MLE term to damp policy drift. Fake
//! batches are never reused across steps, since a stale batch would bias the
//! discriminator toward an old policy.
//!
//! Validation deliberately bypasses all adversarial machinery and reports
//! plain MLE loss on held-out data (see `mle`), the only metric that stays
//! comparable while the discriminator itself drifts.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::time::Instant;

use super::config::TrainConfig;
use super::driver::{run_epochs, EpochMetrics};
use super::loss::{BceWithLogits, PolicyGradientLoss};
use super::mle::{gen_eval_epoch, mle_loss};
use super::rollout::{RewardSource, RolloutRewarder, RunningMean};
use crate::autograd::ops::{add, scale};
use crate::autograd::{backward, no_grad, Tensor};
use crate::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
use crate::data::{get_dataloader, DataLoader, SequenceBatch};
use crate::error::{Result, SeqGanError};
use crate::model::{Discriminator, Generator};
use crate::optim::{clip_grad_norm, Adam, Optimizer};
use crate::record::TrainRecord;

/// Losses of one adversarial epoch.
#[derive(Debug, Clone, Copy)]
pub struct AdversarialEpochStats {
    /// Mean teacher-forced MLE loss on the epoch's real batches, the
    /// perplexity-comparable number that goes into the record.
    pub train_loss: f32,
    /// Mean discriminator BCE loss across its steps.
    pub dis_loss: f32,
    /// Mean generator policy-gradient loss across its steps.
    pub gen_loss: f32,
}

/// Orchestrates generator and discriminator optimization. Each model owns
/// its parameters and its own Adam instance; nothing is shared between
/// the two updates except the sampled data itself.
pub struct AdversarialTrainer {
    generator: Generator,
    gen_params: Vec<Tensor>,
    gen_optimizer: Adam,
    discriminator: Discriminator,
    dis_params: Vec<Tensor>,
    dis_optimizer: Adam,
    rewarder: RolloutRewarder,
    baseline: RunningMean,
    config: TrainConfig,
    rng: StdRng,
}

impl AdversarialTrainer {
    /// Build a trainer around already-initialized (normally pretrained)
    /// models, with fresh optimizers.
    pub fn new(generator: Generator, discriminator: Discriminator, config: TrainConfig) -> Self {
        let gen_params = generator.params();
        let dis_params = discriminator.params();
        let rewarder = RolloutRewarder::new(config.num_rollouts, config.reward_clamp_eps);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            gen_optimizer: Adam::default_params(config.learning_rate),
            dis_optimizer: Adam::default_params(config.learning_rate),
            generator,
            gen_params,
            discriminator,
            dis_params,
            rewarder,
            baseline: RunningMean::default(),
            config,
            rng,
        }
    }

    /// The generator under training.
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// The discriminator under training.
    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    /// The generator's optimizer (checkpointing).
    pub fn gen_optimizer(&self) -> &Adam {
        &self.gen_optimizer
    }

    /// The discriminator's optimizer (checkpointing).
    pub fn dis_optimizer(&self) -> &Adam {
        &self.dis_optimizer
    }

    /// DISCRIMINATOR_STEP: one BCE update on `real` versus a freshly
    /// sampled fake batch of the same size. Only discriminator parameters
    /// move. Returns the step's loss.
    pub fn discriminator_step(
        &mut self,
        real: &SequenceBatch,
        epoch: usize,
        batch_idx: usize,
    ) -> Result<f32> {
        real.check_vocab(self.config.vocab_size)?;
        let fake = self
            .generator
            .sample(real.batch_size, self.config.max_len, &mut self.rng)?
            .batch;

        self.dis_optimizer.zero_grad(&mut self.dis_params);

        let real_logits = self.discriminator.forward_logits(real)?;
        let fake_logits = self.discriminator.forward_logits(&fake)?;
        let real_targets = vec![1.0 - self.config.label_smoothing; real.batch_size];
        let fake_targets = vec![0.0; fake.batch_size];

        let loss = add(
            &BceWithLogits.forward(&real_logits, &real_targets),
            &BceWithLogits.forward(&fake_logits, &fake_targets),
        );
        let loss_val = loss.data()[0];
        if !loss_val.is_finite() {
            return Err(SeqGanError::NonFiniteLoss {
                phase: "discriminator",
                epoch,
                batch: batch_idx,
                value: loss_val,
            });
        }

        backward(&loss, None);
        if let Some(max_norm) = self.config.max_grad_norm {
            clip_grad_norm(&mut self.dis_params, max_norm);
        }
        self.dis_optimizer.step(&mut self.dis_params);
        Ok(loss_val)
    }

    /// GENERATOR_STEP: sample a fresh batch, estimate per-step rewards by
    /// Monte-Carlo rollout against the discriminator, and apply the
    /// policy-gradient update (plus the optional MLE mixing term against
    /// `real`). Only generator parameters move. Returns the step's loss.
    pub fn generator_step(
        &mut self,
        real: &SequenceBatch,
        epoch: usize,
        batch_idx: usize,
    ) -> Result<f32> {
        let sampled =
            self.generator
                .sample(real.batch_size, self.config.max_len, &mut self.rng)?;
        let mut rewards = self.rewarder.rewards(
            &self.generator,
            &self.discriminator,
            &sampled,
            &mut self.rng,
        )?;

        // Baseline subtraction: shifts nothing in expectation, shrinks
        // variance. Applied to live positions only; padded positions keep
        // their zero "no contribution" marker.
        if self.config.use_baseline {
            let len = sampled.batch.seq_len;
            let live: Vec<usize> = (0..sampled.batch.batch_size)
                .flat_map(|b| (0..sampled.lengths[b]).map(move |t| b * len + t))
                .collect();
            let batch_mean =
                live.iter().map(|&p| rewards[p]).sum::<f32>() / live.len().max(1) as f32;
            let base = self.baseline.value();
            for &p in &live {
                rewards[p] -= base;
            }
            self.baseline.update(batch_mean);
        }

        self.gen_optimizer.zero_grad(&mut self.gen_params);

        let per_step = self.generator.score(&sampled.batch)?;
        let len = sampled.batch.seq_len;
        let mut total: Option<Tensor> = None;
        for (t, logits) in per_step.iter().enumerate() {
            let actions = sampled.batch.column(t);
            let weights: Vec<f32> = (0..sampled.batch.batch_size)
                .map(|b| rewards[b * len + t])
                .collect();
            let step_loss = PolicyGradientLoss.forward(logits, &actions, &weights);
            total = Some(match total {
                Some(acc) => add(&acc, &step_loss),
                None => step_loss,
            });
        }
        let pg_total = total.expect("scored batch has at least one step");
        let mut loss = scale(&pg_total, 1.0 / sampled.batch.batch_size as f32);

        if self.config.mle_weight > 0.0 {
            let (mle_sum, count) = mle_loss(&self.generator, real, self.config.pad_idx)?;
            let mle_term = scale(&mle_sum, self.config.mle_weight / count as f32);
            loss = add(&loss, &mle_term);
        }

        let loss_val = loss.data()[0];
        if !loss_val.is_finite() {
            return Err(SeqGanError::NonFiniteLoss {
                phase: "generator",
                epoch,
                batch: batch_idx,
                value: loss_val,
            });
        }

        backward(&loss, None);
        if let Some(max_norm) = self.config.max_grad_norm {
            clip_grad_norm(&mut self.gen_params, max_norm);
        }
        self.gen_optimizer.step(&mut self.gen_params);
        Ok(loss_val)
    }

    /// One adversarial epoch over `batches`, alternating
    /// `dis_steps_per_gen` discriminator steps per generator step.
    pub fn train_epoch(
        &mut self,
        batches: &[SequenceBatch],
        epoch: usize,
    ) -> Result<AdversarialEpochStats> {
        if batches.is_empty() {
            return Err(SeqGanError::EmptyBatch {
                context: "adversarial epoch received no batches".into(),
            });
        }

        let ratio = self.config.dis_steps_per_gen;
        let mut dis_losses = Vec::new();
        let mut gen_losses = Vec::new();
        let mut mle_losses = Vec::new();

        for (i, real) in batches.iter().enumerate() {
            dis_losses.push(self.discriminator_step(real, epoch, i)?);
            if (i + 1) % ratio == 0 {
                gen_losses.push(self.generator_step(real, epoch, i)?);
            }

            // Perplexity-comparable progress metric, measured without
            // touching parameters.
            let mle = no_grad(|| -> Result<f32> {
                let (sum, count) = mle_loss(&self.generator, real, self.config.pad_idx)?;
                let v = sum.data()[0] / count as f32;
                Ok(v)
            })?;
            mle_losses.push(mle);
        }

        let mean = |xs: &[f32]| {
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().sum::<f32>() / xs.len() as f32
            }
        };
        Ok(AdversarialEpochStats {
            train_loss: mean(&mle_losses),
            dis_loss: mean(&dis_losses),
            gen_loss: mean(&gen_losses),
        })
    }

    /// Validation epoch: plain MLE loss on held-out real data. No
    /// discriminator, no sampling, no gradients.
    pub fn eval_epoch(&self, batches: &[SequenceBatch]) -> Result<f32> {
        gen_eval_epoch(&self.generator, batches, self.config.pad_idx)
    }

    /// Discriminator validation: BCE on held-out real batches versus
    /// freshly sampled fakes, without updates. Used by discriminator
    /// pretraining.
    pub fn eval_discriminator(&mut self, batches: &[SequenceBatch]) -> Result<f32> {
        if batches.is_empty() {
            return Err(SeqGanError::EmptyBatch {
                context: "discriminator validation received no batches".into(),
            });
        }
        let mut total = 0.0f32;
        for real in batches {
            let fake = self
                .generator
                .sample(real.batch_size, self.config.max_len, &mut self.rng)?
                .batch;
            let loss_val = no_grad(|| -> Result<f32> {
                let real_logits = self.discriminator.forward_logits(real)?;
                let fake_logits = self.discriminator.forward_logits(&fake)?;
                let real_targets = vec![1.0 - self.config.label_smoothing; real.batch_size];
                let fake_targets = vec![0.0; fake.batch_size];
                let loss = add(
                    &BceWithLogits.forward(&real_logits, &real_targets),
                    &BceWithLogits.forward(&fake_logits, &fake_targets),
                );
                let v = loss.data()[0];
                Ok(v)
            })?;
            total += loss_val;
        }
        Ok(total / batches.len() as f32)
    }

    /// Mean discriminator score of a freshly sampled batch: a probe of
    /// how convincing the generator currently is.
    pub fn mean_sampled_score(&mut self, batch_size: usize) -> Result<f32> {
        let sampled = self
            .generator
            .sample(batch_size, self.config.max_len, &mut self.rng)?;
        let scores = self.discriminator.score(&sampled.batch)?;
        Ok(scores.iter().sum::<f32>() / scores.len() as f32)
    }
}

struct AdvRunState {
    trainer: AdversarialTrainer,
    train_loader: DataLoader,
    valid_loader: DataLoader,
}

/// Full adversarial pipeline: load both pretrained checkpoints (fatal if
/// either is missing), run `n_epochs` through the shared driver, keep the
/// best generator snapshot at `<out_dir>/seqgan_states.json`, and write
/// `<out_dir>/seqgan_record.json`.
pub fn run_adversarial(config: &TrainConfig, data_dir: &Path, out_dir: &Path) -> Result<()> {
    config.validate()?;

    let gen_chk = load_checkpoint(out_dir.join("gen_states.json"))?;
    let dis_chk = load_checkpoint(out_dir.join("dis_states.json"))?;

    let mut generator = Generator::with_seed(config.generator_config(), config.seed);
    generator.load_state(&gen_chk.model)?;
    let mut discriminator = Discriminator::with_seed(config.discriminator_config(), config.seed + 1);
    discriminator.load_state(&dis_chk.model)?;

    let mut state = AdvRunState {
        trainer: AdversarialTrainer::new(generator, discriminator, config.clone()),
        train_loader: get_dataloader(data_dir, "gen", "train", config.batch_size, config)?,
        valid_loader: get_dataloader(data_dir, "gen", "valid", config.batch_size, config)?,
    };

    println!("--- Adversarial training ---");
    let mut record = TrainRecord::new();
    let mut best_valid_loss = config.best_valid_loss;
    let start = Instant::now();
    let chk_path = out_dir.join("seqgan_states.json");

    run_epochs(
        config.n_epochs,
        &mut best_valid_loss,
        &mut record,
        &mut state,
        |s, epoch| {
            let batches = s.train_loader.batches();
            let stats = s.trainer.train_epoch(&batches, epoch)?;
            println!(
                "  dis_loss={:.4}, gen_loss={:.4}",
                stats.dis_loss, stats.gen_loss
            );
            Ok(EpochMetrics {
                loss: stats.train_loss,
                lr: s.trainer.gen_optimizer().lr(),
            })
        },
        |s, _| {
            let batches = s.valid_loader.batches();
            s.trainer.eval_epoch(&batches)
        },
        |s, snapshot| {
            save_checkpoint(
                &Checkpoint {
                    epoch: snapshot.epoch,
                    model: s.trainer.generator().state(),
                    optimizer: s.trainer.gen_optimizer().state(),
                    train_loss: snapshot.train_loss,
                    valid_loss: snapshot.valid_loss,
                },
                &chk_path,
            )
        },
    )?;

    record.finalize(start.elapsed());
    record.save(out_dir.join("seqgan_record.json"))?;
    println!("Best validation loss: {best_valid_loss:.3}");
    Ok(())
}
