//! Maximum-likelihood pretraining of the generator.
//!
//! A plain teacher-forced cross-entropy loop: the adversarial phase
//! requires an MLE-pretrained policy as its starting point, and the same
//! loss doubles as the validation metric for every phase (adversarial
//! reward is not comparable across runs, because discriminator quality
//! itself drifts).

use std::path::Path;
use std::time::Instant;

use super::config::TrainConfig;
use super::driver::{run_epochs, EpochMetrics};
use super::loss::SequenceCrossEntropy;
use crate::autograd::ops::{add, scale};
use crate::autograd::{backward, no_grad, Tensor};
use crate::checkpoint::{save_checkpoint, Checkpoint};
use crate::data::{get_dataloader, DataLoader, SequenceBatch};
use crate::error::{Result, SeqGanError};
use crate::model::Generator;
use crate::optim::{clip_grad_norm, Adam, Optimizer};
use crate::record::TrainRecord;

/// Teacher-forced cross-entropy of a real batch: summed over non-pad
/// positions, with the contributing token count for averaging.
pub fn mle_loss(
    generator: &Generator,
    batch: &SequenceBatch,
    pad_idx: u32,
) -> Result<(Tensor, usize)> {
    let ce = SequenceCrossEntropy::new(pad_idx);
    let per_step = generator.score(batch)?;

    let mut total: Option<Tensor> = None;
    let mut count = 0usize;
    for (t, logits) in per_step.iter().enumerate() {
        let (step_loss, step_count) = ce.forward(logits, &batch.column(t));
        if step_count == 0 {
            continue;
        }
        count += step_count;
        total = Some(match total {
            Some(acc) => add(&acc, &step_loss),
            None => step_loss,
        });
    }

    match total {
        Some(loss) => Ok((loss, count)),
        None => Err(SeqGanError::EmptyBatch {
            context: "batch holds only padding".into(),
        }),
    }
}

/// One epoch of MLE updates. Returns the mean per-token loss.
pub fn gen_train_epoch(
    generator: &Generator,
    params: &mut [Tensor],
    optimizer: &mut Adam,
    batches: &[SequenceBatch],
    pad_idx: u32,
    max_grad_norm: Option<f32>,
    epoch: usize,
) -> Result<f32> {
    if batches.is_empty() {
        return Err(SeqGanError::EmptyBatch {
            context: "MLE training epoch received no batches".into(),
        });
    }
    let mut total_loss = 0.0f32;

    for (i, batch) in batches.iter().enumerate() {
        optimizer.zero_grad(params);

        let (loss_sum, count) = mle_loss(generator, batch, pad_idx)?;
        let loss = scale(&loss_sum, 1.0 / count as f32);
        let loss_val = loss.data()[0];
        if !loss_val.is_finite() {
            return Err(SeqGanError::NonFiniteLoss {
                phase: "generator",
                epoch,
                batch: i,
                value: loss_val,
            });
        }

        backward(&loss, None);
        if let Some(max_norm) = max_grad_norm {
            clip_grad_norm(params, max_norm);
        }
        optimizer.step(params);

        total_loss += loss_val;
    }

    Ok(total_loss / batches.len() as f32)
}

/// Validation: mean per-token cross-entropy on held-out data, no
/// gradients, no parameter updates.
pub fn gen_eval_epoch(
    generator: &Generator,
    batches: &[SequenceBatch],
    pad_idx: u32,
) -> Result<f32> {
    if batches.is_empty() {
        return Err(SeqGanError::EmptyBatch {
            context: "validation epoch received no batches".into(),
        });
    }
    no_grad(|| {
        let mut total_loss = 0.0f32;
        for batch in batches {
            let (loss_sum, count) = mle_loss(generator, batch, pad_idx)?;
            total_loss += loss_sum.data()[0] / count as f32;
        }
        Ok(total_loss / batches.len() as f32)
    })
}

struct GenPretrainState {
    generator: Generator,
    params: Vec<Tensor>,
    optimizer: Adam,
    train_loader: DataLoader,
    valid_loader: DataLoader,
    config: TrainConfig,
}

/// Full generator-pretraining pipeline: load data, train `gen_epochs`
/// epochs through the shared driver, keep the best checkpoint at
/// `<out_dir>/gen_states.json`, and write `<out_dir>/gen_record.json`.
pub fn run_gen_pretraining(config: &TrainConfig, data_dir: &Path, out_dir: &Path) -> Result<()> {
    config.validate()?;

    let generator = Generator::with_seed(config.generator_config(), config.seed);
    let params = generator.params();
    let mut state = GenPretrainState {
        params,
        optimizer: Adam::default_params(config.learning_rate),
        train_loader: get_dataloader(data_dir, "gen", "train", config.batch_size, config)?,
        valid_loader: get_dataloader(data_dir, "gen", "valid", config.batch_size, config)?,
        config: config.clone(),
        generator,
    };

    println!("--- Pretraining generator ---");
    let mut record = TrainRecord::new();
    let mut best_valid_loss = config.best_valid_loss;
    let start = Instant::now();
    let chk_path = out_dir.join("gen_states.json");

    run_epochs(
        config.gen_epochs,
        &mut best_valid_loss,
        &mut record,
        &mut state,
        |s, epoch| {
            let batches = s.train_loader.batches();
            let loss = gen_train_epoch(
                &s.generator,
                &mut s.params,
                &mut s.optimizer,
                &batches,
                s.config.pad_idx,
                s.config.max_grad_norm,
                epoch,
            )?;
            Ok(EpochMetrics {
                loss,
                lr: s.optimizer.lr(),
            })
        },
        |s, _| {
            let batches = s.valid_loader.batches();
            gen_eval_epoch(&s.generator, &batches, s.config.pad_idx)
        },
        |s, snapshot| {
            save_checkpoint(
                &Checkpoint {
                    epoch: snapshot.epoch,
                    model: s.generator.state(),
                    optimizer: s.optimizer.state(),
                    train_loss: snapshot.train_loss,
                    valid_loss: snapshot.valid_loss,
                },
                &chk_path,
            )
        },
    )?;

    record.finalize(start.elapsed());
    record.save(out_dir.join("gen_record.json"))?;
    println!("Best validation loss: {best_valid_loss:.3}");
    Ok(())
}
