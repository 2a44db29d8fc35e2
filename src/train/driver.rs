//! Generic epoch driver.
//!
//! MLE pretraining, discriminator pretraining, and the adversarial phase
//! all share one loop: run a training epoch, run a validation epoch,
//! append to the record, and save a checkpoint only when validation loss
//! strictly improves. `best_valid_loss` is threaded through explicitly so
//! the loop stays pure and testable; there is no global best. The phase
//! state (models, optimizers, loaders) is passed by `&mut` into every
//! callback rather than captured, keeping the three callbacks free to
//! share it.

use std::time::Instant;

use crate::error::Result;
use crate::record::{mins_secs, TrainRecord};

/// What a training epoch reports back to the driver.
#[derive(Debug, Clone, Copy)]
pub struct EpochMetrics {
    /// Mean training loss of the epoch.
    pub loss: f32,
    /// Learning rate in effect during the epoch.
    pub lr: f32,
}

/// Snapshot description handed to the save callback on improvement.
#[derive(Debug, Clone, Copy)]
pub struct BestEpoch {
    /// 1-based epoch index.
    pub epoch: usize,
    pub train_loss: f32,
    pub valid_loss: f32,
}

/// Run `n_epochs` epochs of `train_fn`/`eval_fn` over shared state.
///
/// `save_best` fires exactly when an epoch's validation loss is strictly
/// below `best_valid_loss`, which is updated in place: selection is
/// monotone and never regresses to a worse snapshot. Returns the final
/// value of `best_valid_loss`.
pub fn run_epochs<S, T, E, F>(
    n_epochs: usize,
    best_valid_loss: &mut f32,
    record: &mut TrainRecord,
    state: &mut S,
    mut train_fn: T,
    mut eval_fn: E,
    mut save_best: F,
) -> Result<f32>
where
    T: FnMut(&mut S, usize) -> Result<EpochMetrics>,
    E: FnMut(&mut S, usize) -> Result<f32>,
    F: FnMut(&mut S, BestEpoch) -> Result<()>,
{
    for epoch in 0..n_epochs {
        let start = Instant::now();
        let metrics = train_fn(state, epoch)?;
        let valid_loss = eval_fn(state, epoch)?;
        let (mins, secs) = mins_secs(start.elapsed());

        record.push_epoch(epoch + 1, metrics.loss, valid_loss, metrics.lr);

        println!(
            "Epoch {} / {}: train_loss={:.3}, valid_loss={:.3}, lr={:.6} ({mins}m {secs}s)",
            epoch + 1,
            n_epochs,
            metrics.loss,
            valid_loss,
            metrics.lr,
        );

        if valid_loss < *best_valid_loss {
            *best_valid_loss = valid_loss;
            save_best(
                state,
                BestEpoch {
                    epoch: epoch + 1,
                    train_loss: metrics.loss,
                    valid_loss,
                },
            )?;
        }
    }
    Ok(*best_valid_loss)
}
