//! Discriminator pretraining.
//!
//! The adversarial phase requires a discriminator that already separates
//! real data from the MLE-pretrained generator's samples; training it
//! from scratch against a live policy-gradient generator collapses. This
//! phase reuses the adversarial trainer's DISCRIMINATOR_STEP with the
//! generator frozen at its pretrained weights.

use std::path::Path;
use std::time::Instant;

use super::adversarial::AdversarialTrainer;
use super::config::TrainConfig;
use super::driver::{run_epochs, EpochMetrics};
use crate::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
use crate::data::{get_dataloader, DataLoader};
use crate::error::Result;
use crate::model::{Discriminator, Generator};
use crate::optim::Optimizer;
use crate::record::TrainRecord;

struct DisPretrainState {
    trainer: AdversarialTrainer,
    train_loader: DataLoader,
    valid_loader: DataLoader,
}

/// Full discriminator-pretraining pipeline: load the pretrained generator
/// (fatal if missing), train `dis_epochs` epochs of real-vs-sampled BCE,
/// keep the best checkpoint at `<out_dir>/dis_states.json`, and write
/// `<out_dir>/dis_record.json`. "Best" is keyed on held-out BCE against
/// freshly sampled fakes.
pub fn run_dis_pretraining(config: &TrainConfig, data_dir: &Path, out_dir: &Path) -> Result<()> {
    config.validate()?;

    let gen_chk = load_checkpoint(out_dir.join("gen_states.json"))?;
    let mut generator = Generator::with_seed(config.generator_config(), config.seed);
    generator.load_state(&gen_chk.model)?;
    let discriminator = Discriminator::with_seed(config.discriminator_config(), config.seed + 1);

    let mut state = DisPretrainState {
        trainer: AdversarialTrainer::new(generator, discriminator, config.clone()),
        train_loader: get_dataloader(data_dir, "gen", "train", config.batch_size, config)?,
        valid_loader: get_dataloader(data_dir, "gen", "valid", config.batch_size, config)?,
    };

    println!("--- Pretraining discriminator ---");
    let mut record = TrainRecord::new();
    let mut best_valid_loss = config.best_valid_loss;
    let start = Instant::now();
    let chk_path = out_dir.join("dis_states.json");

    run_epochs(
        config.dis_epochs,
        &mut best_valid_loss,
        &mut record,
        &mut state,
        |s, epoch| {
            let batches = s.train_loader.batches();
            let mut total = 0.0f32;
            for (i, real) in batches.iter().enumerate() {
                total += s.trainer.discriminator_step(real, epoch, i)?;
            }
            Ok(EpochMetrics {
                loss: total / batches.len() as f32,
                lr: s.trainer.dis_optimizer().lr(),
            })
        },
        |s, _| {
            let batches = s.valid_loader.batches();
            s.trainer.eval_discriminator(&batches)
        },
        |s, snapshot| {
            save_checkpoint(
                &Checkpoint {
                    epoch: snapshot.epoch,
                    model: s.trainer.discriminator().state(),
                    optimizer: s.trainer.dis_optimizer().state(),
                    train_loss: snapshot.train_loss,
                    valid_loss: snapshot.valid_loss,
                },
                &chk_path,
            )
        },
    )?;

    record.finalize(start.elapsed());
    record.save(out_dir.join("dis_record.json"))?;
    println!("Best validation loss: {best_valid_loss:.3}");
    Ok(())
}
