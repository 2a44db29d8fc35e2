//! Training loops: MLE pretraining, discriminator pretraining, and the
//! adversarial phase, all sharing one epoch driver, one record format,
//! and one checkpoint discipline.

pub mod adversarial;
mod config;
mod driver;
pub mod loss;
mod mle;
mod pretrain_dis;
mod rollout;

pub use adversarial::{run_adversarial, AdversarialEpochStats, AdversarialTrainer};
pub use config::TrainConfig;
pub use driver::{run_epochs, BestEpoch, EpochMetrics};
pub use mle::{gen_eval_epoch, gen_train_epoch, mle_loss, run_gen_pretraining};
pub use pretrain_dis::run_dis_pretraining;
pub use rollout::{RewardSource, RolloutRewarder, RunningMean};
