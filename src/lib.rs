//! # seqgan
//!
//! Adversarial training for discrete sequence generation. A GRU generator
//! is pretrained with maximum likelihood, a GRU discriminator is
//! pretrained to separate real data from the generator's samples, and the
//! adversarial phase then refines the generator with REINFORCE updates:
//! sampled sequences are priced per decoding step by Monte-Carlo rollouts
//! scored with the discriminator, and the resulting rewards weight the
//! log-probabilities of the sampled actions. Sampling itself is never
//! differentiated; the score-function estimator carries the signal.
//!
//! The crate is organized as:
//! - [`autograd`]: flat-tensor tape autograd (the only tensor machinery
//!   the training protocol needs)
//! - [`model`]: generator policy and discriminator classifier
//! - [`data`]: datasets, padding, batching
//! - [`train`]: losses, rollout reward estimation, the adversarial
//!   trainer, and the three training pipelines
//! - [`optim`]: Adam and gradient clipping
//! - [`checkpoint`] / [`record`]: best-snapshot persistence and the
//!   per-epoch metric log
//!
//! # Example
//!
//! ```no_run
//! use seqgan::train::{run_adversarial, TrainConfig};
//!
//! let config = TrainConfig::from_file("config.json").unwrap();
//! run_adversarial(&config, "data".as_ref(), "checkpoints".as_ref()).unwrap();
//! ```

pub mod autograd;
pub mod checkpoint;
pub mod data;
pub mod error;
pub mod model;
pub mod optim;
pub mod record;
pub mod train;

pub use autograd::Tensor;
pub use error::{Result, SeqGanError};
