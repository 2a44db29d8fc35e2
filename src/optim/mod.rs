//! Optimization algorithms and gradient utilities.

mod adam;
mod clip;
mod optimizer;

pub use adam::{Adam, AdamState};
pub use clip::clip_grad_norm;
pub use optimizer::Optimizer;
