//! Tape-based autograd engine.
//!
//! Forward ops record a graph of [`BackwardOp`] nodes; [`backward`] walks
//! it once in reverse topological order. Storage is flat `Array1<f32>`,
//! shapes live in the ops. Recording can be suspended with [`no_grad`]
//! for sampling and validation.

mod backward;
mod context;
pub mod ops;
mod tensor;

pub use backward::{backward, BackwardOp};
pub use context::{grad_enabled, no_grad};
pub use tensor::Tensor;
