//! Loss functions for sequence training.
//!
//! All three losses are fused ops: the forward pass computes a scalar and
//! precomputes the logits gradient, which the backward node scales by the
//! upstream gradient. Softmax/sigmoid are computed with max-subtraction
//! and clamped logs, so extreme logits stay finite.

mod bce_with_logits;
mod policy_gradient;
mod sequence_ce;

pub use bce_with_logits::BceWithLogits;
pub use policy_gradient::PolicyGradientLoss;
pub use sequence_ce::SequenceCrossEntropy;

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Backward node for losses whose input gradient is fully precomputed in
/// the forward pass; scales it by the upstream scalar gradient.
pub(crate) struct PrecomputedGradBackward {
    pub input: Tensor,
    pub grad: Array1<f32>,
    pub result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for PrecomputedGradBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.input.requires_grad() {
                self.input.accumulate_grad(&self.grad * grad[0]);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.input.clone()]
    }
}

/// Numerically stable softmax of one logits row.
pub(crate) fn softmax_row(row: &[f32]) -> Vec<f32> {
    let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let total: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}
