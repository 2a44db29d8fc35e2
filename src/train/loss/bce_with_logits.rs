//! Binary cross-entropy on logits.

use ndarray::Array1;
use std::rc::Rc;

use super::PrecomputedGradBackward;
use crate::autograd::ops::sigmoid_scalar;
use crate::autograd::{grad_enabled, Tensor};

/// Mean binary cross-entropy computed from raw logits:
///
/// L = mean( max(x, 0) − x·y + ln(1 + e^(−|x|)) )
///
/// the log-sum-exp form that never evaluates `ln` near zero, so confident
/// logits cannot produce infinities. Targets are probabilities in [0, 1]
/// (label smoothing is applied by the caller).
pub struct BceWithLogits;

impl BceWithLogits {
    /// Mean BCE over the batch.
    pub fn forward(&self, logits: &Tensor, targets: &[f32]) -> Tensor {
        assert_eq!(logits.len(), targets.len(), "logits/targets mismatch");
        let n = targets.len() as f32;

        let logits_data = logits.data();
        let mut total = 0.0f32;
        let mut grad = Vec::with_capacity(targets.len());
        for (&x, &y) in logits_data.iter().zip(targets) {
            total += x.max(0.0) - x * y + (-x.abs()).exp().ln_1p();
            // ∂L/∂x = (σ(x) − y) / n
            grad.push((sigmoid_scalar(x) - y) / n);
        }
        drop(logits_data);

        let requires_grad = grad_enabled() && logits.requires_grad();
        let loss = Tensor::from_vec(vec![total / n], requires_grad);
        if requires_grad {
            loss.set_backward_op(Rc::new(PrecomputedGradBackward {
                input: logits.clone(),
                grad: Array1::from(grad),
                result_grad: loss.grad_cell(),
            }));
        }
        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_zero_logit_gives_ln2() {
        let loss = BceWithLogits.forward(&Tensor::from_vec(vec![0.0], false), &[1.0]);
        assert_abs_diff_eq!(loss.data()[0], 2.0f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_confident_correct_is_near_zero() {
        let loss = BceWithLogits.forward(&Tensor::from_vec(vec![20.0, -20.0], false), &[1.0, 0.0]);
        assert!(loss.data()[0] < 1e-6);
    }

    #[test]
    fn test_confident_wrong_is_large_but_finite() {
        let loss = BceWithLogits.forward(&Tensor::from_vec(vec![80.0], false), &[0.0]);
        assert!(loss.data()[0] > 10.0);
        assert!(loss.data()[0].is_finite());
    }

    #[test]
    fn test_gradient_is_sigmoid_minus_target_over_n() {
        let logits = Tensor::from_vec(vec![0.5, -1.0], true);
        let loss = BceWithLogits.forward(&logits, &[1.0, 0.0]);
        backward(&loss, None);

        let grad = logits.grad().unwrap();
        assert_abs_diff_eq!(grad[0], (sigmoid_scalar(0.5) - 1.0) / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[1], sigmoid_scalar(-1.0) / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_extreme_logits_stay_finite() {
        let logits = Tensor::from_vec(vec![1000.0, -1000.0], false);
        let loss = BceWithLogits.forward(&logits, &[0.0, 1.0]);
        assert!(loss.data()[0].is_finite());
    }
}
