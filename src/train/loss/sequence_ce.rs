//! Padding-masked cross-entropy for one decoding step.

use ndarray::Array1;
use std::rc::Rc;

use super::{softmax_row, PrecomputedGradBackward};
use crate::autograd::{grad_enabled, Tensor};

/// Cross-entropy of a `[batch, vocab]` logits slab against one target
/// token per row, with positions holding the pad token excluded — the
/// `ignore_index` discipline of the MLE loss.
///
/// `forward` returns the summed loss plus the number of contributing
/// tokens; callers accumulate across decoding steps and divide once, so
/// the reported loss is a mean over real (non-pad) tokens.
pub struct SequenceCrossEntropy {
    pub pad_idx: u32,
}

impl SequenceCrossEntropy {
    /// Create the loss with the pad id to ignore.
    pub fn new(pad_idx: u32) -> Self {
        Self { pad_idx }
    }

    /// Summed NLL over non-pad rows and the count of such rows.
    pub fn forward(&self, logits: &Tensor, targets: &[u32]) -> (Tensor, usize) {
        assert!(!targets.is_empty(), "empty target column");
        assert_eq!(logits.len() % targets.len(), 0, "logits/targets mismatch");
        let vocab = logits.len() / targets.len();

        let logits_data = logits.data();
        let rows = logits_data.as_slice().expect("contiguous");

        let mut total = 0.0f32;
        let mut count = 0usize;
        let mut grad = vec![0.0f32; logits.len()];

        for (b, &target) in targets.iter().enumerate() {
            if target == self.pad_idx {
                continue;
            }
            let row = &rows[b * vocab..(b + 1) * vocab];
            let probs = softmax_row(row);
            total += -(probs[target as usize].max(1e-10)).ln();
            count += 1;

            // ∂NLL/∂logits = softmax - onehot(target)
            let gr = &mut grad[b * vocab..(b + 1) * vocab];
            gr.copy_from_slice(&probs);
            gr[target as usize] -= 1.0;
        }
        drop(logits_data);

        let requires_grad = grad_enabled() && logits.requires_grad();
        let loss = Tensor::from_vec(vec![total], requires_grad);
        if requires_grad {
            loss.set_backward_op(Rc::new(PrecomputedGradBackward {
                input: logits.clone(),
                grad: Array1::from(grad),
                result_grad: loss.grad_cell(),
            }));
        }
        (loss, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_uniform_logits_give_log_vocab() {
        let ce = SequenceCrossEntropy::new(0);
        let logits = Tensor::from_vec(vec![1.0; 4], false);
        let (loss, count) = ce.forward(&logits, &[2]);
        assert_eq!(count, 1);
        assert_abs_diff_eq!(loss.data()[0], 4.0f32.ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_pad_targets_are_ignored() {
        let ce = SequenceCrossEntropy::new(0);
        // Two rows; the second targets pad and must contribute nothing.
        let logits = Tensor::from_vec(vec![1.0, 2.0, 3.0, 9.0, 9.0, 9.0], true);
        let (loss, count) = ce.forward(&logits, &[2, 0]);
        assert_eq!(count, 1);

        backward(&loss, None);
        let grad = logits.grad().unwrap();
        // Pad row's gradient is exactly zero.
        assert!(grad.as_slice().unwrap()[3..].iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_gradient_is_softmax_minus_onehot() {
        let ce = SequenceCrossEntropy::new(0);
        let logits = Tensor::from_vec(vec![2.0, 1.0, 0.5], true);
        let (loss, _) = ce.forward(&logits, &[1]);
        backward(&loss, None);

        let grad = logits.grad().unwrap();
        let probs = softmax_row(&[2.0, 1.0, 0.5]);
        assert_abs_diff_eq!(grad[0], probs[0], epsilon = 1e-6);
        assert_abs_diff_eq!(grad[1], probs[1] - 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[2], probs[2], epsilon = 1e-6);
    }

    #[test]
    fn test_extreme_logits_stay_finite() {
        let ce = SequenceCrossEntropy::new(0);
        let logits = Tensor::from_vec(vec![500.0, -500.0, 88.0], false);
        let (loss, _) = ce.forward(&logits, &[1]);
        assert!(loss.data()[0].is_finite());
    }

    #[test]
    fn test_perfect_prediction_approaches_zero() {
        let ce = SequenceCrossEntropy::new(0);
        let logits = Tensor::from_vec(vec![-50.0, 50.0, -50.0], false);
        let (loss, _) = ce.forward(&logits, &[1]);
        assert!(loss.data()[0] < 1e-3);
    }
}
