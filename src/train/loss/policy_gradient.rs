//! REINFORCE surrogate loss.

use ndarray::Array1;
use std::rc::Rc;

use super::{softmax_row, PrecomputedGradBackward};
use crate::autograd::{grad_enabled, Tensor};

/// Reward-weighted negative log-likelihood for one decoding step:
///
/// L = Σ_b weight_b · (−log π(action_b | state_b))
///
/// where `weight_b` is the (detached, possibly baseline-subtracted) reward
/// for the action taken by row b. Minimizing L ascends
/// `E[reward · ∇ log π]` — the score-function estimator; the reward enters
/// only as a coefficient, never as a differentiable quantity. A zero
/// weight (padded position after an early end token) contributes nothing.
pub struct PolicyGradientLoss;

impl PolicyGradientLoss {
    /// Summed weighted NLL over the batch; callers divide by batch size
    /// after accumulating across steps.
    pub fn forward(&self, logits: &Tensor, actions: &[u32], weights: &[f32]) -> Tensor {
        assert_eq!(actions.len(), weights.len(), "actions/weights mismatch");
        assert!(!actions.is_empty(), "empty action column");
        assert_eq!(logits.len() % actions.len(), 0, "logits/actions mismatch");
        let vocab = logits.len() / actions.len();

        let logits_data = logits.data();
        let rows = logits_data.as_slice().expect("contiguous");

        let mut total = 0.0f32;
        let mut grad = vec![0.0f32; logits.len()];
        for (b, (&action, &weight)) in actions.iter().zip(weights).enumerate() {
            if weight == 0.0 {
                continue;
            }
            let row = &rows[b * vocab..(b + 1) * vocab];
            let probs = softmax_row(row);
            total += weight * -(probs[action as usize].max(1e-10)).ln();

            // ∂L/∂logits = weight · (softmax − onehot(action))
            let gr = &mut grad[b * vocab..(b + 1) * vocab];
            for (g, &p) in gr.iter_mut().zip(&probs) {
                *g = weight * p;
            }
            gr[action as usize] -= weight;
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
        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_unit_reward_equals_plain_nll() {
        let logits = Tensor::from_vec(vec![2.0, 1.0, 0.0], false);
        let loss = PolicyGradientLoss.forward(&logits, &[1], &[1.0]);
        let probs = softmax_row(&[2.0, 1.0, 0.0]);
        assert_abs_diff_eq!(loss.data()[0], -probs[1].ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_reward_scales_loss_and_gradient() {
        let logits_a = Tensor::from_vec(vec![2.0, 1.0], true);
        let logits_b = Tensor::from_vec(vec![2.0, 1.0], true);

        let loss_a = PolicyGradientLoss.forward(&logits_a, &[0], &[1.0]);
        let loss_b = PolicyGradientLoss.forward(&logits_b, &[0], &[0.25]);
        assert_abs_diff_eq!(
            loss_b.data()[0],
            0.25 * loss_a.data()[0],
            epsilon = 1e-6
        );

        backward(&loss_a, None);
        backward(&loss_b, None);
        let ga = logits_a.grad().unwrap();
        let gb = logits_b.grad().unwrap();
        for (a, b) in ga.iter().zip(gb.iter()) {
            assert_abs_diff_eq!(*b, 0.25 * a, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zero_weight_contributes_nothing() {
        let logits = Tensor::from_vec(vec![2.0, 1.0, 9.0, 9.0], true);
        let loss = PolicyGradientLoss.forward(&logits, &[0, 1], &[1.0, 0.0]);
        backward(&loss, None);

        let grad = logits.grad().unwrap();
        assert!(grad.as_slice().unwrap()[2..].iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_gradient_pushes_toward_rewarded_action() {
        // Positive reward: gradient on the taken action's logit must be
        // negative (descending the loss raises its probability).
        let logits = Tensor::from_vec(vec![0.0, 0.0, 0.0], true);
        let loss = PolicyGradientLoss.forward(&logits, &[2], &[0.9]);
        backward(&loss, None);

        let grad = logits.grad().unwrap();
        assert!(grad[2] < 0.0);
        assert!(grad[0] > 0.0 && grad[1] > 0.0);
    }

    #[test]
    fn test_negative_advantage_pushes_away() {
        // Baseline-subtracted rewards can be negative; the sign flips.
        let logits = Tensor::from_vec(vec![0.0, 0.0], true);
        let loss = PolicyGradientLoss.forward(&logits, &[0], &[-0.5]);
        backward(&loss, None);
        assert!(logits.grad().unwrap()[0] > 0.0);
    }
}
