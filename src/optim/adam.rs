//! Adam optimizer with checkpointable state.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::autograd::Tensor;

/// Adam optimizer.
///
/// m_t = β1·m_{t-1} + (1-β1)·g,  v_t = β2·v_{t-1} + (1-β2)·g²
/// θ_t = θ_{t-1} - lr_t · m_t / (√v_t + ε)
///
/// with lr_t carrying the bias correction √(1-β2ᵗ)/(1-β1ᵗ).
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<Array1<f32>>>, // First moment
    v: Vec<Option<Array1<f32>>>, // Second moment
}

/// Serializable snapshot of an [`Adam`] instance, saved alongside model
/// weights so a resumed run continues with identical updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamState {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub step_count: u64,
    pub first_moments: Vec<Option<Vec<f32>>>,
    pub second_moments: Vec<Option<Vec<f32>>>,
}

impl Adam {
    /// Create a new Adam optimizer.
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Adam with the standard β/ε defaults.
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Number of steps taken so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    fn ensure_moments(&mut self, params: &[Tensor]) {
        if self.m.is_empty() {
            self.m = params.iter().map(|_| None).collect();
            self.v = params.iter().map(|_| None).collect();
        }
    }

    /// Snapshot the full optimizer state for checkpointing.
    pub fn state(&self) -> AdamState {
        AdamState {
            lr: self.lr,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            step_count: self.t,
            first_moments: self
                .m
                .iter()
                .map(|m| m.as_ref().map(Array1::to_vec))
                .collect(),
            second_moments: self
                .v
                .iter()
                .map(|v| v.as_ref().map(Array1::to_vec))
                .collect(),
        }
    }

    /// Rebuild an optimizer from a checkpointed state.
    pub fn from_state(state: AdamState) -> Self {
        Self {
            lr: state.lr,
            beta1: state.beta1,
            beta2: state.beta2,
            epsilon: state.epsilon,
            t: state.step_count,
            m: state
                .first_moments
                .into_iter()
                .map(|m| m.map(Array1::from))
                .collect(),
            v: state
                .second_moments
                .into_iter()
                .map(|v| v.map(Array1::from))
                .collect(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction folded into the step size
        let lr_t = self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)));

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad() {
                let m_t = if let Some(m) = &self.m[i] {
                    m * self.beta1 + &grad * (1.0 - self.beta1)
                } else {
                    &grad * (1.0 - self.beta1)
                };

                let grad_sq = &grad * &grad;
                let v_t = if let Some(v) = &self.v[i] {
                    v * self.beta2 + &grad_sq * (1.0 - self.beta2)
                } else {
                    &grad_sq * (1.0 - self.beta2)
                };

                let update = &m_t / &(v_t.mapv(f32::sqrt) + self.epsilon) * lr_t;
                // Compute before borrowing mutably: data() and data_mut()
                // share one cell.
                let new_data = &*param.data() - &update;
                *param.data_mut() = new_data;

                self.m[i] = Some(m_t);
                self.v[i] = Some(v_t);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_adam_quadratic_convergence() {
        // f(x) = x², ∇f = 2x: all coordinates should approach 0.
        let mut params = vec![Tensor::from_vec(vec![5.0, -3.0, 2.0], true)];
        let mut optimizer = Adam::default_params(0.1);

        for _ in 0..200 {
            let grad = params[0].data().mapv(|x| 2.0 * x);
            params[0].set_grad(grad);
            optimizer.step(&mut params);
        }

        for &val in params[0].data().iter() {
            assert!(val.abs() < 0.1, "value {val} did not converge");
        }
    }

    #[test]
    fn test_adam_skips_params_without_grad() {
        let mut params = vec![Tensor::from_vec(vec![1.0], true)];
        let mut optimizer = Adam::default_params(0.1);
        optimizer.step(&mut params);
        assert_abs_diff_eq!(params[0].data()[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_adam_state_roundtrip() {
        let mut params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];
        let mut optimizer = Adam::default_params(0.01);

        params[0].set_grad(ndarray::arr1(&[0.3, -0.3]));
        optimizer.step(&mut params);

        let state = optimizer.state();
        let restored = Adam::from_state(state);
        assert_eq!(restored.step_count(), 1);
        assert_eq!(restored.lr(), 0.01);

        // The restored optimizer must continue exactly where the original
        // left off.
        let mut a = optimizer;
        let mut b = restored;
        let params_a = vec![Tensor::from_vec(params[0].to_vec(), true)];
        let params_b = vec![Tensor::from_vec(params[0].to_vec(), true)];
        let mut params_a = params_a;
        let mut params_b = params_b;
        params_a[0].set_grad(ndarray::arr1(&[0.1, 0.1]));
        params_b[0].set_grad(ndarray::arr1(&[0.1, 0.1]));
        a.step(&mut params_a);
        b.step(&mut params_b);
        assert_eq!(params_a[0].to_vec(), params_b[0].to_vec());
    }

    #[test]
    fn test_set_lr() {
        let mut optimizer = Adam::default_params(0.001);
        assert_eq!(optimizer.lr(), 0.001);
        optimizer.set_lr(0.01);
        assert_eq!(optimizer.lr(), 0.01);
    }
}
