//! GRU recurrence cell composed from autograd ops.

use rand::Rng;

use super::xavier_weight;
use crate::autograd::ops::{add, linear, mul, sigmoid, sub, tanh};
use crate::autograd::Tensor;

/// Gated recurrent unit:
///
/// r  = σ(W_ir·x + b_r  + W_hr·h)
/// z  = σ(W_iz·x + b_z  + W_hz·h)
/// n  = tanh(W_in·x + b_in + r ⊙ (W_hn·h + b_hn))
/// h' = (1 − z) ⊙ n + z ⊙ h
///
/// All weights are flat `[hidden, dim]` row-major tensors; the cell
/// processes a whole `[batch, dim]` slab per call.
pub struct GruCell {
    input_dim: usize,
    hidden_dim: usize,
    w_ir: Tensor,
    w_iz: Tensor,
    w_in: Tensor,
    w_hr: Tensor,
    w_hz: Tensor,
    w_hn: Tensor,
    b_r: Tensor,
    b_z: Tensor,
    b_in: Tensor,
    b_hn: Tensor,
    // Constant zero bias for the hidden-side projections of r and z.
    zero_bias: Tensor,
}

impl GruCell {
    /// Create a cell with Xavier-initialized weights and zero biases.
    pub fn new<R: Rng>(input_dim: usize, hidden_dim: usize, rng: &mut R) -> Self {
        Self {
            input_dim,
            hidden_dim,
            w_ir: xavier_weight(rng, hidden_dim, input_dim),
            w_iz: xavier_weight(rng, hidden_dim, input_dim),
            w_in: xavier_weight(rng, hidden_dim, input_dim),
            w_hr: xavier_weight(rng, hidden_dim, hidden_dim),
            w_hz: xavier_weight(rng, hidden_dim, hidden_dim),
            w_hn: xavier_weight(rng, hidden_dim, hidden_dim),
            b_r: Tensor::zeros(hidden_dim, true),
            b_z: Tensor::zeros(hidden_dim, true),
            b_in: Tensor::zeros(hidden_dim, true),
            b_hn: Tensor::zeros(hidden_dim, true),
            zero_bias: Tensor::zeros(hidden_dim, false),
        }
    }

    /// One recurrence step: `x` is `[batch, input_dim]`, `h` is
    /// `[batch, hidden_dim]`; returns the next hidden state.
    pub fn forward(&self, x: &Tensor, h: &Tensor) -> Tensor {
        let e = self.input_dim;
        let hd = self.hidden_dim;

        let r = sigmoid(&add(
            &linear(x, &self.w_ir, &self.b_r, e, hd),
            &linear(h, &self.w_hr, &self.zero_bias, hd, hd),
        ));
        let z = sigmoid(&add(
            &linear(x, &self.w_iz, &self.b_z, e, hd),
            &linear(h, &self.w_hz, &self.zero_bias, hd, hd),
        ));
        let n = tanh(&add(
            &linear(x, &self.w_in, &self.b_in, e, hd),
            &mul(&r, &linear(h, &self.w_hn, &self.b_hn, hd, hd)),
        ));

        // (1 - z) ⊙ n + z ⊙ h, rewritten as n + z ⊙ (h - n)
        add(&n, &mul(&z, &sub(h, &n)))
    }

    /// Hidden dimension.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Trainable parameters, in a stable order.
    pub fn params(&self) -> Vec<Tensor> {
        vec![
            self.w_ir.clone(),
            self.w_iz.clone(),
            self.w_in.clone(),
            self.w_hr.clone(),
            self.w_hz.clone(),
            self.w_hn.clone(),
            self.b_r.clone(),
            self.b_z.clone(),
            self.b_in.clone(),
            self.b_hn.clone(),
        ]
    }

    /// Parameters with checkpoint names under `prefix`.
    pub fn named_params(&self, prefix: &str) -> Vec<(String, Tensor)> {
        let names = [
            "w_ir", "w_iz", "w_in", "w_hr", "w_hz", "w_hn", "b_r", "b_z", "b_in", "b_hn",
        ];
        names
            .iter()
            .zip(self.params())
            .map(|(name, tensor)| (format!("{prefix}.{name}"), tensor))
            .collect()
    }
}
