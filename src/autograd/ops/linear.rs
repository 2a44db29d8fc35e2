//! Batched affine map with fused backward.
//!
//! `x` is `[batch, in_dim]` row-major, `w` is `[out_dim, in_dim]` row-major,
//! `b` is `[out_dim]`; the result is `[batch, out_dim]`. One op covers the
//! whole batch so the graph stays small per recurrence step.

use crate::autograd::{grad_enabled, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// `y = x · wᵀ + b` over a flattened batch.
///
/// # Panics
///
/// Panics if the flat lengths are inconsistent with `in_dim`/`out_dim`;
/// shapes are fixed at model construction, so a mismatch is a programming
/// error rather than a data error.
pub fn linear(x: &Tensor, w: &Tensor, b: &Tensor, in_dim: usize, out_dim: usize) -> Tensor {
    assert_eq!(x.len() % in_dim, 0, "input not divisible by in_dim");
    assert_eq!(w.len(), out_dim * in_dim, "weight shape mismatch");
    assert_eq!(b.len(), out_dim, "bias shape mismatch");
    let batch = x.len() / in_dim;

    let mut out = vec![0.0f32; batch * out_dim];
    {
        let x_data = x.data();
        let w_data = w.data();
        let b_data = b.data();
        let xs = x_data.as_slice().expect("contiguous");
        let ws = w_data.as_slice().expect("contiguous");
        let bs = b_data.as_slice().expect("contiguous");

        for bt in 0..batch {
            let row = &xs[bt * in_dim..(bt + 1) * in_dim];
            for o in 0..out_dim {
                let w_row = &ws[o * in_dim..(o + 1) * in_dim];
                let dot: f32 = row.iter().zip(w_row).map(|(a, b)| a * b).sum();
                out[bt * out_dim + o] = dot + bs[o];
            }
        }
    }

    let requires_grad =
        grad_enabled() && (x.requires_grad() || w.requires_grad() || b.requires_grad());
    let result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(LinearBackward {
            x: x.clone(),
            w: w.clone(),
            b: b.clone(),
            in_dim,
            out_dim,
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct LinearBackward {
    x: Tensor,
    w: Tensor,
    b: Tensor,
    in_dim: usize,
    out_dim: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LinearBackward {
    fn backward(&self) {
        let grad_ref = self.result_grad.borrow();
        let Some(grad) = grad_ref.as_ref() else {
            return;
        };
        let gy = grad.as_slice().expect("contiguous");
        let batch = self.x.len() / self.in_dim;

        if self.x.requires_grad() {
            // ∂L/∂x[bt,i] = Σ_o ∂L/∂y[bt,o] * w[o,i]
            let w_data = self.w.data();
            let ws = w_data.as_slice().expect("contiguous");
            let mut gx = vec![0.0f32; batch * self.in_dim];
            for bt in 0..batch {
                for o in 0..self.out_dim {
                    let g = gy[bt * self.out_dim + o];
                    if g == 0.0 {
                        continue;
                    }
                    let w_row = &ws[o * self.in_dim..(o + 1) * self.in_dim];
                    for (i, &wv) in w_row.iter().enumerate() {
                        gx[bt * self.in_dim + i] += g * wv;
                    }
                }
            }
            self.x.accumulate_grad(Array1::from(gx));
        }

        if self.w.requires_grad() {
            // ∂L/∂w[o,i] = Σ_bt ∂L/∂y[bt,o] * x[bt,i]
            let x_data = self.x.data();
            let xs = x_data.as_slice().expect("contiguous");
            let mut gw = vec![0.0f32; self.out_dim * self.in_dim];
            for bt in 0..batch {
                let row = &xs[bt * self.in_dim..(bt + 1) * self.in_dim];
                for o in 0..self.out_dim {
                    let g = gy[bt * self.out_dim + o];
                    if g == 0.0 {
                        continue;
                    }
                    for (i, &xv) in row.iter().enumerate() {
                        gw[o * self.in_dim + i] += g * xv;
                    }
                }
            }
            self.w.accumulate_grad(Array1::from(gw));
        }

        if self.b.requires_grad() {
            // ∂L/∂b[o] = Σ_bt ∂L/∂y[bt,o]
            let mut gb = vec![0.0f32; self.out_dim];
            for bt in 0..batch {
                for o in 0..self.out_dim {
                    gb[o] += gy[bt * self.out_dim + o];
                }
            }
            self.b.accumulate_grad(Array1::from(gb));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.w.clone(), self.b.clone()]
    }
}
