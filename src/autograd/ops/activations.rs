//! Activation autograd operations: sigmoid, tanh.

use crate::autograd::{grad_enabled, BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Scalar logistic function.
pub fn sigmoid_scalar(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Elementwise logistic sigmoid.
pub fn sigmoid(a: &Tensor) -> Tensor {
    let data = a.data().mapv(sigmoid_scalar);
    let requires_grad = grad_enabled() && a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(SigmoidBackward {
            a: a.clone(),
            output: result.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct SigmoidBackward {
    a: Tensor,
    output: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SigmoidBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂σ/∂x = σ(x) * (1 - σ(x)), reusing the forward output
                let out = self.output.data();
                let grad_a: Array1<f32> = grad
                    .iter()
                    .zip(out.iter())
                    .map(|(&g, &s)| g * s * (1.0 - s))
                    .collect();
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Elementwise hyperbolic tangent.
pub fn tanh(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::tanh);
    let requires_grad = grad_enabled() && a.requires_grad();
    let result = Tensor::new(data, requires_grad);

    if requires_grad {
        result.set_backward_op(Rc::new(TanhBackward {
            a: a.clone(),
            output: result.clone(),
            result_grad: result.grad_cell(),
        }));
    }
    result
}

struct TanhBackward {
    a: Tensor,
    output: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for TanhBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂tanh/∂x = 1 - tanh²(x)
                let out = self.output.data();
                let grad_a: Array1<f32> = grad
                    .iter()
                    .zip(out.iter())
                    .map(|(&g, &t)| g * (1.0 - t * t))
                    .collect();
                self.a.accumulate_grad(grad_a);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}
