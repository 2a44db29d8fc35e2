//! Backward-pass traversal over the recorded computation graph.
//!
//! Each op attaches a [`BackwardOp`] to its result holding the input
//! tensors and the result's gradient cell. The traversal here visits every
//! node exactly once in reverse topological order, so a tensor consumed by
//! several downstream ops (e.g. a hidden state feeding both the next
//! recurrence step and an output projection) has its gradient fully
//! accumulated before its producer runs.

use ndarray::Array1;
use std::collections::HashSet;

use super::tensor::Tensor;

/// One node of the recorded graph: propagates the result's gradient into
/// the gradients of its inputs. `backward` must not recurse.
pub trait BackwardOp {
    /// Accumulate this op's contribution into its inputs' gradients.
    fn backward(&self);

    /// The tensors this op consumed, for graph traversal.
    fn inputs(&self) -> Vec<Tensor>;
}

/// Run the backward pass from `tensor`.
///
/// When `grad_output` is `None` the seed gradient is all ones, the usual
/// case for a scalar loss.
pub fn backward(tensor: &Tensor, grad_output: Option<Array1<f32>>) {
    let seed = grad_output.unwrap_or_else(|| Array1::ones(tensor.len()));
    tensor.accumulate_grad(seed);

    // Reverse topological order: consumers strictly before producers.
    for node in topo_order(tensor) {
        if let Some(op) = node.backward_op() {
            op.backward();
        }
    }
}

/// Iterative post-order DFS over tensors that carry a backward op,
/// reversed so the root comes first.
fn topo_order(root: &Tensor) -> Vec<Tensor> {
    let mut order: Vec<Tensor> = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut stack: Vec<(Tensor, bool)> = vec![(root.clone(), false)];

    while let Some((tensor, expanded)) = stack.pop() {
        if expanded {
            order.push(tensor);
            continue;
        }
        if !visited.insert(tensor.node_id()) {
            continue;
        }
        if let Some(op) = tensor.backward_op() {
            stack.push((tensor.clone(), true));
            for input in op.inputs() {
                if input.backward_op().is_some() && !visited.contains(&input.node_id()) {
                    stack.push((input, false));
                }
            }
        }
    }

    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::ops::{add, mul, scale, sum};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_backward_chain() {
        // loss = sum(2 * x)  =>  dloss/dx = 2
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let y = scale(&x, 2.0);
        let loss = sum(&y);

        backward(&loss, None);

        let grad = x.grad().unwrap();
        for &g in &grad {
            assert_abs_diff_eq!(g, 2.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_backward_fan_out_visits_producer_once() {
        // h feeds two consumers: loss = sum(h + h) => dloss/dh = 2, and the
        // producer of h (scale by 3) must run once with the full gradient,
        // giving dloss/dx = 6, not 3 + 3 + duplicated downstream passes.
        let x = Tensor::from_vec(vec![1.0, 1.0], true);
        let h = scale(&x, 3.0);
        let y = add(&h, &h);
        let loss = sum(&y);

        backward(&loss, None);

        let grad = x.grad().unwrap();
        for &g in &grad {
            assert_abs_diff_eq!(g, 6.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_backward_diamond() {
        // loss = sum((x*2) * (x*3)) = sum(6 x^2) => dloss/dx = 12 x
        let x = Tensor::from_vec(vec![1.0, 2.0], true);
        let a = scale(&x, 2.0);
        let b = scale(&x, 3.0);
        let y = mul(&a, &b);
        let loss = sum(&y);

        backward(&loss, None);

        let grad = x.grad().unwrap();
        assert_abs_diff_eq!(grad[0], 12.0, epsilon = 1e-5);
        assert_abs_diff_eq!(grad[1], 24.0, epsilon = 1e-5);
    }

    #[test]
    fn test_backward_without_graph_is_noop() {
        let x = Tensor::from_vec(vec![1.0], false);
        backward(&x, None);
        // Seed lands on the tensor itself; nothing else to do.
        assert!(x.grad().is_some());
    }
}
