//! Graph-recording mode.
//!
//! Sampling and validation run the same forward code as training but must
//! not record a graph: rewards are non-differentiable by design (the
//! score-function estimator substitutes for differentiating through the
//! sample). `no_grad` disables recording for the duration of a closure.

use std::cell::Cell;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether ops currently record backward nodes.
pub fn grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Run `f` with graph recording disabled, restoring the previous mode
/// afterwards (nesting is fine).
pub fn no_grad<T>(f: impl FnOnce() -> T) -> T {
    GRAD_ENABLED.with(|cell| {
        let previous = cell.replace(false);
        let result = f();
        cell.set(previous);
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::ops::scale;
    use crate::autograd::Tensor;

    #[test]
    fn test_grad_enabled_by_default() {
        assert!(grad_enabled());
    }

    #[test]
    fn test_no_grad_suppresses_graph() {
        let x = Tensor::from_vec(vec![1.0], true);
        let y = no_grad(|| scale(&x, 2.0));
        assert!(y.backward_op().is_none());
        assert!(!y.requires_grad());
    }

    #[test]
    fn test_no_grad_restores_mode() {
        no_grad(|| assert!(!grad_enabled()));
        assert!(grad_enabled());
    }

    #[test]
    fn test_no_grad_nests() {
        no_grad(|| {
            no_grad(|| assert!(!grad_enabled()));
            assert!(!grad_enabled());
        });
        assert!(grad_enabled());
    }
}
