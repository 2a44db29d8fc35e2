//! Optimizer trait.

use crate::autograd::Tensor;

/// Trait for optimization algorithms.
///
/// An optimizer owns its internal moment estimates 1:1 with the parameter
/// list it is stepped with; generator and discriminator each get their own
/// instance, never shared.
pub trait Optimizer {
    /// Apply one update to `params` from their accumulated gradients.
    fn step(&mut self, params: &mut [Tensor]);

    /// Clear all parameter gradients.
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Current learning rate.
    fn lr(&self) -> f32;

    /// Set the learning rate.
    fn set_lr(&mut self, lr: f32);
}
