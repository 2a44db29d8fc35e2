//! Generator and discriminator models.
//!
//! Both models share the same skeleton: a token embedding feeding a GRU
//! recurrence, with a linear head on top: a full vocabulary softmax for
//! the generator, a single realness logit for the discriminator.

mod config;
mod discriminator;
mod generator;
mod gru;

pub use config::{DiscriminatorConfig, GeneratorConfig};
pub use discriminator::Discriminator;
pub use generator::{Generator, SampledSequences};
pub use gru::GruCell;

use crate::autograd::Tensor;
use rand::Rng;

/// One draw from N(0, std²) via the Box-Muller transform.
pub(crate) fn sample_normal<R: Rng>(rng: &mut R, std: f64) -> f32 {
    let u1: f64 = rng.random::<f64>().max(1e-10);
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (z * std) as f32
}

/// Xavier-initialized `[rows, cols]` weight tensor (flat, row-major).
pub(crate) fn xavier_weight<R: Rng>(rng: &mut R, rows: usize, cols: usize) -> Tensor {
    let std = (2.0 / (rows + cols) as f64).sqrt();
    Tensor::from_vec(
        (0..rows * cols).map(|_| sample_normal(rng, std)).collect(),
        true,
    )
}

/// Numerically stable log-softmax of one logits row.
pub(crate) fn log_softmax_row(row: &[f32]) -> Vec<f32> {
    let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let log_sum: f32 = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln();
    row.iter().map(|&v| v - max - log_sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_xavier_weight_shape_and_spread() {
        let mut rng = StdRng::seed_from_u64(42);
        let w = xavier_weight(&mut rng, 10, 20);
        assert_eq!(w.len(), 200);
        assert!(w.requires_grad());

        let mean: f32 = w.data().iter().sum::<f32>() / 200.0;
        assert!(mean.abs() < 0.1);
        assert!(w.data().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_log_softmax_normalizes() {
        let log_probs = log_softmax_row(&[1.0, 2.0, 3.0]);
        let total: f32 = log_probs.iter().map(|&lp| lp.exp()).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);
        assert!(log_probs.iter().all(|&lp| lp <= 0.0));
    }

    #[test]
    fn test_log_softmax_stable_at_extremes() {
        let log_probs = log_softmax_row(&[1000.0, 999.0, -1000.0]);
        assert!(log_probs.iter().all(|lp| lp.is_finite()));
    }
}
