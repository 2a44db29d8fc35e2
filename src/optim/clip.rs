//! Gradient clipping by global norm.

use crate::autograd::Tensor;

/// Clip gradients so their global norm does not exceed `max_norm`.
///
/// 1. global_norm = sqrt(Σ ‖grad_p‖²) over all parameters
/// 2. if global_norm > max_norm, scale every gradient by
///    max_norm / global_norm, preserving relative magnitudes
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let mut total_norm_sq = 0.0;
    for param in params.iter() {
        if let Some(grad) = param.grad() {
            total_norm_sq += grad.iter().map(|&g| g * g).sum::<f32>();
        }
    }
    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for param in params.iter_mut() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * clip_coef);
            }
        }
    }

    global_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_no_clipping_below_threshold() {
        let mut params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];
        params[0].set_grad(arr1(&[0.3, 0.4])); // norm 0.5

        let norm = clip_grad_norm(&mut params, 1.0);
        assert_abs_diff_eq!(norm, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(params[0].grad().unwrap()[0], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_clipping_scales_gradients() {
        let mut params = vec![Tensor::from_vec(vec![1.0, 2.0], true)];
        params[0].set_grad(arr1(&[3.0, 4.0])); // norm 5

        let norm = clip_grad_norm(&mut params, 1.0);
        assert_abs_diff_eq!(norm, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(params[0].grad().unwrap()[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(params[0].grad().unwrap()[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_clipping_spans_parameters() {
        let mut params = vec![
            Tensor::from_vec(vec![0.0], true),
            Tensor::from_vec(vec![0.0], true),
        ];
        params[0].set_grad(arr1(&[10.0]));
        params[1].set_grad(arr1(&[5.0]));

        clip_grad_norm(&mut params, 1.0);
        let g0 = params[0].grad().unwrap()[0];
        let g1 = params[1].grad().unwrap()[0];
        // Relative magnitudes preserved.
        assert_abs_diff_eq!(g0 / g1, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_params_without_grad_ignored() {
        let mut params = vec![Tensor::from_vec(vec![1.0], false)];
        let norm = clip_grad_norm(&mut params, 1.0);
        assert_abs_diff_eq!(norm, 0.0, epsilon = 1e-9);
    }
}
