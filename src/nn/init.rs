//! Weight initialization functions.
//!
//! - Xavier/Glorot (Glorot & Bengio, 2010) - for tanh/sigmoid activations
//! - Kaiming/He (He et al., 2015) - for `ReLU`-family activations
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.
//! - He, K., et al. (2015). Delving deep into rectifiers: Surpassing human-level
//!   performance on `ImageNet` classification. ICCV.

use crate::tensor::{Generator, Tensor};

/// Xavier uniform initialization (Glorot & Bengio, 2010).
///
/// Samples from U(-a, a) where a = sqrt(6 / (`fan_in` + `fan_out`)).
///
/// # Arguments
///
/// * `shape` - Shape of the tensor to initialize
/// * `fan_in` - Number of input features
/// * `fan_out` - Number of output features
/// * `seed` - Optional random seed for reproducibility
#[must_use]
pub fn xavier_uniform(shape: &[usize], fan_in: usize, fan_out: usize, seed: Option<u64>) -> Tensor {
    let a = (6.0 / (fan_in + fan_out) as f32).sqrt();
    uniform(shape, -a, a, seed)
}

/// Kaiming uniform initialization (He et al., 2015).
///
/// Samples from U(-bound, bound) where bound = sqrt(6 / `fan_in`).
#[must_use]
pub fn kaiming_uniform(shape: &[usize], fan_in: usize, seed: Option<u64>) -> Tensor {
    let bound = (6.0 / fan_in as f32).sqrt();
    uniform(shape, -bound, bound, seed)
}

/// Uniform distribution initialization.
///
/// Samples from U(low, high).
pub(crate) fn uniform(shape: &[usize], low: f32, high: f32, seed: Option<u64>) -> Tensor {
    let mut generator = match seed {
        Some(s) => Generator::manual_seed(s),
        None => Generator::from_entropy(),
    };
    generator.uniform(shape, low, high)
}

/// Constant initialization.
pub(crate) fn constant(shape: &[usize], value: f32) -> Tensor {
    Tensor::full(shape, value)
}

/// Zeros initialization.
pub(crate) fn zeros(shape: &[usize]) -> Tensor {
    constant(shape, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xavier_uniform_bounds() {
        let t = xavier_uniform(&[64, 32], 32, 64, Some(42));
        let a = (6.0 / 96.0_f32).sqrt();
        assert!(t.data().iter().all(|&v| v >= -a && v < a));
    }

    #[test]
    fn test_kaiming_uniform_bounds() {
        let t = kaiming_uniform(&[8, 4, 3, 3], 36, Some(1));
        let bound = (6.0 / 36.0_f32).sqrt();
        assert_eq!(t.shape(), &[8, 4, 3, 3]);
        assert!(t.data().iter().all(|&v| v.abs() <= bound));
    }

    #[test]
    fn test_seeded_init_reproducible() {
        let a = kaiming_uniform(&[10], 10, Some(5));
        let b = kaiming_uniform(&[10], 10, Some(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_and_zeros() {
        assert!(constant(&[3], 2.5).data().iter().all(|&v| v == 2.5));
        assert!(zeros(&[3]).data().iter().all(|&v| v == 0.0));
    }
}
