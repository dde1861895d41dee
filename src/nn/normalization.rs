//! Group normalization.
//!
//! # References
//!
//! - Wu, Y., & He, K. (2018). Group normalization. ECCV.

use super::init::{constant, zeros};
use super::module::Module;
use crate::tensor::Tensor;

/// Group Normalization (Wu & He, 2018).
///
/// Divides channels into groups and normalizes within each group.
///
/// ```text
/// y = (x - E[x]) / sqrt(Var[x] + eps) * gamma + beta
/// ```
///
/// # Shape
///
/// - Input: `(N, C, *)`
/// - Output: same shape as input
#[derive(Debug)]
pub struct GroupNorm {
    num_groups: usize,
    num_channels: usize,
    eps: f32,
    /// Learnable scale (gamma), shape: [`num_channels`]
    weight: Tensor,
    /// Learnable shift (beta), shape: [`num_channels`]
    bias: Tensor,
}

impl GroupNorm {
    /// Create a new `GroupNorm` layer with eps 1e-5.
    ///
    /// # Panics
    ///
    /// Panics if `num_channels` is not divisible by `num_groups`.
    #[must_use]
    pub fn new(num_groups: usize, num_channels: usize) -> Self {
        Self::with_eps(num_groups, num_channels, 1e-5)
    }

    /// Create `GroupNorm` with custom epsilon.
    ///
    /// # Panics
    ///
    /// Panics if `num_channels` is not divisible by `num_groups`.
    #[must_use]
    pub fn with_eps(num_groups: usize, num_channels: usize, eps: f32) -> Self {
        assert!(
            num_groups > 0 && num_channels % num_groups == 0,
            "num_channels ({num_channels}) must be divisible by num_groups ({num_groups})"
        );

        Self {
            num_groups,
            num_channels,
            eps,
            weight: constant(&[num_channels], 1.0),
            bias: zeros(&[num_channels]),
        }
    }

    /// Get number of groups.
    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Get number of channels.
    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Get epsilon.
    #[must_use]
    pub fn eps(&self) -> f32 {
        self.eps
    }
}

impl Module for GroupNorm {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        assert!(
            shape.len() >= 2,
            "GroupNorm expects at least 2D input, got {}D",
            shape.len()
        );

        let (batch_size, channels) = (shape[0], shape[1]);
        assert_eq!(
            channels, self.num_channels,
            "Expected {} channels, got {}",
            self.num_channels, channels
        );

        let channels_per_group = channels / self.num_groups;
        let spatial_size: usize = shape[2..].iter().product();
        let group_size = channels_per_group * spatial_size;

        let gamma = self.weight.data();
        let beta = self.bias.data();
        let mut output_data = input.data().to_vec();

        // Channels of a group are contiguous, so each group is one slice.
        for (index, group) in output_data.chunks_mut(group_size).enumerate() {
            debug_assert!(index / self.num_groups < batch_size);
            let g = index % self.num_groups;

            let mean = group.iter().sum::<f32>() / group_size as f32;
            let var = group.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / group_size as f32;
            let std_inv = 1.0 / (var + self.eps).sqrt();

            for (c, channel) in group.chunks_mut(spatial_size).enumerate() {
                let channel_idx = g * channels_per_group + c;
                for v in channel.iter_mut() {
                    *v = (*v - mean) * std_inv * gamma[channel_idx] + beta[channel_idx];
                }
            }
        }

        Tensor::from_vec(output_data, shape)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        vec![
            ("weight".to_string(), &self.weight),
            ("bias".to_string(), &self.bias),
        ]
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        vec![
            ("weight".to_string(), &mut self.weight),
            ("bias".to_string(), &mut self.bias),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_group_norm_normalizes_each_group() {
        let norm = GroupNorm::with_eps(2, 4, 1e-6);
        let data: Vec<f32> = (0..32).map(|v| v as f32).collect();
        let y = norm.forward(&Tensor::new(&data, &[2, 4, 2, 2]));
        assert_eq!(y.shape(), &[2, 4, 2, 2]);

        for group in y.data().chunks(8) {
            let mean = group.iter().sum::<f32>() / 8.0;
            let var = group.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 8.0;
            assert!(mean.abs() < 1e-5, "mean {mean}");
            assert!((var - 1.0).abs() < 1e-3, "var {var}");
        }
    }

    #[test]
    fn test_group_norm_affine() {
        let mut norm = GroupNorm::new(1, 2);
        for (name, p) in norm.named_parameters_mut() {
            match name.as_str() {
                "weight" => p.data_mut().copy_from_slice(&[2.0, 2.0]),
                _ => p.data_mut().copy_from_slice(&[1.0, 1.0]),
            }
        }

        // group values [-1, 1] -> normalized [-1, 1] -> affine [-1, 3]
        let y = norm.forward(&Tensor::new(&[-1.0, 1.0], &[1, 2]));
        assert!((y.data()[0] + 1.0).abs() < 1e-3);
        assert!((y.data()[1] - 3.0).abs() < 1e-3);
    }

    #[test]
    #[should_panic(expected = "must be divisible by num_groups")]
    fn test_group_norm_invalid_groups() {
        let _ = GroupNorm::new(3, 4);
    }

    #[test]
    fn test_group_norm_parameters() {
        let norm = GroupNorm::new(32, 64);
        assert_eq!(norm.parameters().len(), 2);
        assert_eq!(norm.parameters()[0].shape(), &[64]);
        assert_eq!(norm.num_groups(), 32);
        assert_eq!(norm.num_channels(), 64);
    }

    proptest! {
        #[test]
        fn prop_group_norm_output_finite(values in proptest::collection::vec(-100.0f32..100.0, 16)) {
            let norm = GroupNorm::with_eps(2, 4, 1e-6);
            let y = norm.forward(&Tensor::new(&values, &[1, 4, 2, 2]));
            prop_assert!(y.all_finite());
        }
    }
}
