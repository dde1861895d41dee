//! Residual and resampling blocks for convolutional encoders/decoders.
//!
//! # References
//!
//! - He, K., et al. (2016). Deep residual learning for image recognition. CVPR.

use super::activation::Activation;
use super::conv::Conv2d;
use super::module::{scoped, Module};
use super::normalization::GroupNorm;
use crate::tensor::Tensor;

/// Pre-activation residual block without time embedding.
///
/// ```text
/// h = conv1(act(norm1(x)))
/// h = conv2(act(norm2(h)))
/// y = shortcut(x) + h
/// ```
///
/// `shortcut` is a 1x1 convolution (`conv_shortcut`) when the channel count
/// changes and the identity otherwise.
#[derive(Debug)]
pub struct ResnetBlock2D {
    norm1: GroupNorm,
    conv1: Conv2d,
    norm2: GroupNorm,
    conv2: Conv2d,
    conv_shortcut: Option<Conv2d>,
    activation: Activation,
}

impl ResnetBlock2D {
    /// Create a residual block.
    ///
    /// # Panics
    ///
    /// Panics if either channel count is not divisible by `groups`.
    #[must_use]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        groups: usize,
        eps: f32,
        activation: Activation,
    ) -> Self {
        let conv_shortcut =
            (in_channels != out_channels).then(|| Conv2d::new(in_channels, out_channels, 1));

        Self {
            norm1: GroupNorm::with_eps(groups, in_channels, eps),
            conv1: Conv2d::with_padding(in_channels, out_channels, 3, 1),
            norm2: GroupNorm::with_eps(groups, out_channels, eps),
            conv2: Conv2d::with_padding(out_channels, out_channels, 3, 1),
            conv_shortcut,
            activation,
        }
    }

    /// Output channel count.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.conv2.out_channels()
    }
}

impl Module for ResnetBlock2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        let h = self.norm1.forward(input);
        let h = self.conv1.forward(&self.activation.forward(&h));
        let h = self.norm2.forward(&h);
        let h = self.conv2.forward(&self.activation.forward(&h));

        match &self.conv_shortcut {
            Some(shortcut) => shortcut.forward(input).add(&h),
            None => input.add(&h),
        }
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = scoped("norm1", self.norm1.named_parameters());
        params.extend(scoped("conv1", self.conv1.named_parameters()));
        params.extend(scoped("norm2", self.norm2.named_parameters()));
        params.extend(scoped("conv2", self.conv2.named_parameters()));
        if let Some(shortcut) = &self.conv_shortcut {
            params.extend(scoped("conv_shortcut", shortcut.named_parameters()));
        }
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = scoped("norm1", self.norm1.named_parameters_mut());
        params.extend(scoped("conv1", self.conv1.named_parameters_mut()));
        params.extend(scoped("norm2", self.norm2.named_parameters_mut()));
        params.extend(scoped("conv2", self.conv2.named_parameters_mut()));
        if let Some(shortcut) = &mut self.conv_shortcut {
            params.extend(scoped("conv_shortcut", shortcut.named_parameters_mut()));
        }
        params
    }
}

/// Halves the spatial resolution with a stride-2 3x3 convolution.
///
/// The input is padded by one pixel on the right and bottom only, so an even
/// `H x W` map becomes exactly `H/2 x W/2`.
#[derive(Debug)]
pub struct Downsample2D {
    conv: Conv2d,
}

impl Downsample2D {
    /// Create a downsampler keeping the channel count.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self {
            conv: Conv2d::with_stride(channels, channels, 3, 2),
        }
    }
}

impl Module for Downsample2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.conv.forward(&input.pad2d(0, 1, 0, 1))
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        scoped("conv", self.conv.named_parameters())
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        scoped("conv", self.conv.named_parameters_mut())
    }
}

/// Doubles the spatial resolution (nearest neighbour) followed by a 3x3 convolution.
#[derive(Debug)]
pub struct Upsample2D {
    conv: Conv2d,
}

impl Upsample2D {
    /// Create an upsampler keeping the channel count.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self {
            conv: Conv2d::with_padding(channels, channels, 3, 1),
        }
    }
}

impl Module for Upsample2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        self.conv.forward(&input.upsample_nearest2d(2))
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        scoped("conv", self.conv.named_parameters())
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        scoped("conv", self.conv.named_parameters_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Generator;

    #[test]
    fn test_resnet_block_same_channels() {
        let block = ResnetBlock2D::new(8, 8, 4, 1e-6, Activation::Silu);
        let x = Generator::manual_seed(0).randn(&[2, 8, 6, 6]);
        assert_eq!(block.forward(&x).shape(), &[2, 8, 6, 6]);

        let names: Vec<String> = block.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert!(!names.iter().any(|n| n.starts_with("conv_shortcut")));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_resnet_block_channel_change_has_shortcut() {
        let block = ResnetBlock2D::new(4, 8, 4, 1e-6, Activation::Silu);
        let x = Generator::manual_seed(0).randn(&[1, 4, 5, 5]);
        assert_eq!(block.forward(&x).shape(), &[1, 8, 5, 5]);
        assert_eq!(block.out_channels(), 8);

        let names: Vec<String> = block.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"conv_shortcut.weight".to_string()));
    }

    #[test]
    fn test_resnet_block_zero_residual_is_identity() {
        let mut block = ResnetBlock2D::new(4, 4, 2, 1e-6, Activation::Silu);
        for (name, p) in block.named_parameters_mut() {
            if name.starts_with("conv2") {
                p.data_mut().fill(0.0);
            }
        }
        let x = Generator::manual_seed(2).randn(&[1, 4, 3, 3]);
        assert_eq!(block.forward(&x), x);
    }

    #[test]
    fn test_downsample_halves() {
        let down = Downsample2D::new(4);
        let y = down.forward(&Tensor::ones(&[1, 4, 32, 32]));
        assert_eq!(y.shape(), &[1, 4, 16, 16]);
    }

    #[test]
    fn test_upsample_doubles() {
        let up = Upsample2D::new(4);
        let y = up.forward(&Tensor::ones(&[2, 4, 8, 8]));
        assert_eq!(y.shape(), &[2, 4, 16, 16]);

        let names: Vec<String> = up.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["conv.weight", "conv.bias"]);
    }
}
