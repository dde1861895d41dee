//! Spatial self-attention over the pixels of a feature map.
//!
//! Used in the middle block of the autoencoder. Every spatial position is a
//! token whose features are the channel values:
//!
//! ```text
//! h = GroupNorm(x)                 [N, C, H, W]
//! t = tokens(h)                    [N, H*W, C]
//! a = softmax(q k^T / sqrt(d)) v   per head
//! y = to_out(a) + x
//! ```
//!
//! # References
//!
//! - Vaswani, A., et al. (2017). Attention is all you need. NeurIPS.

use super::linear::Linear;
use super::module::{scoped, Module};
use super::normalization::GroupNorm;
use crate::tensor::Tensor;

/// Residual multi-head self-attention over `[N, C, H, W]` feature maps.
///
/// Parameter names follow the checkpoint layout: `group_norm`, `to_q`,
/// `to_k`, `to_v`, `to_out.0`.
#[derive(Debug)]
pub struct SpatialAttention {
    group_norm: GroupNorm,
    to_q: Linear,
    to_k: Linear,
    to_v: Linear,
    to_out: Linear,
    channels: usize,
    num_heads: usize,
}

impl SpatialAttention {
    /// Create an attention block.
    ///
    /// `head_dim` equal to `channels` gives a single head, which is what the
    /// autoencoder uses.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is not a multiple of `head_dim` or of `norm_groups`.
    #[must_use]
    pub fn new(channels: usize, head_dim: usize, norm_groups: usize, eps: f32) -> Self {
        assert!(
            head_dim > 0 && channels % head_dim == 0,
            "channels ({channels}) must be a multiple of head_dim ({head_dim})"
        );

        Self {
            group_norm: GroupNorm::with_eps(norm_groups, channels, eps),
            to_q: Linear::new(channels, channels),
            to_k: Linear::new(channels, channels),
            to_v: Linear::new(channels, channels),
            to_out: Linear::new(channels, channels),
            channels,
            num_heads: channels / head_dim,
        }
    }

    /// Number of attention heads.
    #[must_use]
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    fn attend(&self, q: &Tensor, k: &Tensor, v: &Tensor) -> Tensor {
        let (batch, tokens, channels) = (q.shape()[0], q.shape()[1], q.shape()[2]);
        let head_dim = channels / self.num_heads;
        let scale = 1.0 / (head_dim as f32).sqrt();
        let (q, k, v) = (q.data(), k.data(), v.data());

        let mut out = vec![0.0; q.len()];
        let mut scores = vec![0.0; tokens];

        for b in 0..batch {
            let base = b * tokens * channels;
            for h in 0..self.num_heads {
                let off = h * head_dim;
                for i in 0..tokens {
                    let qi = &q[base + i * channels + off..][..head_dim];

                    let mut max = f32::NEG_INFINITY;
                    for (j, s) in scores.iter_mut().enumerate() {
                        let kj = &k[base + j * channels + off..][..head_dim];
                        *s = qi.iter().zip(kj).map(|(a, b)| a * b).sum::<f32>() * scale;
                        max = max.max(*s);
                    }

                    let mut denom = 0.0;
                    for s in &mut scores {
                        *s = (*s - max).exp();
                        denom += *s;
                    }

                    let oi = &mut out[base + i * channels + off..][..head_dim];
                    for (j, s) in scores.iter().enumerate() {
                        let weight = s / denom;
                        let vj = &v[base + j * channels + off..][..head_dim];
                        for (o, vv) in oi.iter_mut().zip(vj) {
                            *o += weight * vv;
                        }
                    }
                }
            }
        }

        Tensor::from_vec(out, &[batch, tokens, channels])
    }
}

impl Module for SpatialAttention {
    fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(
            input.ndim(),
            4,
            "SpatialAttention expects 4D input [N, C, H, W], got {}D",
            input.ndim()
        );
        assert_eq!(
            input.shape()[1],
            self.channels,
            "Expected {} channels, got {}",
            self.channels,
            input.shape()[1]
        );
        let (height, width) = (input.shape()[2], input.shape()[3]);

        let tokens = self.group_norm.forward(input).to_channels_last();
        let q = self.to_q.forward(&tokens);
        let k = self.to_k.forward(&tokens);
        let v = self.to_v.forward(&tokens);

        let attended = self.to_out.forward(&self.attend(&q, &k, &v));
        attended.to_channels_first(height, width).add(input)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = scoped("group_norm", self.group_norm.named_parameters());
        params.extend(scoped("to_q", self.to_q.named_parameters()));
        params.extend(scoped("to_k", self.to_k.named_parameters()));
        params.extend(scoped("to_v", self.to_v.named_parameters()));
        params.extend(scoped("to_out.0", self.to_out.named_parameters()));
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = scoped("group_norm", self.group_norm.named_parameters_mut());
        params.extend(scoped("to_q", self.to_q.named_parameters_mut()));
        params.extend(scoped("to_k", self.to_k.named_parameters_mut()));
        params.extend(scoped("to_v", self.to_v.named_parameters_mut()));
        params.extend(scoped("to_out.0", self.to_out.named_parameters_mut()));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Generator;

    #[test]
    fn test_attention_shape_preserved() {
        let attn = SpatialAttention::new(8, 8, 4, 1e-6);
        let x = Generator::manual_seed(0).randn(&[2, 8, 4, 4]);
        let y = attn.forward(&x);
        assert_eq!(y.shape(), &[2, 8, 4, 4]);
        assert!(y.all_finite());
        assert_eq!(attn.num_heads(), 1);
    }

    #[test]
    fn test_attention_zero_output_projection_is_identity() {
        let mut attn = SpatialAttention::new(4, 2, 2, 1e-6);
        for (name, p) in attn.named_parameters_mut() {
            if name.starts_with("to_out.0") {
                p.data_mut().fill(0.0);
            }
        }

        let x = Generator::manual_seed(1).randn(&[1, 4, 3, 3]);
        let y = attn.forward(&x);
        assert!(y.max_abs_diff(&x) < 1e-6);
    }

    #[test]
    fn test_attention_uniform_values_average() {
        // Identical keys -> uniform weights -> each token receives the mean value.
        let mut attn = SpatialAttention::new(2, 2, 1, 1e-6);
        for (name, p) in attn.named_parameters_mut() {
            match name.as_str() {
                "to_k.weight" => p.data_mut().fill(0.0),
                "to_v.weight" | "to_out.0.weight" => {
                    p.data_mut().copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
                }
                _ => {}
            }
        }

        let x = Tensor::new(&[1.0, 3.0, 2.0, 6.0], &[1, 2, 1, 2]);
        let normed = attn.group_norm.forward(&x);
        let y = attn.forward(&x);

        for c in 0..2 {
            let mean = (normed.data()[c * 2] + normed.data()[c * 2 + 1]) / 2.0;
            for s in 0..2 {
                let expected = x.data()[c * 2 + s] + mean;
                assert!((y.data()[c * 2 + s] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_attention_parameter_names() {
        let attn = SpatialAttention::new(4, 4, 2, 1e-6);
        let names: Vec<String> = attn.named_parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "group_norm.weight",
                "group_norm.bias",
                "to_q.weight",
                "to_q.bias",
                "to_k.weight",
                "to_k.bias",
                "to_v.weight",
                "to_v.bias",
                "to_out.0.weight",
                "to_out.0.bias",
            ]
        );
    }
}
