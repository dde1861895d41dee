//! Convolutional encoder and decoder stacks.

use super::blocks::{DownEncoderBlock2D, UNetMidBlock2D, UpDecoderBlock2D, NORM_EPS};
use super::config::AutoencoderKLConfig;
use crate::nn::activation::Activation;
use crate::nn::conv::Conv2d;
use crate::nn::module::{scoped, Module};
use crate::nn::normalization::GroupNorm;
use crate::tensor::Tensor;

/// Image `[N, in, H, W]` to posterior moments `[N, 2 * latent, H/f, W/f]`.
#[derive(Debug)]
pub struct Encoder {
    conv_in: Conv2d,
    down_blocks: Vec<DownEncoderBlock2D>,
    mid_block: UNetMidBlock2D,
    conv_norm_out: GroupNorm,
    activation: Activation,
    conv_out: Conv2d,
}

impl Encoder {
    /// Build from a validated config.
    #[must_use]
    pub fn new(config: &AutoencoderKLConfig) -> Self {
        let channels = &config.block_out_channels;
        let groups = config.norm_num_groups;
        let act = config.act_fn;

        let mut down_blocks = Vec::with_capacity(channels.len());
        let mut output_channel = channels[0];
        for (i, &out) in channels.iter().enumerate() {
            let input_channel = output_channel;
            output_channel = out;
            let is_final = i + 1 == channels.len();
            down_blocks.push(DownEncoderBlock2D::new(
                input_channel,
                output_channel,
                config.layers_per_block,
                groups,
                act,
                !is_final,
            ));
        }

        let top = channels[channels.len() - 1];
        Self {
            conv_in: Conv2d::with_padding(config.in_channels, channels[0], 3, 1),
            down_blocks,
            mid_block: UNetMidBlock2D::new(top, groups, act, config.mid_block_add_attention),
            conv_norm_out: GroupNorm::with_eps(groups, top, NORM_EPS),
            activation: act,
            conv_out: Conv2d::with_padding(top, 2 * config.latent_channels, 3, 1),
        }
    }
}

impl Module for Encoder {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut h = self.conv_in.forward(input);
        for block in &self.down_blocks {
            h = block.forward(&h);
        }
        let h = self.mid_block.forward(&h);
        let h = self.activation.forward(&self.conv_norm_out.forward(&h));
        self.conv_out.forward(&h)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = scoped("conv_in", self.conv_in.named_parameters());
        for (i, block) in self.down_blocks.iter().enumerate() {
            params.extend(scoped(&format!("down_blocks.{i}"), block.named_parameters()));
        }
        params.extend(scoped("mid_block", self.mid_block.named_parameters()));
        params.extend(scoped("conv_norm_out", self.conv_norm_out.named_parameters()));
        params.extend(scoped("conv_out", self.conv_out.named_parameters()));
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = scoped("conv_in", self.conv_in.named_parameters_mut());
        for (i, block) in self.down_blocks.iter_mut().enumerate() {
            params.extend(scoped(&format!("down_blocks.{i}"), block.named_parameters_mut()));
        }
        params.extend(scoped("mid_block", self.mid_block.named_parameters_mut()));
        params.extend(scoped("conv_norm_out", self.conv_norm_out.named_parameters_mut()));
        params.extend(scoped("conv_out", self.conv_out.named_parameters_mut()));
        params
    }
}

/// Latent `[N, latent, h, w]` to image `[N, out, h*f, w*f]`.
#[derive(Debug)]
pub struct Decoder {
    conv_in: Conv2d,
    mid_block: UNetMidBlock2D,
    up_blocks: Vec<UpDecoderBlock2D>,
    conv_norm_out: GroupNorm,
    activation: Activation,
    conv_out: Conv2d,
}

impl Decoder {
    /// Build from a validated config.
    #[must_use]
    pub fn new(config: &AutoencoderKLConfig) -> Self {
        let reversed: Vec<usize> = config.block_out_channels.iter().rev().copied().collect();
        let groups = config.norm_num_groups;
        let act = config.act_fn;
        let top = reversed[0];

        let mut up_blocks = Vec::with_capacity(reversed.len());
        let mut output_channel = top;
        for (i, &out) in reversed.iter().enumerate() {
            let prev_output_channel = output_channel;
            output_channel = out;
            let is_final = i + 1 == reversed.len();
            up_blocks.push(UpDecoderBlock2D::new(
                prev_output_channel,
                output_channel,
                config.layers_per_block + 1,
                groups,
                act,
                !is_final,
            ));
        }

        let bottom = reversed[reversed.len() - 1];
        Self {
            conv_in: Conv2d::with_padding(config.latent_channels, top, 3, 1),
            mid_block: UNetMidBlock2D::new(top, groups, act, config.mid_block_add_attention),
            up_blocks,
            conv_norm_out: GroupNorm::with_eps(groups, bottom, NORM_EPS),
            activation: act,
            conv_out: Conv2d::with_padding(bottom, config.out_channels, 3, 1),
        }
    }
}

impl Module for Decoder {
    fn forward(&self, input: &Tensor) -> Tensor {
        let h = self.conv_in.forward(input);
        let mut h = self.mid_block.forward(&h);
        for block in &self.up_blocks {
            h = block.forward(&h);
        }
        let h = self.activation.forward(&self.conv_norm_out.forward(&h));
        self.conv_out.forward(&h)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = scoped("conv_in", self.conv_in.named_parameters());
        params.extend(scoped("mid_block", self.mid_block.named_parameters()));
        for (i, block) in self.up_blocks.iter().enumerate() {
            params.extend(scoped(&format!("up_blocks.{i}"), block.named_parameters()));
        }
        params.extend(scoped("conv_norm_out", self.conv_norm_out.named_parameters()));
        params.extend(scoped("conv_out", self.conv_out.named_parameters()));
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = scoped("conv_in", self.conv_in.named_parameters_mut());
        params.extend(scoped("mid_block", self.mid_block.named_parameters_mut()));
        for (i, block) in self.up_blocks.iter_mut().enumerate() {
            params.extend(scoped(&format!("up_blocks.{i}"), block.named_parameters_mut()));
        }
        params.extend(scoped("conv_norm_out", self.conv_norm_out.named_parameters_mut()));
        params.extend(scoped("conv_out", self.conv_out.named_parameters_mut()));
        params
    }
}
