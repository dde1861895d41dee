//! Resolution-level blocks of the autoencoder.

use crate::nn::activation::Activation;
use crate::nn::attention::SpatialAttention;
use crate::nn::module::{scoped, Module};
use crate::nn::resnet::{Downsample2D, ResnetBlock2D, Upsample2D};
use crate::tensor::Tensor;

pub(crate) const NORM_EPS: f32 = 1e-6;

fn resnets_named<'a>(resnets: &'a [ResnetBlock2D]) -> Vec<(String, &'a Tensor)> {
    resnets
        .iter()
        .enumerate()
        .flat_map(|(i, r)| scoped(&format!("resnets.{i}"), r.named_parameters()))
        .collect()
}

fn resnets_named_mut<'a>(resnets: &'a mut [ResnetBlock2D]) -> Vec<(String, &'a mut Tensor)> {
    resnets
        .iter_mut()
        .enumerate()
        .flat_map(|(i, r)| scoped(&format!("resnets.{i}"), r.named_parameters_mut()))
        .collect()
}

/// Encoder level: `num_layers` resnets, then an optional downsampler.
#[derive(Debug)]
pub struct DownEncoderBlock2D {
    resnets: Vec<ResnetBlock2D>,
    downsampler: Option<Downsample2D>,
}

impl DownEncoderBlock2D {
    /// Create an encoder level.
    #[must_use]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        num_layers: usize,
        groups: usize,
        activation: Activation,
        add_downsample: bool,
    ) -> Self {
        let resnets = (0..num_layers)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                ResnetBlock2D::new(input, out_channels, groups, NORM_EPS, activation)
            })
            .collect();

        Self {
            resnets,
            downsampler: add_downsample.then(|| Downsample2D::new(out_channels)),
        }
    }
}

impl Module for DownEncoderBlock2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut h = input.clone();
        for resnet in &self.resnets {
            h = resnet.forward(&h);
        }
        match &self.downsampler {
            Some(down) => down.forward(&h),
            None => h,
        }
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = resnets_named(&self.resnets);
        if let Some(down) = &self.downsampler {
            params.extend(scoped("downsamplers.0", down.named_parameters()));
        }
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = resnets_named_mut(&mut self.resnets);
        if let Some(down) = &mut self.downsampler {
            params.extend(scoped("downsamplers.0", down.named_parameters_mut()));
        }
        params
    }
}

/// Decoder level: `num_layers` resnets, then an optional upsampler.
#[derive(Debug)]
pub struct UpDecoderBlock2D {
    resnets: Vec<ResnetBlock2D>,
    upsampler: Option<Upsample2D>,
}

impl UpDecoderBlock2D {
    /// Create a decoder level.
    #[must_use]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        num_layers: usize,
        groups: usize,
        activation: Activation,
        add_upsample: bool,
    ) -> Self {
        let resnets = (0..num_layers)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                ResnetBlock2D::new(input, out_channels, groups, NORM_EPS, activation)
            })
            .collect();

        Self {
            resnets,
            upsampler: add_upsample.then(|| Upsample2D::new(out_channels)),
        }
    }
}

impl Module for UpDecoderBlock2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut h = input.clone();
        for resnet in &self.resnets {
            h = resnet.forward(&h);
        }
        match &self.upsampler {
            Some(up) => up.forward(&h),
            None => h,
        }
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = resnets_named(&self.resnets);
        if let Some(up) = &self.upsampler {
            params.extend(scoped("upsamplers.0", up.named_parameters()));
        }
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = resnets_named_mut(&mut self.resnets);
        if let Some(up) = &mut self.upsampler {
            params.extend(scoped("upsamplers.0", up.named_parameters_mut()));
        }
        params
    }
}

/// Lowest-resolution block: resnet, optional attention, resnet.
#[derive(Debug)]
pub struct UNetMidBlock2D {
    resnets: Vec<ResnetBlock2D>,
    attention: Option<SpatialAttention>,
}

impl UNetMidBlock2D {
    /// Create a middle block over `channels`.
    #[must_use]
    pub fn new(channels: usize, groups: usize, activation: Activation, add_attention: bool) -> Self {
        Self {
            resnets: vec![
                ResnetBlock2D::new(channels, channels, groups, NORM_EPS, activation),
                ResnetBlock2D::new(channels, channels, groups, NORM_EPS, activation),
            ],
            attention: add_attention
                .then(|| SpatialAttention::new(channels, channels, groups, NORM_EPS)),
        }
    }
}

impl Module for UNetMidBlock2D {
    fn forward(&self, input: &Tensor) -> Tensor {
        let mut h = self.resnets[0].forward(input);
        if let Some(attention) = &self.attention {
            h = attention.forward(&h);
        }
        self.resnets[1].forward(&h)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = scoped("resnets.0", self.resnets[0].named_parameters());
        if let Some(attention) = &self.attention {
            params.extend(scoped("attentions.0", attention.named_parameters()));
        }
        params.extend(scoped("resnets.1", self.resnets[1].named_parameters()));
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let (first, second) = self.resnets.split_at_mut(1);
        let mut params = scoped("resnets.0", first[0].named_parameters_mut());
        if let Some(attention) = &mut self.attention {
            params.extend(scoped("attentions.0", attention.named_parameters_mut()));
        }
        params.extend(scoped("resnets.1", second[0].named_parameters_mut()));
        params
    }
}
