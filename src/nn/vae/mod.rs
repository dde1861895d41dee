//! Variational autoencoders.
//!
//! [`AutoencoderKL`] is the convolutional KL-regularised autoencoder used as
//! the latent codec of diffusion models:
//!
//! ```text
//! x → Encoder → quant_conv → (μ, log σ²) → z ~ q(z|x) → post_quant_conv → Decoder → x̂
//! ```
//!
//! Its parameter names follow the published checkpoint layout
//! (`encoder.down_blocks.0.resnets.0.conv1.weight`, ...), so hosted weights
//! load without renaming.
//!
//! [`DenseVae`] is a fully connected VAE over flat feature vectors.
//!
//! # References
//!
//! - Kingma, D. P., & Welling, M. (2014). Auto-Encoding Variational Bayes. ICLR.
//! - Rombach, R., et al. (2022). High-resolution image synthesis with latent
//!   diffusion models. CVPR.

mod blocks;
mod coder;
mod config;
mod dense;
mod distribution;

pub use blocks::{DownEncoderBlock2D, UNetMidBlock2D, UpDecoderBlock2D};
pub use coder::{Decoder, Encoder};
pub use config::{AutoencoderKLConfig, DownBlockType, UpBlockType};
pub use dense::{DenseVae, DenseVaeConfig, DenseVaeOutput};
pub use distribution::DiagonalGaussianDistribution;

use tracing::debug;

use super::conv::Conv2d;
use super::module::{scoped, Module};
use super::serialize::count_parameters;
use crate::error::{Result, VaeError};
use crate::tensor::{Generator, Tensor};

/// Output of [`AutoencoderKL::decode`] and [`AutoencoderKL::forward_with`].
#[derive(Debug, Clone)]
pub struct DecoderOutput {
    /// Decoded image `[N, out_channels, H, W]`.
    pub sample: Tensor,
}

/// KL-regularised convolutional autoencoder.
///
/// # Example
///
/// ```
/// use aprender_vae::nn::vae::{AutoencoderKL, AutoencoderKLConfig};
/// use aprender_vae::tensor::Generator;
///
/// let config = AutoencoderKLConfig {
///     block_out_channels: vec![8],
///     norm_num_groups: 4,
///     ..AutoencoderKLConfig::default()
/// };
/// let vae = AutoencoderKL::new(config).unwrap();
///
/// let x = Generator::manual_seed(0).randn(&[1, 3, 8, 8]);
/// let y = vae.forward_with(&x, false, None).unwrap();
/// assert_eq!(y.sample.shape(), &[1, 3, 8, 8]);
/// ```
pub struct AutoencoderKL {
    encoder: Encoder,
    decoder: Decoder,
    quant_conv: Option<Conv2d>,
    post_quant_conv: Option<Conv2d>,
    config: AutoencoderKLConfig,
    training: bool,
}

impl AutoencoderKL {
    /// Build a randomly initialised model.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::InvalidConfig`] if the config fails validation.
    pub fn new(config: AutoencoderKLConfig) -> Result<Self> {
        config.validate()?;

        let moments = 2 * config.latent_channels;
        let latent = config.latent_channels;
        let model = Self {
            encoder: Encoder::new(&config),
            decoder: Decoder::new(&config),
            quant_conv: config.use_quant_conv.then(|| Conv2d::new(moments, moments, 1)),
            post_quant_conv: config.use_post_quant_conv.then(|| Conv2d::new(latent, latent, 1)),
            config,
            training: true,
        };

        debug!(
            blocks = ?model.config.block_out_channels,
            latent_channels = model.config.latent_channels,
            parameters = model.num_parameters(),
            "built AutoencoderKL"
        );
        Ok(model)
    }

    /// Model configuration.
    #[must_use]
    pub fn config(&self) -> &AutoencoderKLConfig {
        &self.config
    }

    /// Total number of scalar parameters.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        count_parameters(self)
    }

    /// Encode an image batch into its posterior.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] unless `x` is `[N, in_channels, H, W]`
    /// with `H` and `W` divisible by the downsampling factor.
    pub fn encode(&self, x: &Tensor) -> Result<DiagonalGaussianDistribution> {
        self.check_image(x, "encoder input", self.config.in_channels, self.config.downsample_factor())?;
        Ok(self.posterior(x))
    }

    /// Decode a latent batch.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] unless `z` is `[N, latent_channels, h, w]`.
    pub fn decode(&self, z: &Tensor) -> Result<DecoderOutput> {
        self.check_image(z, "decoder input", self.config.latent_channels, 1)?;
        Ok(DecoderOutput {
            sample: self.reconstruct(z),
        })
    }

    /// Encode, pick a latent, decode.
    ///
    /// With `sample_posterior` the latent is drawn from the posterior using
    /// `generator` (or a fresh entropy-seeded one); otherwise the posterior
    /// mode is decoded.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] on a malformed `sample`.
    pub fn forward_with(
        &self,
        sample: &Tensor,
        sample_posterior: bool,
        generator: Option<&mut Generator>,
    ) -> Result<DecoderOutput> {
        let posterior = self.encode(sample)?;
        let z = if sample_posterior {
            match generator {
                Some(generator) => posterior.sample(generator),
                None => posterior.sample(&mut Generator::from_entropy()),
            }
        } else {
            posterior.mode()
        };
        Ok(DecoderOutput {
            sample: self.reconstruct(&z),
        })
    }

    fn posterior(&self, x: &Tensor) -> DiagonalGaussianDistribution {
        let h = self.encoder.forward(x);
        let moments = match &self.quant_conv {
            Some(conv) => conv.forward(&h),
            None => h,
        };
        DiagonalGaussianDistribution::new(&moments)
    }

    fn reconstruct(&self, z: &Tensor) -> Tensor {
        let z = match &self.post_quant_conv {
            Some(conv) => conv.forward(z),
            None => z.clone(),
        };
        self.decoder.forward(&z)
    }

    fn check_image(&self, x: &Tensor, context: &str, channels: usize, factor: usize) -> Result<()> {
        let shape = x.shape();
        let well_formed = shape.len() == 4
            && shape[1] == channels
            && shape[2] > 0
            && shape[3] > 0
            && shape[2] % factor == 0
            && shape[3] % factor == 0;
        if well_formed {
            return Ok(());
        }

        let (h, w) = match shape {
            [_, _, h, w] => (round_up(*h, factor), round_up(*w, factor)),
            _ => (self.config.sample_size, self.config.sample_size),
        };
        let batch = shape.first().copied().unwrap_or(1);
        Err(VaeError::shape_mismatch(context, &[batch, channels, h, w], shape))
    }
}

fn round_up(value: usize, factor: usize) -> usize {
    value.max(1).div_ceil(factor) * factor
}

impl Module for AutoencoderKL {
    /// Deterministic reconstruction through the posterior mode.
    ///
    /// # Panics
    ///
    /// Panics if the input is not a well-formed image batch; use
    /// [`AutoencoderKL::forward_with`] for a checked call.
    fn forward(&self, input: &Tensor) -> Tensor {
        self.reconstruct(&self.posterior(input).mode())
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = scoped("encoder", self.encoder.named_parameters());
        params.extend(scoped("decoder", self.decoder.named_parameters()));
        if let Some(conv) = &self.quant_conv {
            params.extend(scoped("quant_conv", conv.named_parameters()));
        }
        if let Some(conv) = &self.post_quant_conv {
            params.extend(scoped("post_quant_conv", conv.named_parameters()));
        }
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = scoped("encoder", self.encoder.named_parameters_mut());
        params.extend(scoped("decoder", self.decoder.named_parameters_mut()));
        if let Some(conv) = &mut self.quant_conv {
            params.extend(scoped("quant_conv", conv.named_parameters_mut()));
        }
        if let Some(conv) = &mut self.post_quant_conv {
            params.extend(scoped("post_quant_conv", conv.named_parameters_mut()));
        }
        params
    }

    fn train(&mut self) {
        self.training = true;
    }

    fn eval(&mut self) {
        self.training = false;
    }

    fn training(&self) -> bool {
        self.training
    }
}

impl std::fmt::Debug for AutoencoderKL {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoencoderKL")
            .field("in_channels", &self.config.in_channels)
            .field("block_out_channels", &self.config.block_out_channels)
            .field("latent_channels", &self.config.latent_channels)
            .field("training", &self.training)
            .finish_non_exhaustive()
    }
}
