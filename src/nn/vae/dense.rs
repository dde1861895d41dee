//! Fully connected VAE over flat feature vectors.
//!
//! ```text
//! Input x → MLP → (μ, log σ²) → z = μ + σ * ε → MLP → x̂
//!                                  ↑
//!                            ε ~ N(0, I)
//! ```
//!
//! Loss is `MSE(x̂, x) + β * KL(q(z|x) || N(0, I))`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaeError};
use crate::nn::activation::ReLU;
use crate::nn::linear::Linear;
use crate::nn::module::{scoped, Module};
use crate::tensor::{Generator, Tensor};

/// Hyperparameters of [`DenseVae`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseVaeConfig {
    /// Input feature dimension.
    pub input_dim: usize,
    /// Hidden layer widths of the encoder (the decoder mirrors them).
    pub hidden_dims: Vec<usize>,
    /// Latent dimension.
    pub latent_dim: usize,
    /// KL weight (β-VAE).
    pub beta: f32,
}

impl Default for DenseVaeConfig {
    fn default() -> Self {
        Self {
            input_dim: 32,
            hidden_dims: vec![16],
            latent_dim: 4,
            beta: 1.0,
        }
    }
}

impl DenseVaeConfig {
    /// # Errors
    ///
    /// Returns [`VaeError::InvalidConfig`] for zero-sized layers or a
    /// negative/non-finite β.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(VaeError::invalid_config("input_dim", 0, "a positive value"));
        }
        if self.latent_dim == 0 {
            return Err(VaeError::invalid_config("latent_dim", 0, "a positive value"));
        }
        if self.hidden_dims.contains(&0) {
            return Err(VaeError::invalid_config(
                "hidden_dims",
                format!("{:?}", self.hidden_dims),
                "positive widths",
            ));
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(VaeError::invalid_config("beta", self.beta, "a finite value >= 0"));
        }
        Ok(())
    }
}

/// Output of [`DenseVae::forward_vae`].
#[derive(Debug, Clone)]
pub struct DenseVaeOutput {
    /// Reconstructed input
    pub reconstruction: Tensor,
    /// Mean of the latent distribution
    pub mu: Tensor,
    /// Log variance of the latent distribution
    pub log_var: Tensor,
    /// Latent that was decoded
    pub z: Tensor,
}

/// Variational autoencoder built from [`Linear`] layers.
///
/// # Example
///
/// ```
/// use aprender_vae::nn::vae::{DenseVae, DenseVaeConfig};
/// use aprender_vae::tensor::Generator;
///
/// let vae = DenseVae::new(DenseVaeConfig {
///     input_dim: 12,
///     hidden_dims: vec![8],
///     latent_dim: 2,
///     beta: 1.0,
/// })
/// .unwrap();
///
/// let x = Generator::manual_seed(0).randn(&[5, 12]);
/// let out = vae.forward_vae(&x, None).unwrap();
/// let (total, recon, kl) = vae.loss(&out, &x);
/// assert!((total - (recon + kl)).abs() < 1e-5);
/// ```
pub struct DenseVae {
    encoder_layers: Vec<Linear>,
    fc_mu: Linear,
    fc_log_var: Linear,
    decoder_layers: Vec<Linear>,
    output_layer: Linear,
    activation: ReLU,
    config: DenseVaeConfig,
    training: bool,
}

impl DenseVae {
    /// Build a randomly initialised model.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::InvalidConfig`] if the config fails validation.
    pub fn new(config: DenseVaeConfig) -> Result<Self> {
        config.validate()?;

        let mut encoder_layers = Vec::with_capacity(config.hidden_dims.len());
        let mut prev_dim = config.input_dim;
        for &hidden_dim in &config.hidden_dims {
            encoder_layers.push(Linear::new(prev_dim, hidden_dim));
            prev_dim = hidden_dim;
        }

        let fc_mu = Linear::new(prev_dim, config.latent_dim);
        let fc_log_var = Linear::new(prev_dim, config.latent_dim);

        let mut decoder_layers = Vec::with_capacity(config.hidden_dims.len());
        prev_dim = config.latent_dim;
        for &hidden_dim in config.hidden_dims.iter().rev() {
            decoder_layers.push(Linear::new(prev_dim, hidden_dim));
            prev_dim = hidden_dim;
        }
        let output_layer = Linear::new(prev_dim, config.input_dim);

        Ok(Self {
            encoder_layers,
            fc_mu,
            fc_log_var,
            decoder_layers,
            output_layer,
            activation: ReLU::new(),
            config,
            training: true,
        })
    }

    /// Set β (KL weight).
    #[must_use]
    pub fn with_beta(mut self, beta: f32) -> Self {
        self.config.beta = beta;
        self
    }

    /// Model configuration.
    #[must_use]
    pub fn config(&self) -> &DenseVaeConfig {
        &self.config
    }

    /// Latent dimension.
    #[must_use]
    pub fn latent_dim(&self) -> usize {
        self.config.latent_dim
    }

    /// Input dimension.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    /// β value.
    #[must_use]
    pub fn beta(&self) -> f32 {
        self.config.beta
    }

    /// Encode `[N, input_dim]` to `(μ, log σ²)`.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] on a malformed input.
    pub fn encode(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        check_rows(x, "encoder input", self.config.input_dim)?;
        Ok(self.encode_unchecked(x))
    }

    /// Reparameterisation `z = μ + σ * ε`.
    ///
    /// With a generator, ε is drawn from it. Without one, training mode draws
    /// from entropy and evaluation mode returns μ.
    #[must_use]
    pub fn reparameterize(
        &self,
        mu: &Tensor,
        log_var: &Tensor,
        generator: Option<&mut Generator>,
    ) -> Tensor {
        let epsilon = match generator {
            Some(generator) => generator.randn(mu.shape()),
            None if self.training => Generator::from_entropy().randn(mu.shape()),
            None => return mu.clone(),
        };
        let std = log_var.scale(0.5).exp();
        mu.add(&std.mul(&epsilon))
    }

    /// Decode `[N, latent_dim]` to `[N, input_dim]`.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] on a malformed latent.
    pub fn decode(&self, z: &Tensor) -> Result<Tensor> {
        check_rows(z, "decoder input", self.config.latent_dim)?;
        Ok(self.decode_unchecked(z))
    }

    /// Full pass: encode, reparameterise, decode.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] on a malformed input.
    pub fn forward_vae(&self, x: &Tensor, generator: Option<&mut Generator>) -> Result<DenseVaeOutput> {
        let (mu, log_var) = self.encode(x)?;
        let z = self.reparameterize(&mu, &log_var, generator);
        let reconstruction = self.decode_unchecked(&z);
        Ok(DenseVaeOutput {
            reconstruction,
            mu,
            log_var,
            z,
        })
    }

    /// `(total, reconstruction, kl)` with `total = reconstruction + β * kl`.
    #[must_use]
    pub fn loss(&self, output: &DenseVaeOutput, target: &Tensor) -> (f32, f32, f32) {
        let recon_loss = mse_loss(&output.reconstruction, target);
        let kl_loss = kl_divergence_loss(&output.mu, &output.log_var);
        (recon_loss + self.config.beta * kl_loss, recon_loss, kl_loss)
    }

    /// Decode `num_samples` draws from the prior.
    #[must_use]
    pub fn sample(&self, num_samples: usize, generator: &mut Generator) -> Tensor {
        let z = generator.randn(&[num_samples, self.config.latent_dim]);
        self.decode_unchecked(&z)
    }

    /// Decode `steps` points on the line between the latent means of `x1` and `x2`.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] if the inputs are malformed or of
    /// different shapes.
    pub fn interpolate(&self, x1: &Tensor, x2: &Tensor, steps: usize) -> Result<Vec<Tensor>> {
        if x1.shape() != x2.shape() {
            return Err(VaeError::shape_mismatch("interpolation endpoint", x1.shape(), x2.shape()));
        }
        let (mu1, _) = self.encode(x1)?;
        let (mu2, _) = self.encode(x2)?;

        Ok((0..steps)
            .map(|i| {
                let alpha = if steps > 1 {
                    i as f32 / (steps - 1) as f32
                } else {
                    0.0
                };
                let z = mu1.scale(1.0 - alpha).add(&mu2.scale(alpha));
                self.decode_unchecked(&z)
            })
            .collect())
    }

    fn encode_unchecked(&self, x: &Tensor) -> (Tensor, Tensor) {
        let mut h = x.clone();
        for layer in &self.encoder_layers {
            h = self.activation.forward(&layer.forward(&h));
        }
        (self.fc_mu.forward(&h), self.fc_log_var.forward(&h))
    }

    fn decode_unchecked(&self, z: &Tensor) -> Tensor {
        let mut h = z.clone();
        for layer in &self.decoder_layers {
            h = self.activation.forward(&layer.forward(&h));
        }
        self.output_layer.forward(&h)
    }
}

fn check_rows(x: &Tensor, context: &str, dim: usize) -> Result<()> {
    match x.shape() {
        [_, d] if *d == dim => Ok(()),
        shape => {
            let batch = shape.first().copied().unwrap_or(1);
            Err(VaeError::shape_mismatch(context, &[batch, dim], shape))
        }
    }
}

fn mse_loss(prediction: &Tensor, target: &Tensor) -> f32 {
    let diff = prediction.sub(target);
    diff.mul(&diff).mean()
}

/// `-0.5 * sum(1 + log σ² - μ² - σ²)`, averaged over the batch.
fn kl_divergence_loss(mu: &Tensor, log_var: &Tensor) -> f32 {
    let batch = mu.shape().first().copied().unwrap_or(1).max(1);
    let sum: f32 = mu
        .data()
        .iter()
        .zip(log_var.data())
        .map(|(m, lv)| 1.0 + lv - m * m - lv.exp())
        .sum();
    -0.5 * sum / batch as f32
}

impl Module for DenseVae {
    fn forward(&self, input: &Tensor) -> Tensor {
        let (mu, log_var) = self.encode_unchecked(input);
        let z = self.reparameterize(&mu, &log_var, None);
        self.decode_unchecked(&z)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = Vec::new();
        for (i, layer) in self.encoder_layers.iter().enumerate() {
            params.extend(scoped(&format!("encoder_layers.{i}"), layer.named_parameters()));
        }
        params.extend(scoped("fc_mu", self.fc_mu.named_parameters()));
        params.extend(scoped("fc_log_var", self.fc_log_var.named_parameters()));
        for (i, layer) in self.decoder_layers.iter().enumerate() {
            params.extend(scoped(&format!("decoder_layers.{i}"), layer.named_parameters()));
        }
        params.extend(scoped("output_layer", self.output_layer.named_parameters()));
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = Vec::new();
        for (i, layer) in self.encoder_layers.iter_mut().enumerate() {
            params.extend(scoped(&format!("encoder_layers.{i}"), layer.named_parameters_mut()));
        }
        params.extend(scoped("fc_mu", self.fc_mu.named_parameters_mut()));
        params.extend(scoped("fc_log_var", self.fc_log_var.named_parameters_mut()));
        for (i, layer) in self.decoder_layers.iter_mut().enumerate() {
            params.extend(scoped(&format!("decoder_layers.{i}"), layer.named_parameters_mut()));
        }
        params.extend(scoped("output_layer", self.output_layer.named_parameters_mut()));
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

impl std::fmt::Debug for DenseVae {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseVae")
            .field("input_dim", &self.config.input_dim)
            .field("hidden_dims", &self.config.hidden_dims)
            .field("latent_dim", &self.config.latent_dim)
            .field("beta", &self.config.beta)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "dense_tests.rs"]
mod dense_tests;
