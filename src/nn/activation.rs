//! Activation function modules.
//!
//! # References
//!
//! - Nair, V., & Hinton, G. E. (2010). Rectified linear units improve restricted
//!   Boltzmann machines. ICML.
//! - Elfwing, S., et al. (2018). Sigmoid-weighted linear units for neural
//!   network function approximation in reinforcement learning. Neural Networks.
//! - Hendrycks, D., & Gimpel, K. (2016). Gaussian error linear units (GELUs).

use serde::{Deserialize, Serialize};

use super::module::Module;
use crate::tensor::Tensor;

/// Rectified Linear Unit activation: ReLU(x) = max(0, x)
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl ReLU {
    /// Create a new ReLU activation.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.map(|x| x.max(0.0))
    }
}

/// SiLU (Swish) activation: SiLU(x) = x / (1 + exp(-x))
#[derive(Debug, Clone, Copy, Default)]
pub struct SiLU;

impl SiLU {
    /// Create a new SiLU activation.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Module for SiLU {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.map(silu)
    }
}

/// GELU activation (tanh approximation).
#[derive(Debug, Clone, Copy, Default)]
pub struct GELU;

impl GELU {
    /// Create a new GELU activation.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Module for GELU {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.map(gelu)
    }
}

#[inline]
fn silu(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

#[inline]
fn gelu(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044_715 * x * x * x)).tanh())
}

/// Activation selected by name in a model config (`act_fn`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// x * sigmoid(x)
    #[default]
    #[serde(alias = "swish")]
    Silu,
    /// max(0, x)
    Relu,
    /// Gaussian error linear unit
    Gelu,
}

impl Module for Activation {
    fn forward(&self, input: &Tensor) -> Tensor {
        match self {
            Self::Silu => SiLU.forward(input),
            Self::Relu => ReLU.forward(input),
            Self::Gelu => GELU.forward(input),
        }
    }
}
