//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use aprender_vae::prelude::*;
//! ```

pub use crate::error::{Result, VaeError};
pub use crate::nn::serialize::LoadingInfo;
pub use crate::nn::vae::{
    AutoencoderKL, AutoencoderKLConfig, DecoderOutput, DenseVae, DenseVaeConfig,
    DiagonalGaussianDistribution,
};
pub use crate::nn::Module;
pub use crate::pretrained::PretrainedModel;
pub use crate::tensor::{Generator, Tensor};
pub use crate::testing::{Hook, ModelSpec, ModelTester};
