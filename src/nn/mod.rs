//! Neural network modules for inference.
//!
//! The nn module is organized around the [`Module`] trait, which defines
//! the interface for all layers and models:
//!
//! - **Layers**: [`Linear`], [`Conv2d`]
//! - **Activations**: [`ReLU`], [`SiLU`], [`GELU`], selected by name via [`Activation`]
//! - **Normalization**: [`GroupNorm`]
//! - **Blocks**: [`ResnetBlock2D`], [`Downsample2D`], [`Upsample2D`], [`SpatialAttention`]
//! - **Models**: [`vae::AutoencoderKL`], [`vae::DenseVae`]
//!
//! Every parameter has a dotted name, which is what [`serialize`] writes to
//! and reads from checkpoints.
//!
//! # Example
//!
//! ```
//! use aprender_vae::nn::{Conv2d, Module};
//! use aprender_vae::tensor::Tensor;
//!
//! let conv = Conv2d::with_padding(3, 8, 3, 1);
//! let y = conv.forward(&Tensor::zeros(&[1, 3, 16, 16]));
//! assert_eq!(y.shape(), &[1, 8, 16, 16]);
//! ```
//!
//! # References
//!
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style, high-performance
//!   deep learning library. `NeurIPS`.
//! - He, K., et al. (2015). Delving deep into rectifiers. ICCV.

mod activation;
mod attention;
mod conv;
mod init;
mod linear;
mod module;
mod normalization;
mod resnet;
pub mod serialize;
pub mod vae;

pub use activation::{Activation, ReLU, GELU, SiLU};
pub use attention::SpatialAttention;
pub use conv::Conv2d;
pub use init::{kaiming_uniform, xavier_uniform};
pub use linear::Linear;
pub use module::{scoped, Module};
pub use normalization::GroupNorm;
pub use resnet::{Downsample2D, ResnetBlock2D, Upsample2D};
