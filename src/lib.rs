//! Aprender VAE: a KL autoencoder in pure Rust, with pretrained loading and a
//! model conformance harness.
//!
//! # Quick Start
//!
//! ```
//! use aprender_vae::prelude::*;
//!
//! let vae = AutoencoderKL::new(AutoencoderKLConfig {
//!     block_out_channels: vec![8],
//!     norm_num_groups: 4,
//!     ..AutoencoderKLConfig::default()
//! })
//! .unwrap();
//!
//! let x = Generator::manual_seed(0).randn(&[1, 3, 16, 16]);
//! let posterior = vae.encode(&x).unwrap();
//! let reconstruction = vae.decode(&posterior.mode()).unwrap().sample;
//! assert_eq!(reconstruction.shape(), &[1, 3, 16, 16]);
//! ```
//!
//! # Modules
//!
//! - [`tensor`]: Dense `f32` tensors and the seeded [`tensor::Generator`]
//! - [`nn`]: Layers, the [`nn::Module`] trait and the VAE models
//! - [`serialization`]: SafeTensors reader and writer
//! - [`hf_hub`]: Hugging Face Hub downloads
//! - [`pretrained`]: `config.json` + weights directories, `from_pretrained`
//! - [`testing`]: Model conformance harness and reference fixtures

pub mod error;
pub mod hf_hub;
pub mod nn;
pub mod prelude;
pub mod pretrained;
pub mod serialization;
pub mod tensor;
pub mod testing;

pub use error::{Result, VaeError};
pub use pretrained::PretrainedModel;
pub use tensor::{Generator, Tensor};
