//! Construction, saving and loading of models with a JSON configuration.
//!
//! A pretrained model directory holds two files:
//!
//! ```text
//! <dir>/config.json                            constructor options (+ "_class_name")
//! <dir>/diffusion_pytorch_model.safetensors    weights keyed by parameter name
//! ```
//!
//! [`PretrainedModel::from_pretrained_with_info`] accepts such a directory or
//! a Hub repository id (`org/name`), whose files are downloaded into the Hub
//! cache first.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, VaeError};
use crate::hf_hub::HfHubClient;
use crate::nn::serialize::{
    convert_legacy_attention_key, load_state_dict, load_state_dict_into, save_model, LoadingInfo,
};
use crate::nn::vae::{AutoencoderKL, AutoencoderKLConfig, DenseVae, DenseVaeConfig};
use crate::nn::Module;
use crate::tensor::{Generator, Tensor};

/// Configuration file name inside a model directory.
pub const CONFIG_NAME: &str = "config.json";

/// Weights file name inside a model directory.
pub const WEIGHTS_NAME: &str = "diffusion_pytorch_model.safetensors";

/// Named forward inputs.
pub type ForwardInputs = BTreeMap<String, Tensor>;

/// A model that can be built from JSON options and round-tripped through a
/// model directory.
pub trait PretrainedModel: Module + Sized {
    /// Serializable configuration.
    type Config: Serialize + DeserializeOwned + Clone + PartialEq + Debug;

    /// Value written as `_class_name` in `config.json`.
    const CLASS_NAME: &'static str;

    /// Build a randomly initialised model.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::InvalidConfig`] for an unusable configuration.
    fn from_config(config: Self::Config) -> Result<Self>;

    /// The configuration the model was built from.
    fn config(&self) -> &Self::Config;

    /// Names accepted by [`PretrainedModel::forward_inputs`], main input first.
    fn forward_input_names(&self) -> &'static [&'static str];

    /// Per-sample shape of the main input for a reference run.
    fn reference_input_shape(&self) -> Vec<usize>;

    /// Run the model on named inputs.
    ///
    /// When `generator` is given, stochastic steps (posterior sampling) draw
    /// from it; otherwise the model runs deterministically in eval mode.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::MissingInput`] or [`VaeError::ShapeMismatch`] for
    /// unusable inputs.
    fn forward_inputs(&self, inputs: &ForwardInputs, generator: Option<&mut Generator>) -> Result<Tensor>;

    /// Rename a checkpoint key written by an older layout.
    fn convert_legacy_key(_key: &str) -> Option<String> {
        None
    }

    /// Build from a constructor-argument map, applying config defaults for
    /// absent options.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::Json`] if an option has the wrong type and
    /// [`VaeError::InvalidConfig`] if the config fails validation.
    fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let config: Self::Config = serde_json::from_value(Value::Object(args.clone()))?;
        Self::from_config(config)
    }

    /// Write `config.json` and the weights into `dir` (created if missing).
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error if a file cannot be written.
    fn save_pretrained(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut config = serde_json::to_value(self.config())?;
        if let Value::Object(map) = &mut config {
            map.insert("_class_name".to_string(), Value::String(Self::CLASS_NAME.to_string()));
        }
        fs::write(dir.join(CONFIG_NAME), serde_json::to_string_pretty(&config)?)?;
        save_model(self, dir.join(WEIGHTS_NAME))?;

        debug!(dir = %dir.display(), class = Self::CLASS_NAME, "saved pretrained model");
        Ok(())
    }

    /// Load from a model directory.
    ///
    /// # Errors
    ///
    /// Fails if a file is missing or malformed, or a stored tensor has the
    /// wrong shape.
    fn load_pretrained_dir(dir: &Path) -> Result<(Self, LoadingInfo)> {
        let config_text = fs::read_to_string(dir.join(CONFIG_NAME))?;
        let config: Self::Config = serde_json::from_str(&config_text)?;
        let mut model = Self::from_config(config)?;

        let state = load_state_dict(dir.join(WEIGHTS_NAME))?;
        let info = load_state_dict_into(&mut model, &state, Self::convert_legacy_key)?;

        if !info.missing_keys.is_empty() {
            warn!(
                count = info.missing_keys.len(),
                keys = ?info.missing_keys,
                "checkpoint is missing weights; they keep their initial values"
            );
        }
        if !info.unexpected_keys.is_empty() {
            warn!(keys = ?info.unexpected_keys, "checkpoint has unused weights");
        }

        model.eval();
        info!(
            dir = %dir.display(),
            class = Self::CLASS_NAME,
            tensors = state.len(),
            "loaded pretrained model"
        );
        Ok((model, info))
    }

    /// Load from a local directory or a Hub repo id, with diagnostics.
    ///
    /// # Errors
    ///
    /// See [`PretrainedModel::load_pretrained_dir`]; Hub failures are
    /// [`VaeError::Hub`].
    fn from_pretrained_with_info(identifier: &str) -> Result<(Self, LoadingInfo)> {
        let local = Path::new(identifier);
        if local.is_dir() {
            return Self::load_pretrained_dir(local);
        }
        let client = HfHubClient::new()?;
        Self::from_hub(&client, identifier)
    }

    /// Download a repository with `client` and load it.
    ///
    /// # Errors
    ///
    /// See [`PretrainedModel::from_pretrained_with_info`].
    fn from_hub(client: &HfHubClient, repo_id: &str) -> Result<(Self, LoadingInfo)> {
        let dir = client.pull_files(repo_id, &[CONFIG_NAME, WEIGHTS_NAME])?;
        Self::load_pretrained_dir(&dir)
    }

    /// Load from a local directory or a Hub repo id.
    ///
    /// # Errors
    ///
    /// See [`PretrainedModel::from_pretrained_with_info`].
    fn from_pretrained(identifier: &str) -> Result<Self> {
        Self::from_pretrained_with_info(identifier).map(|(model, _)| model)
    }
}

fn main_input<'a>(inputs: &'a ForwardInputs, name: &str) -> Result<&'a Tensor> {
    inputs
        .get(name)
        .ok_or_else(|| VaeError::MissingInput(name.to_string()))
}

impl PretrainedModel for AutoencoderKL {
    type Config = AutoencoderKLConfig;

    const CLASS_NAME: &'static str = "AutoencoderKL";

    fn from_config(config: Self::Config) -> Result<Self> {
        AutoencoderKL::new(config)
    }

    fn config(&self) -> &Self::Config {
        AutoencoderKL::config(self)
    }

    fn forward_input_names(&self) -> &'static [&'static str] {
        &["sample"]
    }

    fn reference_input_shape(&self) -> Vec<usize> {
        let config = AutoencoderKL::config(self);
        vec![config.in_channels, config.sample_size, config.sample_size]
    }

    fn forward_inputs(&self, inputs: &ForwardInputs, generator: Option<&mut Generator>) -> Result<Tensor> {
        let sample = main_input(inputs, "sample")?;
        let sample_posterior = generator.is_some();
        Ok(self.forward_with(sample, sample_posterior, generator)?.sample)
    }

    fn convert_legacy_key(key: &str) -> Option<String> {
        convert_legacy_attention_key(key)
    }
}

impl PretrainedModel for DenseVae {
    type Config = DenseVaeConfig;

    const CLASS_NAME: &'static str = "DenseVae";

    fn from_config(config: Self::Config) -> Result<Self> {
        DenseVae::new(config)
    }

    fn config(&self) -> &Self::Config {
        DenseVae::config(self)
    }

    fn forward_input_names(&self) -> &'static [&'static str] {
        &["sample"]
    }

    fn reference_input_shape(&self) -> Vec<usize> {
        vec![self.input_dim()]
    }

    fn forward_inputs(&self, inputs: &ForwardInputs, generator: Option<&mut Generator>) -> Result<Tensor> {
        let sample = main_input(inputs, "sample")?;
        Ok(self.forward_vae(sample, generator)?.reconstruction)
    }
}

#[cfg(test)]
#[path = "pretrained_tests.rs"]
mod pretrained_tests;
