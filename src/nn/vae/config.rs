//! `AutoencoderKL` configuration (`config.json`).

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaeError};
use crate::nn::Activation;

/// Encoder block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownBlockType {
    /// Resnets followed by an optional stride-2 downsampler.
    DownEncoderBlock2D,
}

/// Decoder block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpBlockType {
    /// Resnets followed by an optional nearest-neighbour upsampler.
    UpDecoderBlock2D,
}

/// Hyperparameters of [`super::AutoencoderKL`].
///
/// Field names and defaults match the published checkpoint configs; keys
/// this crate doesn't know (`_class_name`, `_diffusers_version`, ...) are
/// ignored when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoencoderKLConfig {
    /// Image channels consumed by the encoder.
    pub in_channels: usize,
    /// Image channels produced by the decoder.
    pub out_channels: usize,
    /// One entry per encoder resolution level.
    pub down_block_types: Vec<DownBlockType>,
    /// One entry per decoder resolution level.
    pub up_block_types: Vec<UpBlockType>,
    /// Channel width of each resolution level.
    pub block_out_channels: Vec<usize>,
    /// Resnets per encoder block (decoder blocks use one more).
    pub layers_per_block: usize,
    /// Nonlinearity.
    pub act_fn: Activation,
    /// Channels of the latent `z`.
    pub latent_channels: usize,
    /// Groups of every `GroupNorm`.
    pub norm_num_groups: usize,
    /// Nominal image size.
    pub sample_size: usize,
    /// Multiplier applied by diffusion pipelines to latents.
    pub scaling_factor: f32,
    /// Whether pipelines should run this model in f32.
    pub force_upcast: bool,
    /// 1x1 conv after the encoder.
    pub use_quant_conv: bool,
    /// 1x1 conv before the decoder.
    pub use_post_quant_conv: bool,
    /// Self-attention in the middle blocks.
    pub mid_block_add_attention: bool,
}

impl Default for AutoencoderKLConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 3,
            down_block_types: vec![DownBlockType::DownEncoderBlock2D],
            up_block_types: vec![UpBlockType::UpDecoderBlock2D],
            block_out_channels: vec![64],
            layers_per_block: 1,
            act_fn: Activation::Silu,
            latent_channels: 4,
            norm_num_groups: 32,
            sample_size: 32,
            scaling_factor: 0.182_15,
            force_upcast: true,
            use_quant_conv: true,
            use_post_quant_conv: true,
            mid_block_add_attention: true,
        }
    }
}

impl AutoencoderKLConfig {
    /// Check structural constraints that construction relies on.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::InvalidConfig`] naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 {
            return Err(VaeError::invalid_config("in_channels", 0, "a positive value"));
        }
        if self.out_channels == 0 {
            return Err(VaeError::invalid_config("out_channels", 0, "a positive value"));
        }
        if self.latent_channels == 0 {
            return Err(VaeError::invalid_config("latent_channels", 0, "a positive value"));
        }
        if self.block_out_channels.is_empty() {
            return Err(VaeError::invalid_config(
                "block_out_channels",
                "[]",
                "at least one block",
            ));
        }
        if self.down_block_types.len() != self.block_out_channels.len() {
            return Err(VaeError::invalid_config(
                "down_block_types",
                self.down_block_types.len(),
                format!("{} entries", self.block_out_channels.len()),
            ));
        }
        if self.up_block_types.len() != self.block_out_channels.len() {
            return Err(VaeError::invalid_config(
                "up_block_types",
                self.up_block_types.len(),
                format!("{} entries", self.block_out_channels.len()),
            ));
        }
        if self.norm_num_groups == 0 {
            return Err(VaeError::invalid_config("norm_num_groups", 0, "a positive value"));
        }
        if let Some(&ch) = self
            .block_out_channels
            .iter()
            .find(|&&ch| ch == 0 || ch % self.norm_num_groups != 0)
        {
            return Err(VaeError::invalid_config(
                "block_out_channels",
                ch,
                format!("a positive multiple of norm_num_groups ({})", self.norm_num_groups),
            ));
        }
        if !(self.scaling_factor.is_finite() && self.scaling_factor > 0.0) {
            return Err(VaeError::invalid_config(
                "scaling_factor",
                self.scaling_factor,
                "a finite positive value",
            ));
        }
        Ok(())
    }

    /// Spatial downsampling factor between image and latent.
    #[must_use]
    pub fn downsample_factor(&self) -> usize {
        1 << self.block_out_channels.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AutoencoderKLConfig::default();
        assert_eq!(config.block_out_channels, vec![64]);
        assert_eq!(config.latent_channels, 4);
        assert_eq!(config.act_fn, Activation::Silu);
        assert!(config.validate().is_ok());
        assert_eq!(config.downsample_factor(), 1);
    }

    #[test]
    fn test_parse_hub_config_ignores_private_keys() {
        let json = r#"{
            "_class_name": "AutoencoderKL",
            "_diffusers_version": "0.2.2",
            "act_fn": "silu",
            "block_out_channels": [32, 64],
            "down_block_types": ["DownEncoderBlock2D", "DownEncoderBlock2D"],
            "in_channels": 3,
            "latent_channels": 4,
            "layers_per_block": 1,
            "out_channels": 3,
            "sample_size": 32,
            "up_block_types": ["UpDecoderBlock2D", "UpDecoderBlock2D"]
        }"#;
        let config: AutoencoderKLConfig = serde_json::from_str(json).expect("config parses");
        assert_eq!(config.block_out_channels, vec![32, 64]);
        assert_eq!(config.norm_num_groups, 32);
        assert!(config.use_quant_conv);
        assert_eq!(config.downsample_factor(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_block_type_rejected() {
        let json = r#"{"down_block_types": ["CrossAttnDownBlock2D"]}"#;
        assert!(serde_json::from_str::<AutoencoderKLConfig>(json).is_err());
    }

    #[test]
    fn test_validate_block_count_mismatch() {
        let config = AutoencoderKLConfig {
            block_out_channels: vec![32, 64],
            ..AutoencoderKLConfig::default()
        };
        let err = config.validate().expect_err("one block type for two levels");
        assert!(err.to_string().contains("down_block_types"));
    }

    #[test]
    fn test_validate_groups_must_divide() {
        let config = AutoencoderKLConfig {
            block_out_channels: vec![48],
            ..AutoencoderKLConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VaeError::InvalidConfig { .. })
        ));
    }
}
