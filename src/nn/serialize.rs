//! Neural network weight serialization.
//!
//! State dicts are keyed by the dotted parameter names of
//! [`Module::named_parameters`], the same keys published checkpoints use, so
//! a file written by [`save_model`] and a hub checkpoint load the same way.
//!
//! # Example
//!
//! ```
//! use aprender_vae::nn::serialize::{load_model, save_model};
//! use aprender_vae::nn::{Linear, Module};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("linear.safetensors");
//!
//! let model = Linear::with_seed(10, 5, Some(42));
//! save_model(&model, &path).unwrap();
//!
//! let mut restored = Linear::with_seed(10, 5, Some(7));
//! let info = load_model(&mut restored, &path).unwrap();
//! assert!(info.is_complete());
//! assert_eq!(model.weight(), restored.weight());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::debug;

use super::module::Module;
use crate::error::{Result, VaeError};
use crate::serialization::safetensors::{
    extract_tensor, load_safetensors, save_safetensors_with_metadata, UserMetadata,
};
use crate::tensor::Tensor;

/// State dictionary: mapping from parameter names to tensor data and shapes.
pub type StateDict = BTreeMap<String, (Vec<f32>, Vec<usize>)>;

/// Diagnostics of a weight load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingInfo {
    /// Model parameters the state dict did not provide; they keep their
    /// initial values.
    pub missing_keys: Vec<String>,
    /// State dict entries no parameter consumed.
    pub unexpected_keys: Vec<String>,
    /// Legacy names rewritten while loading, as `(stored, current)`.
    pub converted_keys: Vec<(String, String)>,
}

impl LoadingInfo {
    /// True if every model parameter received a value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_keys.is_empty()
    }
}

/// Extract the state dictionary of a module.
///
/// `prefix` is prepended (with a dot) to every name when non-empty.
pub fn state_dict<M: Module + ?Sized>(module: &M, prefix: &str) -> StateDict {
    module
        .named_parameters()
        .into_iter()
        .map(|(name, param)| {
            let name = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}.{name}")
            };
            (name, (param.data().to_vec(), param.shape().to_vec()))
        })
        .collect()
}

/// Rename pre-0.14 attention keys (`query`, `key`, `value`, `proj_attn`) to
/// the current layout (`to_q`, `to_k`, `to_v`, `to_out.0`).
///
/// Returns `None` for keys that need no conversion.
#[must_use]
pub fn convert_legacy_attention_key(key: &str) -> Option<String> {
    if !key.contains(".attentions.") {
        return None;
    }

    let mut changed = false;
    let converted: Vec<&str> = key
        .split('.')
        .map(|segment| {
            let renamed = match segment {
                "query" => "to_q",
                "key" => "to_k",
                "value" => "to_v",
                "proj_attn" => "to_out.0",
                other => other,
            };
            changed |= renamed != segment;
            renamed
        })
        .collect();

    changed.then(|| converted.join("."))
}

/// Copy values from `state` into the parameters of `module`.
///
/// Keys are first passed through `convert`; a `Some` result renames the key.
/// A stored `[.., 1, 1]` tensor is accepted for a parameter of the same shape
/// without the trailing unit axes (1x1 convolution weights stored for linear
/// projections).
///
/// # Errors
///
/// Returns [`VaeError::ShapeMismatch`] if a stored tensor has a different
/// shape than the parameter it names. Parameters loaded before the error keep
/// their new values.
pub fn load_state_dict_into<M, F>(module: &mut M, state: &StateDict, convert: F) -> Result<LoadingInfo>
where
    M: Module + ?Sized,
    F: Fn(&str) -> Option<String>,
{
    let mut info = LoadingInfo::default();
    let mut by_name: BTreeMap<String, &(Vec<f32>, Vec<usize>)> = BTreeMap::new();

    for (key, entry) in state {
        let name = match convert(key) {
            Some(renamed) => {
                info.converted_keys.push((key.clone(), renamed.clone()));
                renamed
            }
            None => key.clone(),
        };
        by_name.insert(name, entry);
    }

    let mut used = BTreeSet::new();
    for (name, param) in module.named_parameters_mut() {
        let Some((data, shape)) = by_name.get(&name) else {
            info.missing_keys.push(name);
            continue;
        };

        if !shapes_compatible(param.shape(), shape) {
            return Err(VaeError::shape_mismatch(
                format!("parameter '{name}'"),
                param.shape(),
                shape,
            ));
        }

        *param = Tensor::new(data, param.shape());
        used.insert(name);
    }

    info.unexpected_keys = by_name
        .keys()
        .filter(|k| !used.contains(*k))
        .cloned()
        .collect();

    if !info.converted_keys.is_empty() {
        debug!(count = info.converted_keys.len(), "converted legacy parameter names");
    }
    Ok(info)
}

fn shapes_compatible(param: &[usize], stored: &[usize]) -> bool {
    if param == stored {
        return true;
    }
    stored.len() == param.len() + 2 && stored[..param.len()] == *param && stored[param.len()..] == [1, 1]
}

/// Save a module's parameters to a SafeTensors file.
///
/// # Errors
///
/// Returns [`VaeError::Serialization`] if the file cannot be written.
pub fn save_model<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> Result<()> {
    let state = state_dict(module, "");
    let mut user_metadata = UserMetadata::new();
    user_metadata.insert("format".to_string(), "pt".to_string());
    save_safetensors_with_metadata(path, &state, &user_metadata).map_err(VaeError::Serialization)
}

/// Load a state dictionary from a SafeTensors file.
///
/// # Errors
///
/// Returns [`VaeError::Serialization`] if the file is unreadable or malformed.
pub fn load_state_dict<P: AsRef<Path>>(path: P) -> Result<StateDict> {
    let (metadata, raw_data) = load_safetensors(path).map_err(VaeError::Serialization)?;

    let mut state = StateDict::new();
    for (name, tensor_meta) in metadata {
        let data = extract_tensor(&raw_data, &tensor_meta)
            .map_err(|e| VaeError::Serialization(format!("tensor '{name}': {e}")))?;
        state.insert(name, (data, tensor_meta.shape));
    }

    Ok(state)
}

/// Load parameters from a SafeTensors file into a module, names unchanged.
///
/// # Errors
///
/// See [`load_state_dict`] and [`load_state_dict_into`].
pub fn load_model<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> Result<LoadingInfo> {
    let state = load_state_dict(path)?;
    load_state_dict_into(module, &state, |_| None)
}

/// Number of scalar parameters that would be saved.
pub fn count_parameters<M: Module + ?Sized>(module: &M) -> usize {
    module.parameters().iter().map(|p| p.numel()).sum()
}
