//! Weight serialization.
//!
//! ## `SafeTensors` Format
//! Industry-standard format compatible with the `HuggingFace` ecosystem.
//! ```text
//! [8-byte header: u64 metadata length (little-endian)]
//! [JSON metadata: tensor names, dtypes, shapes, data_offsets]
//! [Raw tensor data]
//! ```
//!
//! Example:
//! ```rust
//! use std::collections::BTreeMap;
//! use aprender_vae::serialization::safetensors::{extract_tensor, load_safetensors, save_safetensors};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("weights.safetensors");
//!
//! let mut tensors = BTreeMap::new();
//! tensors.insert("bias".to_string(), (vec![0.5_f32, -0.5], vec![2]));
//! save_safetensors(&path, &tensors).unwrap();
//!
//! let (metadata, raw) = load_safetensors(&path).unwrap();
//! assert_eq!(extract_tensor(&raw, &metadata["bias"]).unwrap(), vec![0.5, -0.5]);
//! ```

pub mod safetensors;

pub use safetensors::SafeTensorsMetadata;
