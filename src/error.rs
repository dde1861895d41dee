//! Error types for aprender-vae operations.
//!
//! Provides rich error context for library consumers and for the
//! conformance harness, which reports its assertion failures through the
//! same enum.

use thiserror::Error;

use crate::hf_hub::HfHubError;

/// Main error type for model construction, loading and conformance checks.
///
/// # Examples
///
/// ```
/// use aprender_vae::error::VaeError;
///
/// let err = VaeError::ShapeMismatch {
///     context: "decoder output".to_string(),
///     expected: vec![3, 32, 32],
///     actual: vec![3, 16, 16],
/// };
/// assert!(err.to_string().contains("shape mismatch"));
/// ```
#[derive(Debug, Error)]
pub enum VaeError {
    /// A tensor shape disagrees with what the caller declared.
    #[error("{context}: shape mismatch, expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// What was being checked
        context: String,
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Pretrained loading left model weights without a checkpoint value.
    #[error(
        "incomplete weight load for '{identifier}': {} missing key(s): {}",
        missing_keys.len(),
        missing_keys.join(", ")
    )]
    LoadIncomplete {
        /// Model identifier (repo id or directory)
        identifier: String,
        /// Parameter names the checkpoint did not provide
        missing_keys: Vec<String>,
    },

    /// Reference comparison exceeded tolerance.
    #[error(
        "numeric mismatch in {mismatches} element(s); first at index {index}: \
         expected {expected}, got {actual} (rtol {rtol})"
    )]
    NumericMismatch {
        /// Index of the first offending element
        index: usize,
        /// Expected value at `index`
        expected: f32,
        /// Actual value at `index`
        actual: f32,
        /// Relative tolerance used
        rtol: f32,
        /// Total number of elements outside tolerance
        mismatches: usize,
    },

    /// A reference fixture has no stored slice to compare against.
    #[error(
        "no reference slice recorded for '{identifier}' in {path}; \
         run with APRENDER_VAE_RECORD_REFERENCE=1 to record one"
    )]
    MissingReference {
        /// Model identifier of the fixture
        identifier: String,
        /// Fixture file
        path: String,
    },

    /// Invalid configuration option.
    #[error("invalid config: {param} = {value}, expected {constraint}")]
    InvalidConfig {
        /// Option name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A named forward input was not supplied.
    #[error("missing forward input '{0}'")]
    MissingInput(String),

    /// Weight (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Hugging Face Hub error.
    #[error(transparent)]
    Hub(#[from] HfHubError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (config) error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaeError {
    /// Shorthand for a [`VaeError::ShapeMismatch`].
    pub fn shape_mismatch(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Shorthand for a [`VaeError::InvalidConfig`].
    pub fn invalid_config(
        param: impl Into<String>,
        value: impl std::fmt::Display,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            param: param.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }
}

/// Convenience type alias for results.
pub type Result<T> = std::result::Result<T, VaeError>;
