//! Reference slices stored as JSON next to the tests.
//!
//! ```json
//! {
//!   "identifier": "fusing/autoencoder-kl-dummy",
//!   "seed": 0,
//!   "rtol": 0.01,
//!   "expected_slice": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]
//! }
//! ```
//!
//! Checking a fixture with an empty `expected_slice` is an error. Set
//! [`RECORD_REFERENCE_ENV`] to `1` to record (or re-record) the slice.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{compare_reference_output, reference_output};
use crate::error::{Result, VaeError};
use crate::pretrained::PretrainedModel;

/// Environment variable that switches fixtures to record mode.
pub const RECORD_REFERENCE_ENV: &str = "APRENDER_VAE_RECORD_REFERENCE";

/// What [`ReferenceFixture::check_or_record`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureOutcome {
    /// Output matched the stored slice.
    Matched,
    /// Output was written as the new stored slice.
    Recorded,
}

/// Expected output slice of a pretrained model under a fixed seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFixture {
    /// Model identifier (repo id or directory).
    pub identifier: String,
    /// Seed of the input and posterior generators.
    pub seed: u64,
    /// Relative tolerance.
    #[serde(default = "default_rtol")]
    pub rtol: f32,
    /// Expected [`super::reference_slice`] values; empty until recorded.
    #[serde(default)]
    pub expected_slice: Vec<f32>,
}

fn default_rtol() -> f32 {
    super::DEFAULT_RTOL
}

impl ReferenceFixture {
    /// An unrecorded fixture.
    #[must_use]
    pub fn new(identifier: impl Into<String>, seed: u64, rtol: f32) -> Self {
        Self {
            identifier: identifier.into(),
            seed,
            rtol,
            expected_slice: Vec::new(),
        }
    }

    /// Read a fixture file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error if the file is missing or malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the fixture as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    }

    /// True once an expected slice is stored.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        !self.expected_slice.is_empty()
    }

    /// Compare `model` against the stored slice, or re-record it when
    /// [`RECORD_REFERENCE_ENV`] is `1`, saving the result to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::MissingReference`] for an unrecorded fixture outside
    /// record mode and [`VaeError::NumericMismatch`] when the output drifts
    /// from the stored slice.
    pub fn check_or_record<M: PretrainedModel>(
        &mut self,
        model: &M,
        path: impl AsRef<Path>,
    ) -> Result<FixtureOutcome> {
        let record = std::env::var(RECORD_REFERENCE_ENV).is_ok_and(|v| v == "1");
        self.check_or_record_with(model, path.as_ref(), record)
    }

    pub(super) fn check_or_record_with<M: PretrainedModel>(
        &mut self,
        model: &M,
        path: &Path,
        record: bool,
    ) -> Result<FixtureOutcome> {
        if !record {
            if !self.is_recorded() {
                return Err(VaeError::MissingReference {
                    identifier: self.identifier.clone(),
                    path: path.display().to_string(),
                });
            }
            compare_reference_output(model, self.seed, &self.expected_slice, self.rtol)?;
            return Ok(FixtureOutcome::Matched);
        }

        if self.is_recorded() {
            warn!(identifier = %self.identifier, "overwriting recorded reference slice");
        }
        self.expected_slice = reference_output(model, self.seed)?;
        self.save(path)?;
        info!(
            identifier = %self.identifier,
            path = %path.display(),
            slice = ?self.expected_slice,
            "recorded reference slice"
        );
        Ok(FixtureOutcome::Recorded)
    }
}
