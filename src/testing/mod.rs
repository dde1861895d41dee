//! Model conformance harness.
//!
//! A fixed battery of checks any [`PretrainedModel`] can be run against:
//!
//! | check | asserts |
//! |-------|---------|
//! | `check_output` | constructed model maps the sample input to the declared output shape |
//! | `check_construction_idempotent` | identical arguments give identical parameter layouts |
//! | `check_determinism` | two eval-mode passes agree |
//! | `check_from_save_pretrained` | save, reload, same outputs, no missing keys |
//! | `check_model_from_config` | the config survives a JSON round trip |
//! | `check_forward_signature` | hook: declared input names cover the sample inputs |
//! | `check_training` | hook: training-mode pass is finite |
//!
//! A subject implements [`ModelTester`], supplying a [`ModelSpec`] and an
//! explicit [`Hook`] decision for each optional check, then calls
//! [`ModelTester::run_all`]. Pretrained subjects additionally use
//! [`load_from_hub`] and [`compare_reference_output`] (or a
//! [`ReferenceFixture`]).
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use aprender_vae::nn::vae::DenseVae;
//! use aprender_vae::tensor::Generator;
//! use aprender_vae::testing::{Hook, ModelSpec, ModelTester};
//!
//! struct DenseVaeTester;
//!
//! impl ModelTester for DenseVaeTester {
//!     type Model = DenseVae;
//!
//!     fn spec(&self) -> ModelSpec {
//!         let args = serde_json::json!({"input_dim": 8, "hidden_dims": [6], "latent_dim": 2});
//!         let mut inputs = BTreeMap::new();
//!         inputs.insert("sample".to_string(), Generator::manual_seed(0).randn(&[4, 8]));
//!         ModelSpec::new(args.as_object().cloned().unwrap_or_default(), inputs, vec![8], vec![8])
//!     }
//!
//!     fn forward_signature_hook(&self) -> Hook {
//!         Hook::Run
//!     }
//!
//!     fn training_hook(&self) -> Hook {
//!         Hook::Run
//!     }
//! }
//!
//! DenseVaeTester.run_all().assert_success();
//! ```

mod fixture;

pub use fixture::{FixtureOutcome, ReferenceFixture, RECORD_REFERENCE_ENV};

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, VaeError};
use crate::nn::Module;
use crate::pretrained::{ForwardInputs, PretrainedModel};
use crate::tensor::{Generator, Tensor};

/// Default relative tolerance of [`compare_reference_output`].
pub const DEFAULT_RTOL: f32 = 1e-2;

/// Absolute tolerance floor of reference comparisons.
pub const REFERENCE_ATOL: f32 = 1e-8;

/// Maximum elementwise difference allowed by `check_determinism`.
pub const DETERMINISM_TOL: f32 = 1e-5;

/// Maximum elementwise difference allowed by `check_from_save_pretrained`.
pub const SAVE_LOAD_TOL: f32 = 5e-5;

/// One test case: how to build the model and what to feed it.
///
/// Shapes exclude the batch dimension.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    constructor_args: Map<String, Value>,
    sample_input: ForwardInputs,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
}

impl ModelSpec {
    /// Create a spec.
    #[must_use]
    pub fn new(
        constructor_args: Map<String, Value>,
        sample_input: BTreeMap<String, Tensor>,
        input_shape: Vec<usize>,
        output_shape: Vec<usize>,
    ) -> Self {
        Self {
            constructor_args,
            sample_input,
            input_shape,
            output_shape,
        }
    }

    /// Constructor options.
    #[must_use]
    pub fn constructor_args(&self) -> &Map<String, Value> {
        &self.constructor_args
    }

    /// Named forward inputs, batch dimension included.
    #[must_use]
    pub fn sample_input(&self) -> &ForwardInputs {
        &self.sample_input
    }

    /// Per-sample shape of the main input.
    #[must_use]
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Per-sample shape of the output.
    #[must_use]
    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }
}

/// Per-subject decision for an optional check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    /// Run the check.
    Run,
    /// Report the check as skipped.
    Skip {
        /// Why the subject opts out.
        reason: String,
    },
}

impl Hook {
    /// Shorthand for [`Hook::Skip`].
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip {
            reason: reason.into(),
        }
    }
}

/// Result of one check.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Assertion held.
    Passed,
    /// Subject opted out.
    Skipped {
        /// Reason given by the subject.
        reason: String,
    },
    /// Assertion failed.
    Failed(VaeError),
}

impl CheckOutcome {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Outcomes of a [`ModelTester::run_all`] battery, in run order.
#[derive(Debug, Default)]
pub struct ConformanceReport {
    outcomes: Vec<(&'static str, CheckOutcome)>,
}

impl ConformanceReport {
    fn record(&mut self, check: &'static str, outcome: CheckOutcome) {
        match &outcome {
            CheckOutcome::Passed => debug!(check, "passed"),
            CheckOutcome::Skipped { reason } => debug!(check, reason = %reason, "skipped"),
            CheckOutcome::Failed(e) => warn!(check, error = %e, "failed"),
        }
        self.outcomes.push((check, outcome));
    }

    /// All outcomes.
    #[must_use]
    pub fn outcomes(&self) -> &[(&'static str, CheckOutcome)] {
        &self.outcomes
    }

    /// Outcome of the named check, if it ran.
    #[must_use]
    pub fn outcome(&self, check: &str) -> Option<&CheckOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == check)
            .map(|(_, outcome)| outcome)
    }

    /// Names of the passed checks.
    #[must_use]
    pub fn passed(&self) -> Vec<&'static str> {
        self.filter(|o| matches!(o, CheckOutcome::Passed))
    }

    /// Names of the skipped checks.
    #[must_use]
    pub fn skipped(&self) -> Vec<&'static str> {
        self.filter(|o| matches!(o, CheckOutcome::Skipped { .. }))
    }

    /// Failed checks with their errors.
    #[must_use]
    pub fn failures(&self) -> Vec<(&'static str, &VaeError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                CheckOutcome::Failed(e) => Some((*name, e)),
                _ => None,
            })
            .collect()
    }

    /// True if no check failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    /// Panic with every failure if any check failed.
    ///
    /// # Panics
    ///
    /// Panics if [`ConformanceReport::is_success`] is false.
    pub fn assert_success(&self) {
        assert!(self.is_success(), "conformance checks failed:\n{self}");
    }

    fn filter(&self, keep: impl Fn(&CheckOutcome) -> bool) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| keep(outcome))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, outcome) in &self.outcomes {
            match outcome {
                CheckOutcome::Passed => writeln!(f, "  {name}: ok")?,
                CheckOutcome::Skipped { reason } => writeln!(f, "  {name}: skipped ({reason})")?,
                CheckOutcome::Failed(e) => writeln!(f, "  {name}: FAILED: {e}")?,
            }
        }
        Ok(())
    }
}

/// Build the model from `spec`, run it on the sample input and check the
/// per-sample output shape.
///
/// # Errors
///
/// Returns [`VaeError::ShapeMismatch`] if the main sample input or the output
/// disagrees with the declared shapes; construction and forward errors are
/// passed through.
pub fn construct_and_run<M: PretrainedModel>(spec: &ModelSpec) -> Result<Tensor> {
    let mut model = M::from_args(spec.constructor_args())?;
    model.eval();
    run_checked(&model, spec)
}

fn run_checked<M: PretrainedModel>(model: &M, spec: &ModelSpec) -> Result<Tensor> {
    let main = model.forward_input_names().first().copied().unwrap_or("sample");
    let sample = spec
        .sample_input()
        .get(main)
        .ok_or_else(|| VaeError::MissingInput(main.to_string()))?;
    check_per_sample_shape("sample input", spec.input_shape(), sample.shape())?;

    let output = model.forward_inputs(spec.sample_input(), None)?;
    check_per_sample_shape("model output", spec.output_shape(), output.shape())?;
    if output.shape().first() != sample.shape().first() {
        return Err(VaeError::shape_mismatch(
            "output batch",
            &sample.shape()[..1],
            &output.shape()[..output.ndim().min(1)],
        ));
    }
    Ok(output)
}

fn check_per_sample_shape(context: &str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if actual.len() == expected.len() + 1 && actual[1..] == *expected {
        return Ok(());
    }
    let mut full = Vec::with_capacity(expected.len() + 1);
    full.push(actual.first().copied().unwrap_or(1));
    full.extend_from_slice(expected);
    Err(VaeError::shape_mismatch(context, &full, actual))
}

/// Load a pretrained model and require a complete weight load.
///
/// # Errors
///
/// Returns [`VaeError::LoadIncomplete`] if any model weight was missing from
/// the checkpoint; loading errors are passed through.
pub fn load_from_hub<M: PretrainedModel>(identifier: &str) -> Result<M> {
    let (model, info) = M::from_pretrained_with_info(identifier)?;
    if !info.missing_keys.is_empty() {
        return Err(VaeError::LoadIncomplete {
            identifier: identifier.to_string(),
            missing_keys: info.missing_keys,
        });
    }
    Ok(model)
}

/// The fixed output slice compared against references: `output[0, -1, -3:, -3:]`
/// for image outputs, `output[0, -9:]` for vector outputs.
///
/// # Errors
///
/// Returns [`VaeError::ShapeMismatch`] for other ranks or outputs too small
/// for the slice.
pub fn reference_slice(output: &Tensor) -> Result<Vec<f32>> {
    let shape = output.shape();
    let data = output.data();
    match *shape {
        [n, c, h, w] if n > 0 && c > 0 && h >= 3 && w >= 3 => {
            let plane = (c - 1) * h * w;
            Ok((h - 3..h)
                .flat_map(|y| data[plane + y * w + w - 3..plane + (y + 1) * w].iter().copied())
                .collect())
        }
        [n, f] if n > 0 && f >= 9 => Ok(data[f - 9..f].to_vec()),
        _ => Err(VaeError::shape_mismatch(
            "reference slice source (need [N>0, C>0, H>=3, W>=3] or [N>0, F>=9])",
            &[],
            shape,
        )),
    }
}

/// Elementwise `|actual - expected| <= atol + rtol * |expected|`.
///
/// # Errors
///
/// Returns [`VaeError::ShapeMismatch`] on a length mismatch and
/// [`VaeError::NumericMismatch`] naming the first offending element.
pub fn assert_allclose(actual: &[f32], expected: &[f32], rtol: f32, atol: f32) -> Result<()> {
    if actual.len() != expected.len() {
        return Err(VaeError::shape_mismatch(
            "compared values",
            &[expected.len()],
            &[actual.len()],
        ));
    }

    let mut first = None;
    let mut mismatches = 0;
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let close = (a - e).abs() <= atol + rtol * e.abs();
        if !close {
            mismatches += 1;
            first.get_or_insert((i, e, a));
        }
    }

    match first {
        None => Ok(()),
        Some((index, expected, actual)) => Err(VaeError::NumericMismatch {
            index,
            expected,
            actual,
            rtol,
            mismatches,
        }),
    }
}

/// Run `model` on a seeded input and return the [`reference_slice`].
///
/// The input `[1, ..reference_input_shape]` and the model's posterior noise
/// each come from their own generator freshly seeded with `seed`.
///
/// # Errors
///
/// Forward errors and [`reference_slice`] errors are passed through.
pub fn reference_output<M: PretrainedModel>(model: &M, seed: u64) -> Result<Vec<f32>> {
    let mut shape = vec![1];
    shape.extend(model.reference_input_shape());

    let mut inputs = ForwardInputs::new();
    let main = model.forward_input_names().first().copied().unwrap_or("sample");
    inputs.insert(main.to_string(), Generator::manual_seed(seed).randn(&shape));

    let mut noise = Generator::manual_seed(seed);
    let output = model.forward_inputs(&inputs, Some(&mut noise))?;
    reference_slice(&output)
}

/// Compare the seeded [`reference_output`] of `model` with `expected_slice`.
///
/// # Errors
///
/// Returns [`VaeError::NumericMismatch`] if an element is outside
/// `rtol` (absolute floor [`REFERENCE_ATOL`]) and [`VaeError::ShapeMismatch`]
/// if `expected_slice` has the wrong length.
pub fn compare_reference_output<M: PretrainedModel>(
    model: &M,
    seed: u64,
    expected_slice: &[f32],
    rtol: f32,
) -> Result<()> {
    let actual = reference_output(model, seed)?;
    assert_allclose(&actual, expected_slice, rtol, REFERENCE_ATOL)
}

fn assert_outputs_close(context: &str, a: &Tensor, b: &Tensor, tol: f32) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(VaeError::shape_mismatch(context, a.shape(), b.shape()));
    }
    assert_allclose(b.data(), a.data(), 0.0, tol)
}

fn parameter_layout<M: Module>(model: &M) -> Vec<(String, Vec<usize>)> {
    model
        .named_parameters()
        .into_iter()
        .map(|(name, p)| (name, p.shape().to_vec()))
        .collect()
}

fn check_same_layout<M: Module>(context: &str, a: &M, b: &M) -> Result<()> {
    let (la, lb) = (parameter_layout(a), parameter_layout(b));
    if la.len() != lb.len() {
        return Err(VaeError::shape_mismatch(
            format!("{context}: parameter count"),
            &[la.len()],
            &[lb.len()],
        ));
    }
    for ((na, sa), (nb, sb)) in la.iter().zip(&lb) {
        if na != nb || sa != sb {
            return Err(VaeError::shape_mismatch(format!("{context}: '{na}' vs '{nb}'"), sa, sb));
        }
    }
    Ok(())
}

/// A conformance subject.
///
/// Implementors supply the test case and decide each optional check
/// explicitly; the checks themselves are provided.
pub trait ModelTester {
    /// Model under test.
    type Model: PretrainedModel;

    /// A fresh test case.
    fn spec(&self) -> ModelSpec;

    /// Whether to validate the forward input names.
    fn forward_signature_hook(&self) -> Hook;

    /// Whether to exercise training mode.
    fn training_hook(&self) -> Hook;

    /// [`construct_and_run`] on [`ModelTester::spec`].
    ///
    /// # Errors
    ///
    /// See [`construct_and_run`].
    fn check_output(&self) -> Result<()> {
        construct_and_run::<Self::Model>(&self.spec()).map(|_| ())
    }

    /// Two constructions from the same arguments agree in layout and output shape.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::ShapeMismatch`] on any disagreement.
    fn check_construction_idempotent(&self) -> Result<()> {
        let spec = self.spec();
        let mut first = Self::Model::from_args(spec.constructor_args())?;
        let mut second = Self::Model::from_args(spec.constructor_args())?;
        first.eval();
        second.eval();
        check_same_layout("repeated construction", &first, &second)?;

        let a = run_checked(&first, &spec)?;
        let b = run_checked(&second, &spec)?;
        if a.shape() != b.shape() {
            return Err(VaeError::shape_mismatch("repeated construction output", a.shape(), b.shape()));
        }
        Ok(())
    }

    /// Two eval-mode passes over the same input agree within [`DETERMINISM_TOL`].
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::NumericMismatch`] if they differ.
    fn check_determinism(&self) -> Result<()> {
        let spec = self.spec();
        let mut model = Self::Model::from_args(spec.constructor_args())?;
        model.eval();

        let first = model.forward_inputs(spec.sample_input(), None)?;
        let second = model.forward_inputs(spec.sample_input(), None)?;
        assert_outputs_close("repeated forward", &first, &second, DETERMINISM_TOL)
    }

    /// Save to a temporary directory, reload, compare outputs within
    /// [`SAVE_LOAD_TOL`].
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::LoadIncomplete`] if the reload misses weights and
    /// [`VaeError::NumericMismatch`] if outputs differ.
    fn check_from_save_pretrained(&self) -> Result<()> {
        let spec = self.spec();
        let mut model = Self::Model::from_args(spec.constructor_args())?;
        model.eval();

        let dir = tempfile::tempdir()?;
        model.save_pretrained(dir.path())?;
        let (reloaded, info) = Self::Model::load_pretrained_dir(dir.path())?;
        if !info.missing_keys.is_empty() {
            return Err(VaeError::LoadIncomplete {
                identifier: dir.path().display().to_string(),
                missing_keys: info.missing_keys,
            });
        }

        let before = run_checked(&model, &spec)?;
        let after = run_checked(&reloaded, &spec)?;
        assert_outputs_close("save/load round trip", &before, &after, SAVE_LOAD_TOL)
    }

    /// The configuration survives JSON and rebuilds the same layout.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::InvalidConfig`] if the config changes and
    /// [`VaeError::ShapeMismatch`] if the layout does.
    fn check_model_from_config(&self) -> Result<()> {
        let spec = self.spec();
        let model = Self::Model::from_args(spec.constructor_args())?;

        let json = serde_json::to_string(model.config())?;
        let restored: <Self::Model as PretrainedModel>::Config = serde_json::from_str(&json)?;
        if &restored != model.config() {
            return Err(VaeError::invalid_config(
                "config",
                json,
                "a value that survives a JSON round trip",
            ));
        }

        let mut rebuilt = Self::Model::from_config(restored)?;
        rebuilt.eval();
        check_same_layout("model from config", &model, &rebuilt)?;
        run_checked(&rebuilt, &spec).map(|_| ())
    }

    /// The main input is `sample` and every sample input is a declared input.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::MissingInput`] naming the offending input.
    fn check_forward_signature(&self) -> Result<()> {
        let spec = self.spec();
        let model = Self::Model::from_args(spec.constructor_args())?;
        let names = model.forward_input_names();

        if names.first() != Some(&"sample") {
            return Err(VaeError::MissingInput("sample".to_string()));
        }
        if let Some(unknown) = spec.sample_input().keys().find(|k| !names.contains(&k.as_str())) {
            return Err(VaeError::MissingInput(format!(
                "{unknown} (declared inputs: {})",
                names.join(", ")
            )));
        }
        Ok(())
    }

    /// A training-mode pass yields finite outputs and a finite reconstruction
    /// loss; `train`/`eval` toggle the mode.
    ///
    /// # Errors
    ///
    /// Returns [`VaeError::NumericMismatch`] for non-finite values and
    /// [`VaeError::InvalidConfig`] if the mode does not toggle.
    fn check_training(&self) -> Result<()> {
        let spec = self.spec();
        let mut model = Self::Model::from_args(spec.constructor_args())?;
        model.train();
        if !model.training() {
            return Err(VaeError::invalid_config("training", false, "true after train()"));
        }

        let output = run_checked(&model, &spec)?;
        if let Some(index) = output.data().iter().position(|v| !v.is_finite()) {
            return Err(VaeError::NumericMismatch {
                index,
                expected: 0.0,
                actual: output.data()[index],
                rtol: 0.0,
                mismatches: output.data().iter().filter(|v| !v.is_finite()).count(),
            });
        }

        let main = model.forward_input_names().first().copied().unwrap_or("sample");
        let loss = match spec.sample_input().get(main) {
            Some(target) if target.shape() == output.shape() => {
                let diff = output.sub(target);
                diff.mul(&diff).mean()
            }
            _ => output.mul(&output).mean(),
        };
        if !loss.is_finite() {
            return Err(VaeError::NumericMismatch {
                index: 0,
                expected: 0.0,
                actual: loss,
                rtol: 0.0,
                mismatches: 1,
            });
        }

        model.eval();
        if model.training() {
            return Err(VaeError::invalid_config("training", true, "false after eval()"));
        }
        Ok(())
    }

    /// Run every check; hooks decide the optional ones.
    fn run_all(&self) -> ConformanceReport {
        let mut report = ConformanceReport::default();
        report.record("check_output", CheckOutcome::from_result(self.check_output()));
        report.record(
            "check_construction_idempotent",
            CheckOutcome::from_result(self.check_construction_idempotent()),
        );
        report.record("check_determinism", CheckOutcome::from_result(self.check_determinism()));
        report.record(
            "check_from_save_pretrained",
            CheckOutcome::from_result(self.check_from_save_pretrained()),
        );
        report.record(
            "check_model_from_config",
            CheckOutcome::from_result(self.check_model_from_config()),
        );

        let signature = match self.forward_signature_hook() {
            Hook::Run => CheckOutcome::from_result(self.check_forward_signature()),
            Hook::Skip { reason } => CheckOutcome::Skipped { reason },
        };
        report.record("check_forward_signature", signature);

        let training = match self.training_hook() {
            Hook::Run => CheckOutcome::from_result(self.check_training()),
            Hook::Skip { reason } => CheckOutcome::Skipped { reason },
        };
        report.record("check_training", training);

        report
    }
}

#[cfg(test)]
mod tests;
