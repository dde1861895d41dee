use super::*;
use crate::nn::vae::{AutoencoderKL, DenseVae};
use serde_json::json;

fn object(value: Value) -> Map<String, Value> {
    let Value::Object(map) = value else {
        unreachable!("object literal")
    };
    map
}

fn sample(shape: &[usize]) -> ForwardInputs {
    let mut inputs = ForwardInputs::new();
    inputs.insert("sample".to_string(), Generator::manual_seed(0).randn(shape));
    inputs
}

struct DenseSubject;

impl ModelTester for DenseSubject {
    type Model = DenseVae;

    fn spec(&self) -> ModelSpec {
        ModelSpec::new(
            object(json!({"input_dim": 8, "hidden_dims": [6], "latent_dim": 2})),
            sample(&[4, 8]),
            vec![8],
            vec![8],
        )
    }

    fn forward_signature_hook(&self) -> Hook {
        Hook::Run
    }

    fn training_hook(&self) -> Hook {
        Hook::Run
    }
}

struct TinyKlSubject;

impl ModelTester for TinyKlSubject {
    type Model = AutoencoderKL;

    fn spec(&self) -> ModelSpec {
        ModelSpec::new(
            object(json!({"block_out_channels": [8], "norm_num_groups": 4, "sample_size": 8})),
            sample(&[2, 3, 8, 8]),
            vec![3, 8, 8],
            vec![3, 8, 8],
        )
    }

    fn forward_signature_hook(&self) -> Hook {
        Hook::skip("covered by the dense subject")
    }

    fn training_hook(&self) -> Hook {
        Hook::skip("no training loop")
    }
}

/// Declares an output shape the model cannot produce.
struct WrongOutputSubject;

impl ModelTester for WrongOutputSubject {
    type Model = DenseVae;

    fn spec(&self) -> ModelSpec {
        ModelSpec::new(
            object(json!({"input_dim": 8, "hidden_dims": [6], "latent_dim": 2})),
            sample(&[4, 8]),
            vec![8],
            vec![4],
        )
    }

    fn forward_signature_hook(&self) -> Hook {
        Hook::Run
    }

    fn training_hook(&self) -> Hook {
        Hook::skip("shape is already wrong")
    }
}

#[test]
fn test_dense_subject_passes_every_check() {
    let report = DenseSubject.run_all();
    report.assert_success();
    assert_eq!(report.passed().len(), 7);
    assert!(report.skipped().is_empty());
}

#[test]
fn test_skipped_hooks_are_reported() {
    let report = TinyKlSubject.run_all();
    report.assert_success();
    assert_eq!(report.skipped(), vec!["check_forward_signature", "check_training"]);
    assert!(matches!(
        report.outcome("check_training"),
        Some(CheckOutcome::Skipped { reason }) if reason == "no training loop"
    ));
    assert!(report.to_string().contains("check_training: skipped (no training loop)"));
}

#[test]
fn test_failures_are_collected() {
    let report = WrongOutputSubject.run_all();
    assert!(!report.is_success());
    let failed: Vec<_> = report.failures().into_iter().map(|(name, _)| name).collect();
    assert!(failed.contains(&"check_output"));
    assert!(matches!(
        report.outcome("check_output"),
        Some(CheckOutcome::Failed(VaeError::ShapeMismatch { .. }))
    ));
    assert!(report.to_string().contains("check_output: FAILED"));
}

#[test]
#[should_panic(expected = "conformance checks failed")]
fn test_assert_success_panics_on_failure() {
    WrongOutputSubject.run_all().assert_success();
}

#[test]
fn test_construct_and_run_output_shape() {
    let output = construct_and_run::<AutoencoderKL>(&TinyKlSubject.spec()).expect("conformant");
    assert_eq!(output.shape(), &[2, 3, 8, 8]);
}

#[test]
fn test_construct_and_run_rejects_wrong_output() {
    let err = construct_and_run::<DenseVae>(&WrongOutputSubject.spec()).expect_err("wrong shape");
    match err {
        VaeError::ShapeMismatch { expected, actual, .. } => {
            assert_eq!(expected, vec![4, 4]);
            assert_eq!(actual, vec![4, 8]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_construct_and_run_rejects_wrong_input_shape() {
    let spec = ModelSpec::new(
        object(json!({"input_dim": 8, "hidden_dims": [6], "latent_dim": 2})),
        sample(&[4, 8]),
        vec![6],
        vec![8],
    );
    assert!(matches!(
        construct_and_run::<DenseVae>(&spec),
        Err(VaeError::ShapeMismatch { ref context, .. }) if context == "sample input"
    ));
}

#[test]
fn test_construct_and_run_missing_input() {
    let spec = ModelSpec::new(
        object(json!({"input_dim": 8, "hidden_dims": [6], "latent_dim": 2})),
        ForwardInputs::new(),
        vec![8],
        vec![8],
    );
    assert!(matches!(
        construct_and_run::<DenseVae>(&spec),
        Err(VaeError::MissingInput(_))
    ));
}

#[test]
fn test_forward_signature_rejects_undeclared_input() {
    struct ExtraInput;
    impl ModelTester for ExtraInput {
        type Model = DenseVae;
        fn spec(&self) -> ModelSpec {
            let mut inputs = sample(&[4, 8]);
            inputs.insert("timestep".to_string(), Tensor::zeros(&[4]));
            ModelSpec::new(
                object(json!({"input_dim": 8, "hidden_dims": [6], "latent_dim": 2})),
                inputs,
                vec![8],
                vec![8],
            )
        }
        fn forward_signature_hook(&self) -> Hook {
            Hook::Run
        }
        fn training_hook(&self) -> Hook {
            Hook::Run
        }
    }

    let err = ExtraInput.check_forward_signature().expect_err("undeclared input");
    assert!(matches!(err, VaeError::MissingInput(ref msg) if msg.starts_with("timestep")));
}

#[test]
fn test_reference_slice_image() {
    let data: Vec<f32> = (0..32).map(|i| i as f32).collect();
    let output = Tensor::from_vec(data, &[1, 2, 4, 4]);
    assert_eq!(
        reference_slice(&output).expect("4d"),
        vec![21.0, 22.0, 23.0, 25.0, 26.0, 27.0, 29.0, 30.0, 31.0]
    );
}

#[test]
fn test_reference_slice_vector() {
    let data: Vec<f32> = (0..20).map(|i| i as f32).collect();
    let output = Tensor::from_vec(data, &[2, 10]);
    let expected: Vec<f32> = (1..10).map(|i| i as f32).collect();
    assert_eq!(reference_slice(&output).expect("2d"), expected);
}

#[test]
fn test_reference_slice_rejects_other_shapes() {
    assert!(matches!(
        reference_slice(&Tensor::zeros(&[1, 3, 4])),
        Err(VaeError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        reference_slice(&Tensor::zeros(&[1, 1, 2, 2])),
        Err(VaeError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_allclose_tolerance() {
    assert!(assert_allclose(&[1.0, -2.0], &[1.005, -2.01], 1e-2, 0.0).is_ok());
    assert!(assert_allclose(&[0.0], &[0.0], 0.0, REFERENCE_ATOL).is_ok());

    let err = assert_allclose(&[1.0, 2.0, 3.5, 4.5], &[1.0, 2.0, 3.0, 4.0], 1e-2, 1e-8)
        .expect_err("outside tolerance");
    match err {
        VaeError::NumericMismatch {
            index, mismatches, ..
        } => {
            assert_eq!(index, 2);
            assert_eq!(mismatches, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_allclose_length_mismatch() {
    assert!(matches!(
        assert_allclose(&[1.0; 8], &[1.0; 9], 1e-2, 1e-8),
        Err(VaeError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_compare_reference_output() {
    let mut model = AutoencoderKL::from_args(&TinyKlSubject.spec().constructor_args).expect("args");
    model.eval();

    let slice = reference_output(&model, 7).expect("slice");
    assert_eq!(slice.len(), 9);
    assert_eq!(slice, reference_output(&model, 7).expect("slice"));
    compare_reference_output(&model, 7, &slice, DEFAULT_RTOL).expect("matches itself");

    let shifted: Vec<f32> = slice.iter().map(|v| v + 1.0).collect();
    assert!(matches!(
        compare_reference_output(&model, 7, &shifted, DEFAULT_RTOL),
        Err(VaeError::NumericMismatch { mismatches: 9, .. })
    ));
    assert!(matches!(
        compare_reference_output(&model, 7, &slice[..8], DEFAULT_RTOL),
        Err(VaeError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_reference_output_seeds_input_and_noise_separately() {
    let mut model = AutoencoderKL::from_args(&TinyKlSubject.spec().constructor_args).expect("args");
    model.eval();

    let mut inputs = ForwardInputs::new();
    inputs.insert("sample".to_string(), Generator::manual_seed(5).randn(&[1, 3, 8, 8]));
    let output = model
        .forward_inputs(&inputs, Some(&mut Generator::manual_seed(5)))
        .expect("forward");
    let fresh_seeds = reference_slice(&output).expect("slice");
    assert_eq!(reference_output(&model, 5).expect("slice"), fresh_seeds);

    // Continuing the input stream for the noise gives a different latent.
    let mut shared = Generator::manual_seed(5);
    inputs.insert("sample".to_string(), shared.randn(&[1, 3, 8, 8]));
    let output = model.forward_inputs(&inputs, Some(&mut shared)).expect("forward");
    assert_ne!(reference_slice(&output).expect("slice"), fresh_seeds);
}

#[test]
fn test_load_from_hub_local_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = DenseVae::from_args(&DenseSubject.spec().constructor_args).expect("args");
    model.save_pretrained(dir.path()).expect("save");

    let identifier = dir.path().to_str().expect("utf-8 temp path");
    let loaded: DenseVae = load_from_hub(identifier).expect("complete load");
    assert!(!loaded.training());
}

#[test]
fn test_load_from_hub_reports_missing_keys() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = DenseVae::from_args(&DenseSubject.spec().constructor_args).expect("args");
    model.save_pretrained(dir.path()).expect("save");

    let mut config = PretrainedModel::config(&model).clone();
    config.hidden_dims = vec![6, 6];
    std::fs::write(
        dir.path().join(crate::pretrained::CONFIG_NAME),
        serde_json::to_string(&config).expect("serialize"),
    )
    .expect("write");

    let identifier = dir.path().to_str().expect("utf-8 temp path");
    match load_from_hub::<DenseVae>(identifier) {
        Err(VaeError::LoadIncomplete { missing_keys, .. }) => {
            assert!(missing_keys.contains(&"encoder_layers.1.weight".to_string()));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("load should be incomplete"),
    }
}

#[test]
fn test_unrecorded_fixture_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reference.json");
    let mut fixture = ReferenceFixture::new("tiny", 3, DEFAULT_RTOL);
    fixture.save(&path).expect("save");

    // Any model, however initialised, must be rejected.
    for _ in 0..2 {
        let mut model =
            AutoencoderKL::from_args(&TinyKlSubject.spec().constructor_args).expect("args");
        model.eval();
        match fixture.check_or_record_with(&model, &path, false) {
            Err(VaeError::MissingReference { identifier, .. }) => assert_eq!(identifier, "tiny"),
            other => panic!("unrecorded fixture accepted: {other:?}"),
        }
    }
    assert_eq!(ReferenceFixture::load(&path).expect("untouched"), fixture);
}

#[test]
fn test_fixture_records_then_matches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("reference.json");
    let mut model = AutoencoderKL::from_args(&TinyKlSubject.spec().constructor_args).expect("args");
    model.eval();

    let mut fixture = ReferenceFixture::new("tiny", 3, DEFAULT_RTOL);
    assert!(!fixture.is_recorded());
    assert_eq!(
        fixture.check_or_record_with(&model, &path, true).expect("record"),
        FixtureOutcome::Recorded
    );
    assert!(fixture.is_recorded());

    let mut reloaded = ReferenceFixture::load(&path).expect("fixture written");
    assert_eq!(reloaded, fixture);
    assert_eq!(
        reloaded.check_or_record_with(&model, &path, false).expect("match"),
        FixtureOutcome::Matched
    );

    reloaded.expected_slice[0] += 10.0;
    assert!(matches!(
        reloaded.check_or_record_with(&model, &path, false),
        Err(VaeError::NumericMismatch { index: 0, .. })
    ));
    assert_eq!(
        reloaded.check_or_record_with(&model, &path, true).expect("re-record"),
        FixtureOutcome::Recorded
    );
    assert_eq!(reloaded, fixture);
}

#[test]
fn test_fixture_defaults() {
    let fixture: ReferenceFixture =
        serde_json::from_str(r#"{"identifier": "org/name", "seed": 0}"#).expect("parse");
    assert!((fixture.rtol - DEFAULT_RTOL).abs() < f32::EPSILON);
    assert!(!fixture.is_recorded());
}
