use super::*;

fn small() -> DenseVae {
    DenseVae::new(DenseVaeConfig {
        input_dim: 100,
        hidden_dims: vec![64],
        latent_dim: 10,
        beta: 1.0,
    })
    .expect("valid config")
}

#[test]
fn test_dense_vae_creation() {
    let vae = DenseVae::new(DenseVaeConfig {
        input_dim: 784,
        hidden_dims: vec![256, 128],
        latent_dim: 20,
        beta: 1.0,
    })
    .expect("valid config");

    assert_eq!(vae.input_dim(), 784);
    assert_eq!(vae.latent_dim(), 20);
    assert_eq!(vae.beta(), 1.0);
}

#[test]
fn test_dense_vae_with_beta() {
    let vae = small().with_beta(4.0);
    assert_eq!(vae.beta(), 4.0);
}

#[test]
fn test_dense_vae_invalid_config() {
    let config = DenseVaeConfig {
        latent_dim: 0,
        ..DenseVaeConfig::default()
    };
    assert!(matches!(
        DenseVae::new(config),
        Err(VaeError::InvalidConfig { .. })
    ));

    let config = DenseVaeConfig {
        beta: -1.0,
        ..DenseVaeConfig::default()
    };
    assert!(DenseVae::new(config).is_err());
}

#[test]
fn test_dense_vae_encode_decode_shapes() {
    let vae = small();

    let (mu, log_var) = vae.encode(&Tensor::ones(&[4, 100])).expect("encode");
    assert_eq!(mu.shape(), &[4, 10]);
    assert_eq!(log_var.shape(), &[4, 10]);

    let reconstruction = vae.decode(&Tensor::ones(&[4, 10])).expect("decode");
    assert_eq!(reconstruction.shape(), &[4, 100]);
}

#[test]
fn test_dense_vae_rejects_wrong_width() {
    let vae = small();
    let err = vae.encode(&Tensor::ones(&[4, 99])).expect_err("width 99");
    match err {
        VaeError::ShapeMismatch { expected, actual, .. } => {
            assert_eq!(expected, vec![4, 100]);
            assert_eq!(actual, vec![4, 99]);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_dense_vae_forward() {
    let vae = small();
    let output = vae.forward_vae(&Tensor::ones(&[4, 100]), None).expect("forward");

    assert_eq!(output.reconstruction.shape(), &[4, 100]);
    assert_eq!(output.mu.shape(), &[4, 10]);
    assert_eq!(output.log_var.shape(), &[4, 10]);
    assert_eq!(output.z.shape(), &[4, 10]);

    assert_eq!(vae.forward(&Tensor::ones(&[4, 100])).shape(), &[4, 100]);
}

#[test]
fn test_dense_vae_loss() {
    let vae = small().with_beta(2.0);
    let x = Tensor::ones(&[4, 100]);
    let output = vae.forward_vae(&x, None).expect("forward");
    let (total, recon, kl) = vae.loss(&output, &x);

    assert!(recon >= 0.0);
    assert!(kl.is_finite());
    assert!((total - (recon + 2.0 * kl)).abs() < 1e-4);
}

#[test]
fn test_kl_zero_for_standard_normal() {
    let kl = kl_divergence_loss(&Tensor::zeros(&[3, 5]), &Tensor::zeros(&[3, 5]));
    assert_eq!(kl, 0.0);
}

#[test]
fn test_dense_vae_sample() {
    let vae = small();
    let a = vae.sample(8, &mut Generator::manual_seed(1));
    let b = vae.sample(8, &mut Generator::manual_seed(1));
    assert_eq!(a.shape(), &[8, 100]);
    assert_eq!(a, b);
}

#[test]
fn test_dense_vae_interpolate() {
    let vae = small();
    let x1 = Tensor::ones(&[1, 100]);
    let x2 = Tensor::zeros(&[1, 100]);

    let steps = vae.interpolate(&x1, &x2, 5).expect("interpolate");
    assert_eq!(steps.len(), 5);
    for step in &steps {
        assert_eq!(step.shape(), &[1, 100]);
    }

    // Endpoints decode the latent means.
    let (mu1, _) = vae.encode(&x1).expect("encode");
    let first = vae.decode(&mu1).expect("decode");
    assert!(steps[0].max_abs_diff(&first) < 1e-5);
}

#[test]
fn test_dense_vae_interpolate_mismatched_endpoints() {
    let vae = small();
    assert!(vae
        .interpolate(&Tensor::ones(&[1, 100]), &Tensor::ones(&[2, 100]), 3)
        .is_err());
}

#[test]
fn test_dense_vae_train_eval() {
    let mut vae = small();
    assert!(vae.training());

    vae.eval();
    assert!(!vae.training());

    vae.train();
    assert!(vae.training());
}

#[test]
fn test_dense_vae_parameters() {
    let vae = small();
    // encoder + fc_mu + fc_log_var + decoder + output = 5 linears, weight + bias each
    assert_eq!(vae.parameters().len(), 10);

    let names: Vec<String> = vae.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names[0], "encoder_layers.0.weight");
    assert!(names.contains(&"fc_log_var.bias".to_string()));
    assert_eq!(names.last().map(String::as_str), Some("output_layer.bias"));
}

#[test]
fn test_dense_vae_reparameterize_eval_returns_mean() {
    let mut vae = small();
    vae.eval();

    let mu = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
    let log_var = Tensor::zeros(&[2, 2]);

    assert_eq!(vae.reparameterize(&mu, &log_var, None).data(), mu.data());
}

#[test]
fn test_dense_vae_reparameterize_with_generator() {
    let mut vae = small();
    vae.eval();

    let mu = Tensor::zeros(&[4, 10]);
    let log_var = Tensor::zeros(&[4, 10]);
    let z = vae.reparameterize(&mu, &log_var, Some(&mut Generator::manual_seed(9)));

    assert_eq!(z, Generator::manual_seed(9).randn(&[4, 10]));
}
