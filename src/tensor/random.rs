//! Seeded random number generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Tensor;

/// Random source for sampling inputs and latent noise.
///
/// Two generators created with the same seed produce the same stream. The
/// stream is specific to this crate: seeds do not reproduce numbers drawn by
/// other frameworks.
///
/// # Example
///
/// ```
/// use aprender_vae::tensor::Generator;
///
/// let a = Generator::manual_seed(0).randn(&[2, 3]);
/// let b = Generator::manual_seed(0).randn(&[2, 3]);
/// assert_eq!(a.data(), b.data());
/// ```
#[derive(Debug, Clone)]
pub struct Generator {
    rng: StdRng,
    seed: Option<u64>,
}

impl Generator {
    /// Create a generator with a fixed seed.
    #[must_use]
    pub fn manual_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create a generator seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Seed this generator was created with, if any.
    #[must_use]
    pub fn initial_seed(&self) -> Option<u64> {
        self.seed
    }

    /// Sample from N(0, 1) (Box-Muller transform).
    #[must_use]
    pub fn randn(&mut self, shape: &[usize]) -> Tensor {
        let numel: usize = shape.iter().product();
        let data: Vec<f32> = (0..numel)
            .map(|_| {
                let u1: f32 = self.rng.gen_range(f32::MIN_POSITIVE..1.0_f32);
                let u2: f32 = self.rng.gen_range(0.0_f32..1.0_f32);
                (-2.0_f32 * u1.ln()).sqrt() * (2.0_f32 * std::f32::consts::PI * u2).cos()
            })
            .collect();

        Tensor::from_vec(data, shape)
    }

    /// Sample from U(0, 1).
    #[must_use]
    pub fn rand(&mut self, shape: &[usize]) -> Tensor {
        self.uniform(shape, 0.0, 1.0)
    }

    /// Sample from U(low, high).
    #[must_use]
    pub fn uniform(&mut self, shape: &[usize], low: f32, high: f32) -> Tensor {
        let numel: usize = shape.iter().product();
        let data: Vec<f32> = (0..numel).map(|_| self.rng.gen_range(low..high)).collect();
        Tensor::from_vec(data, shape)
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::from_entropy()
    }
}
