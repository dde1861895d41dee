//! Diagonal Gaussian posterior q(z|x).

use crate::tensor::{Generator, Tensor};

const LOGVAR_MIN: f32 = -30.0;
const LOGVAR_MAX: f32 = 20.0;

/// Gaussian with diagonal covariance, parameterised by mean and log-variance.
///
/// Built from the encoder moments `[N, 2C, H, W]`: the first `C` channels are
/// the mean, the last `C` the log-variance (clamped to `[-30, 20]`).
#[derive(Debug, Clone)]
pub struct DiagonalGaussianDistribution {
    mean: Tensor,
    logvar: Tensor,
    std: Tensor,
    var: Tensor,
}

impl DiagonalGaussianDistribution {
    /// Split `moments` into mean and log-variance.
    ///
    /// # Panics
    ///
    /// Panics if `moments` has an odd channel count.
    #[must_use]
    pub fn new(moments: &Tensor) -> Self {
        let (mean, logvar) = moments.chunk_channels();
        Self::from_parts(mean, logvar)
    }

    /// Build from an explicit mean and log-variance of equal shape.
    #[must_use]
    pub fn from_parts(mean: Tensor, logvar: Tensor) -> Self {
        let logvar = logvar.clamp(LOGVAR_MIN, LOGVAR_MAX);
        let std = logvar.scale(0.5).exp();
        let var = logvar.exp();
        Self {
            mean,
            logvar,
            std,
            var,
        }
    }

    /// Mean.
    #[must_use]
    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    /// Clamped log-variance.
    #[must_use]
    pub fn logvar(&self) -> &Tensor {
        &self.logvar
    }

    /// Standard deviation.
    #[must_use]
    pub fn std(&self) -> &Tensor {
        &self.std
    }

    /// Variance.
    #[must_use]
    pub fn var(&self) -> &Tensor {
        &self.var
    }

    /// Reparameterised draw `mean + std * eps` with `eps ~ N(0, I)`.
    #[must_use]
    pub fn sample(&self, generator: &mut Generator) -> Tensor {
        let eps = generator.randn(self.mean.shape());
        self.mean.add(&self.std.mul(&eps))
    }

    /// Most likely latent (the mean).
    #[must_use]
    pub fn mode(&self) -> Tensor {
        self.mean.clone()
    }

    /// KL(q || N(0, I)) summed over all non-batch axes, one value per sample.
    #[must_use]
    pub fn kl(&self) -> Vec<f32> {
        let batch = self.mean.shape().first().copied().unwrap_or(1).max(1);
        let per_sample = self.mean.numel() / batch;

        let terms: Vec<f32> = self
            .mean
            .data()
            .iter()
            .zip(self.var.data())
            .zip(self.logvar.data())
            .map(|((m, v), lv)| m * m + v - 1.0 - lv)
            .collect();

        terms
            .chunks(per_sample.max(1))
            .map(|chunk| 0.5 * chunk.iter().sum::<f32>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_moments() {
        // 1 sample, 2 latent channels, 1x2 spatial
        let moments = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0], &[1, 4, 1, 2]);
        let dist = DiagonalGaussianDistribution::new(&moments);
        assert_eq!(dist.mean().shape(), &[1, 2, 1, 2]);
        assert_eq!(dist.mean().data(), &[1.0, 2.0, 3.0, 4.0]);
        assert!(dist.std().data().iter().all(|&s| (s - 1.0).abs() < 1e-6));
        assert_eq!(dist.mode(), *dist.mean());
    }

    #[test]
    fn test_logvar_clamped() {
        let dist = DiagonalGaussianDistribution::from_parts(
            Tensor::zeros(&[1, 2]),
            Tensor::from_vec(vec![-100.0, 100.0], &[1, 2]),
        );
        assert_eq!(dist.logvar().data(), &[-30.0, 20.0]);
        assert!(dist.var().all_finite());
    }

    #[test]
    fn test_standard_normal_has_zero_kl() {
        let dist =
            DiagonalGaussianDistribution::from_parts(Tensor::zeros(&[2, 3]), Tensor::zeros(&[2, 3]));
        assert_eq!(dist.kl(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_kl_of_shifted_mean() {
        let dist = DiagonalGaussianDistribution::from_parts(
            Tensor::from_vec(vec![2.0, 0.0], &[1, 2]),
            Tensor::zeros(&[1, 2]),
        );
        assert!((dist.kl()[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_is_seeded() {
        let dist = DiagonalGaussianDistribution::from_parts(
            Tensor::ones(&[1, 4, 2, 2]),
            Tensor::full(&[1, 4, 2, 2], -2.0),
        );
        let a = dist.sample(&mut Generator::manual_seed(3));
        let b = dist.sample(&mut Generator::manual_seed(3));
        assert_eq!(a, b);
        assert_ne!(a, dist.mode());
    }
}
