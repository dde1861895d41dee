//! Fully connected (linear) layer.
//!
//! Implements the transformation y = xW^T + b.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

use super::init::{xavier_uniform, zeros};
use super::module::Module;
use crate::tensor::Tensor;

/// Fully connected layer: y = xW^T + b
///
/// Weight initialization follows Xavier/Glorot (Glorot & Bengio, 2010).
///
/// # Shape
///
/// - Input: `(*, in_features)` where `*` means any number of batch dimensions
/// - Output: `(*, out_features)`
///
/// # Example
///
/// ```
/// use aprender_vae::nn::{Linear, Module};
/// use aprender_vae::tensor::Tensor;
///
/// let layer = Linear::new(20, 30);
/// let output = layer.forward(&Tensor::zeros(&[128, 20]));
/// assert_eq!(output.shape(), &[128, 30]);
/// ```
pub struct Linear {
    /// Weight matrix, shape: [out_features, in_features]
    weight: Tensor,

    /// Bias vector, shape: [out_features], or None if bias=false
    bias: Option<Tensor>,

    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a new Linear layer with Xavier initialization.
    #[must_use]
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_seed(in_features, out_features, None)
    }

    /// Create a Linear layer with a specific random seed.
    #[must_use]
    pub fn with_seed(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(
            &[out_features, in_features],
            in_features,
            out_features,
            seed,
        );

        Self {
            weight,
            bias: Some(zeros(&[out_features])),
            in_features,
            out_features,
        }
    }

    /// Get the input feature dimension.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Get the output feature dimension.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Get reference to weight tensor.
    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        assert_eq!(
            shape.last().copied(),
            Some(self.in_features),
            "Linear expects last dimension {}, got shape {:?}",
            self.in_features,
            shape
        );

        let rows = input.numel() / self.in_features;
        let x = input.data();
        let w = self.weight.data();
        let bias = self.bias.as_ref().map(Tensor::data);

        let mut output = Vec::with_capacity(rows * self.out_features);
        for row in x.chunks_exact(self.in_features) {
            for (o, w_row) in w.chunks_exact(self.in_features).enumerate() {
                let dot: f32 = row.iter().zip(w_row).map(|(a, b)| a * b).sum();
                output.push(dot + bias.map_or(0.0, |b| b[o]));
            }
        }

        let mut out_shape = shape.to_vec();
        if let Some(last) = out_shape.last_mut() {
            *last = self.out_features;
        }
        Tensor::from_vec(output, &out_shape)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = vec![("weight".to_string(), &self.weight)];
        if let Some(b) = &self.bias {
            params.push(("bias".to_string(), b));
        }
        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let mut params = vec![("weight".to_string(), &mut self.weight)];
        if let Some(b) = &mut self.bias {
            params.push(("bias".to_string(), b));
        }
        params
    }
}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features)
            .field("out_features", &self.out_features)
            .field("bias", &self.bias.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_shape() {
        let layer = Linear::new(10, 5);
        let y = layer.forward(&Tensor::ones(&[4, 10]));
        assert_eq!(y.shape(), &[4, 5]);
    }

    #[test]
    fn test_linear_batched_3d() {
        let layer = Linear::new(8, 3);
        let y = layer.forward(&Tensor::ones(&[2, 16, 8]));
        assert_eq!(y.shape(), &[2, 16, 3]);
    }

    #[test]
    fn test_linear_known_values() {
        let mut layer = Linear::new(2, 2);
        for (name, p) in layer.named_parameters_mut() {
            match name.as_str() {
                "weight" => p.data_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]),
                _ => p.data_mut().copy_from_slice(&[0.5, -0.5]),
            }
        }

        let y = layer.forward(&Tensor::new(&[1.0, 1.0], &[1, 2]));
        assert_eq!(y.data(), &[3.5, 6.5]);
    }

    #[test]
    fn test_linear_seeded() {
        let a = Linear::with_seed(6, 4, Some(42));
        let b = Linear::with_seed(6, 4, Some(42));
        assert_eq!(a.weight(), b.weight());
    }

    #[test]
    #[should_panic(expected = "Linear expects last dimension 10")]
    fn test_linear_wrong_input() {
        let _ = Linear::new(10, 5).forward(&Tensor::ones(&[4, 9]));
    }
}
