//! The [`Module`] trait shared by every layer and model.

use crate::tensor::Tensor;

/// A neural network building block.
///
/// Parameters are exposed by name so that composite modules can produce
/// dotted checkpoint keys (`encoder.down_blocks.0.resnets.0.conv1.weight`).
/// Leaf layers name their tensors `weight` / `bias`; containers prefix the
/// names of their children with [`scoped`].
pub trait Module {
    /// Run the forward pass.
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Named parameters in a stable order.
    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        Vec::new()
    }

    /// Mutable named parameters, in the same order as [`Module::named_parameters`].
    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        Vec::new()
    }

    /// All parameters, without names.
    fn parameters(&self) -> Vec<&Tensor> {
        self.named_parameters().into_iter().map(|(_, p)| p).collect()
    }

    /// Switch to training mode.
    fn train(&mut self) {}

    /// Switch to evaluation mode.
    fn eval(&mut self) {}

    /// Whether the module is in training mode.
    fn training(&self) -> bool {
        false
    }
}

/// Prefix every name in `named` with `prefix.`.
pub fn scoped<T>(prefix: &str, named: Vec<(String, T)>) -> Vec<(String, T)> {
    named
        .into_iter()
        .map(|(name, p)| (format!("{prefix}.{name}"), p))
        .collect()
}
