//! 2D convolution.
//!
//! Follows the `PyTorch` `Conv2d` API and weight layout
//! (`[out_channels, in_channels, kernel_h, kernel_w]`).
//!
//! # References
//!
//! - `LeCun`, Y., et al. (1998). Gradient-based learning applied to document
//!   recognition. Proceedings of the IEEE.
//! - He, K., et al. (2015). Delving deep into rectifiers: Surpassing
//!   human-level performance on `ImageNet` classification. ICCV.

use rayon::prelude::*;

use super::init::{kaiming_uniform, zeros};
use super::module::Module;
use crate::tensor::Tensor;

/// 2D Convolution layer.
///
/// # Shape
///
/// - Input: `(N, C_in, H, W)`
/// - Output: `(N, C_out, H_out, W_out)` where
///   `H_out = (H + 2*padding - kernel) / stride + 1`
///
/// # Example
///
/// ```
/// use aprender_vae::nn::{Conv2d, Module};
/// use aprender_vae::tensor::Tensor;
///
/// let conv = Conv2d::with_padding(3, 8, 3, 1);
/// let y = conv.forward(&Tensor::zeros(&[2, 3, 16, 16]));
/// assert_eq!(y.shape(), &[2, 8, 16, 16]);
/// ```
pub struct Conv2d {
    /// Weight tensor, shape: [`out_channels`, `in_channels`, `kernel_h`, `kernel_w`]
    weight: Tensor,
    /// Bias tensor, shape: [`out_channels`], or None
    bias: Option<Tensor>,
    in_channels: usize,
    out_channels: usize,
    kernel_h: usize,
    kernel_w: usize,
    stride_h: usize,
    stride_w: usize,
    padding_h: usize,
    padding_w: usize,
}

impl Conv2d {
    /// Create a new Conv2d layer with square kernel, stride 1, no padding.
    #[must_use]
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self::with_options(
            in_channels,
            out_channels,
            (kernel_size, kernel_size),
            (1, 1),
            (0, 0),
            true,
        )
    }

    /// Create Conv2d with custom options.
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Number of input channels
    /// * `out_channels` - Number of output channels
    /// * `kernel_size` - (height, width) of the kernel
    /// * `stride` - (height, width) stride
    /// * `padding` - (height, width) zero padding
    /// * `bias` - If true, adds a learnable bias
    #[must_use]
    pub fn with_options(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        bias: bool,
    ) -> Self {
        let (kernel_h, kernel_w) = kernel_size;

        let fan_in = in_channels * kernel_h * kernel_w;
        let weight = kaiming_uniform(
            &[out_channels, in_channels, kernel_h, kernel_w],
            fan_in,
            None,
        );

        let bias_tensor = bias.then(|| zeros(&[out_channels]));

        Self {
            weight,
            bias: bias_tensor,
            in_channels,
            out_channels,
            kernel_h,
            kernel_w,
            stride_h: stride.0,
            stride_w: stride.1,
            padding_h: padding.0,
            padding_w: padding.1,
        }
    }

    /// Create Conv2d with stride and no padding.
    #[must_use]
    pub fn with_stride(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        Self::with_options(
            in_channels,
            out_channels,
            (kernel_size, kernel_size),
            (stride, stride),
            (0, 0),
            true,
        )
    }

    /// Create Conv2d with padding and stride 1.
    #[must_use]
    pub fn with_padding(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
    ) -> Self {
        Self::with_options(
            in_channels,
            out_channels,
            (kernel_size, kernel_size),
            (1, 1),
            (padding, padding),
            true,
        )
    }

    /// Number of input channels.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Number of output channels.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Get kernel size as (height, width).
    #[must_use]
    pub fn kernel_size(&self) -> (usize, usize) {
        (self.kernel_h, self.kernel_w)
    }

    /// Get stride as (height, width).
    #[must_use]
    pub fn stride(&self) -> (usize, usize) {
        (self.stride_h, self.stride_w)
    }

    /// Get padding as (height, width).
    #[must_use]
    pub fn padding(&self) -> (usize, usize) {
        (self.padding_h, self.padding_w)
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(
            input.ndim(),
            4,
            "Conv2d expects 4D input [N, C, H, W], got {}D",
            input.ndim()
        );

        let shape = input.shape();
        let (batch_size, in_channels, in_h, in_w) = (shape[0], shape[1], shape[2], shape[3]);

        assert_eq!(
            in_channels, self.in_channels,
            "Expected {} input channels, got {}",
            self.in_channels, in_channels
        );
        assert!(
            in_h + 2 * self.padding_h >= self.kernel_h && in_w + 2 * self.padding_w >= self.kernel_w,
            "Conv2d kernel {:?} larger than padded input {}x{}",
            (self.kernel_h, self.kernel_w),
            in_h + 2 * self.padding_h,
            in_w + 2 * self.padding_w
        );

        let out_h = (in_h + 2 * self.padding_h - self.kernel_h) / self.stride_h + 1;
        let out_w = (in_w + 2 * self.padding_w - self.kernel_w) / self.stride_w + 1;
        let plane = out_h * out_w;

        let input_data = input.data();
        let weight_data = self.weight.data();
        let bias_data = self.bias.as_ref().map(Tensor::data);
        let kernel_area = self.kernel_h * self.kernel_w;

        let mut output = vec![0.0; batch_size * self.out_channels * plane];

        // One output plane per task: (n, oc) = divmod(index, out_channels)
        output
            .par_chunks_mut(plane)
            .enumerate()
            .for_each(|(index, out)| {
                let (n, oc) = (index / self.out_channels, index % self.out_channels);
                if let Some(bias) = bias_data {
                    out.fill(bias[oc]);
                }

                for ic in 0..self.in_channels {
                    let src = &input_data[(n * in_channels + ic) * in_h * in_w..][..in_h * in_w];
                    let kernel =
                        &weight_data[(oc * self.in_channels + ic) * kernel_area..][..kernel_area];

                    for kh in 0..self.kernel_h {
                        for kw in 0..self.kernel_w {
                            let w = kernel[kh * self.kernel_w + kw];
                            if w == 0.0 {
                                continue;
                            }
                            for oh in 0..out_h {
                                let ih = oh * self.stride_h + kh;
                                if ih < self.padding_h || ih >= in_h + self.padding_h {
                                    continue;
                                }
                                let row = &src[(ih - self.padding_h) * in_w..][..in_w];
                                let out_row = &mut out[oh * out_w..][..out_w];
                                for (ow, acc) in out_row.iter_mut().enumerate() {
                                    let iw = ow * self.stride_w + kw;
                                    if iw >= self.padding_w && iw < in_w + self.padding_w {
                                        *acc += w * row[iw - self.padding_w];
                                    }
                                }
                            }
                        }
                    }
                }
            });

        Tensor::from_vec(output, &[batch_size, self.out_channels, out_h, out_w])
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

impl std::fmt::Debug for Conv2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conv2d")
            .field("in_channels", &self.in_channels)
            .field("out_channels", &self.out_channels)
            .field("kernel_size", &(self.kernel_h, self.kernel_w))
            .field("stride", &(self.stride_h, self.stride_w))
            .field("padding", &(self.padding_h, self.padding_w))
            .field("bias", &self.bias.is_some())
            .finish_non_exhaustive()
    }
}
