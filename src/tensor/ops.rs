//! Elementwise and shape operations.

use super::Tensor;

impl Tensor {
    fn zip_with(&self, other: &Tensor, op: &str, f: impl Fn(f32, f32) -> f32) -> Tensor {
        assert_eq!(
            self.shape, other.shape,
            "{op}: shape mismatch {:?} vs {:?}",
            self.shape, other.shape
        );
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor::from_vec(data, &self.shape)
    }

    /// Apply `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor::from_vec(self.data.iter().map(|&v| f(v)).collect(), &self.shape)
    }

    /// Elementwise addition.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Elementwise subtraction.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    #[must_use]
    pub fn sub(&self, other: &Tensor) -> Tensor {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Elementwise (Hadamard) product.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    #[must_use]
    pub fn mul(&self, other: &Tensor) -> Tensor {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    /// Multiply every element by `factor`.
    #[must_use]
    pub fn scale(&self, factor: f32) -> Tensor {
        self.map(|v| v * factor)
    }

    /// Elementwise exponential.
    #[must_use]
    pub fn exp(&self) -> Tensor {
        self.map(f32::exp)
    }

    /// Clamp every element into `[min, max]`.
    #[must_use]
    pub fn clamp(&self, min: f32, max: f32) -> Tensor {
        self.map(|v| v.clamp(min, max))
    }

    /// Mean of all elements (0 for an empty tensor).
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Largest absolute elementwise difference.
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    #[must_use]
    pub fn max_abs_diff(&self, other: &Tensor) -> f32 {
        assert_eq!(
            self.shape, other.shape,
            "max_abs_diff: shape mismatch {:?} vs {:?}",
            self.shape, other.shape
        );
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }

    /// Reinterpret the data with a new shape.
    ///
    /// # Panics
    ///
    /// Panics if the element count changes.
    #[must_use]
    pub fn reshape(&self, shape: &[usize]) -> Tensor {
        Tensor::new(&self.data, shape)
    }

    /// Split a `[N, C, ...]` tensor into two halves along the channel axis.
    ///
    /// # Panics
    ///
    /// Panics if the tensor has fewer than 2 dimensions or an odd channel count.
    #[must_use]
    pub fn chunk_channels(&self) -> (Tensor, Tensor) {
        assert!(self.ndim() >= 2, "chunk_channels expects at least 2D input");
        let (batch, channels) = (self.shape[0], self.shape[1]);
        assert!(
            channels % 2 == 0,
            "chunk_channels expects an even channel count, got {channels}"
        );
        let half = channels / 2;
        let inner: usize = self.shape[2..].iter().product();

        let mut first = Vec::with_capacity(self.numel() / 2);
        let mut second = Vec::with_capacity(self.numel() / 2);
        for sample in self.data.chunks(channels * inner).take(batch) {
            first.extend_from_slice(&sample[..half * inner]);
            second.extend_from_slice(&sample[half * inner..]);
        }

        let mut shape = self.shape.clone();
        shape[1] = half;
        (Tensor::from_vec(first, &shape), Tensor::from_vec(second, &shape))
    }

    /// Zero-pad the two spatial axes of a `[N, C, H, W]` tensor.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 4D.
    #[must_use]
    pub fn pad2d(&self, left: usize, right: usize, top: usize, bottom: usize) -> Tensor {
        assert_eq!(self.ndim(), 4, "pad2d expects 4D input [N, C, H, W]");
        let (planes, h, w) = (self.shape[0] * self.shape[1], self.shape[2], self.shape[3]);
        let (out_h, out_w) = (h + top + bottom, w + left + right);

        let mut out = vec![0.0; planes * out_h * out_w];
        for p in 0..planes {
            for y in 0..h {
                let src = p * h * w + y * w;
                let dst = p * out_h * out_w + (y + top) * out_w + left;
                out[dst..dst + w].copy_from_slice(&self.data[src..src + w]);
            }
        }

        Tensor::from_vec(out, &[self.shape[0], self.shape[1], out_h, out_w])
    }

    /// Nearest-neighbour upsampling of a `[N, C, H, W]` tensor by `factor`.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 4D.
    #[must_use]
    pub fn upsample_nearest2d(&self, factor: usize) -> Tensor {
        assert_eq!(self.ndim(), 4, "upsample_nearest2d expects 4D input [N, C, H, W]");
        let (planes, h, w) = (self.shape[0] * self.shape[1], self.shape[2], self.shape[3]);
        let (out_h, out_w) = (h * factor, w * factor);

        let mut out = Vec::with_capacity(planes * out_h * out_w);
        for p in 0..planes {
            for oy in 0..out_h {
                let row = &self.data[p * h * w + (oy / factor) * w..][..w];
                for ox in 0..out_w {
                    out.push(row[ox / factor]);
                }
            }
        }

        Tensor::from_vec(out, &[self.shape[0], self.shape[1], out_h, out_w])
    }

    /// `[N, C, H, W]` -> `[N, H*W, C]`.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 4D.
    #[must_use]
    pub fn to_channels_last(&self) -> Tensor {
        assert_eq!(self.ndim(), 4, "to_channels_last expects 4D input [N, C, H, W]");
        let (n, c, hw) = (self.shape[0], self.shape[1], self.shape[2] * self.shape[3]);

        let mut out = vec![0.0; self.numel()];
        for b in 0..n {
            for ch in 0..c {
                for s in 0..hw {
                    out[b * hw * c + s * c + ch] = self.data[b * c * hw + ch * hw + s];
                }
            }
        }

        Tensor::from_vec(out, &[n, hw, c])
    }

    /// `[N, H*W, C]` -> `[N, C, H, W]`.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 3D or `height * width` disagrees with it.
    #[must_use]
    pub fn to_channels_first(&self, height: usize, width: usize) -> Tensor {
        assert_eq!(self.ndim(), 3, "to_channels_first expects 3D input [N, HW, C]");
        let (n, hw, c) = (self.shape[0], self.shape[1], self.shape[2]);
        assert_eq!(hw, height * width, "to_channels_first: {hw} != {height}x{width}");

        let mut out = vec![0.0; self.numel()];
        for b in 0..n {
            for s in 0..hw {
                for ch in 0..c {
                    out[b * c * hw + ch * hw + s] = self.data[b * hw * c + s * c + ch];
                }
            }
        }

        Tensor::from_vec(out, &[n, c, height, width])
    }
}
