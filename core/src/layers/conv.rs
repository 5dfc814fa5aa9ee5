//! Convolution layer with grouped channels and asymmetric padding.
//!
//! Kernels are `[out_channels, in_channels / groups, kh, kw]` (or
//! `[out_channels, in_channels / groups, kw]` for 1-D signals) and are
//! applied as an unflipped cross-correlation. Non-zero padding first
//! materializes a zero-padded copy of the input.

use std::borrow::Cow;

use crate::error::{PicoError, PicoResult};
use crate::math;
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use super::{check_output, Layer, LayerInfo};

/// Stride, padding and grouping of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvConfig {
    /// `(vertical, horizontal)`
    pub stride: [usize; 2],
    /// `(top, left, bottom, right)`
    pub padding: [usize; 4],
    pub groups: usize,
}

impl Default for ConvConfig {
    fn default() -> Self {
        Self {
            stride: [1, 1],
            padding: [0; 4],
            groups: 1,
        }
    }
}

impl ConvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: [usize; 4]) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }
}

/// Inner-loop implementation used for each `(output channel, input channel)` pair.
///
/// Both strategies compute the same sums in the same order; `Unrolled`
/// dispatches common square kernels to constant-size loops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConvStrategy {
    #[default]
    Reference,
    Unrolled,
}

impl ConvStrategy {
    #[allow(clippy::too_many_arguments)]
    #[inline]
    fn accumulate(
        self,
        input: &[f32],
        in_w: usize,
        kernel: &[f32],
        kh: usize,
        kw: usize,
        stride: [usize; 2],
        output: &mut [f32],
        out_w: usize,
    ) {
        use math::correlate_accumulate_fixed as fixed;
        match (self, kh, kw) {
            (ConvStrategy::Unrolled, 1, 1) => fixed::<1, 1>(input, in_w, kernel, stride, output, out_w),
            (ConvStrategy::Unrolled, 3, 3) => fixed::<3, 3>(input, in_w, kernel, stride, output, out_w),
            (ConvStrategy::Unrolled, 5, 5) => fixed::<5, 5>(input, in_w, kernel, stride, output, out_w),
            (ConvStrategy::Unrolled, 11, 11) => fixed::<11, 11>(input, in_w, kernel, stride, output, out_w),
            _ => math::correlate_accumulate(input, in_w, kernel, kh, kw, stride, output, out_w),
        }
    }
}

pub struct Convolution<'w> {
    info: LayerInfo,
    kernel: &'w Tensor,
    bias: Option<&'w Tensor>,
    config: ConvConfig,
    strategy: ConvStrategy,
    /// `[out_channels, in_channels_per_group, kh, kw]`
    kernel_dims: [usize; 4],
}

impl<'w> Convolution<'w> {
    pub fn new(
        info: LayerInfo,
        kernel: &'w Tensor,
        bias: Option<&'w Tensor>,
        config: ConvConfig,
    ) -> PicoResult<Self> {
        if kernel.is_empty() {
            return Err(PicoError::EmptyKernel);
        }
        let kernel_dims = match *kernel.shape().dims() {
            [o, c, h, w] => [o, c, h, w],
            [o, c, w] => [o, c, 1, w],
            _ => {
                return Err(PicoError::UnsupportedRank {
                    op: "convolution kernel",
                    rank: kernel.rank(),
                })
            }
        };
        if config.stride.contains(&0) {
            return Err(PicoError::ZeroStride);
        }
        let out_channels = kernel_dims[0];
        if config.groups == 0 || out_channels % config.groups != 0 {
            return Err(PicoError::InvalidGroups {
                channels: out_channels,
                groups: config.groups,
            });
        }
        if let Some(bias) = bias {
            if bias.len() != out_channels {
                return Err(PicoError::ParameterLength {
                    what: "convolution bias",
                    expected: out_channels,
                    actual: bias.len(),
                });
            }
        }
        Ok(Self {
            info,
            kernel,
            bias,
            config,
            strategy: ConvStrategy::default(),
            kernel_dims,
        })
    }

    pub fn with_strategy(mut self, strategy: ConvStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &ConvConfig {
        &self.config
    }

    pub fn strategy(&self) -> ConvStrategy {
        self.strategy
    }

    pub fn out_channels(&self) -> usize {
        self.kernel_dims[0]
    }
}

impl Layer for Convolution<'_> {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        if input.rank() != 3 && input.rank() != 4 {
            return Err(PicoError::UnsupportedRank {
                op: "convolution",
                rank: input.rank(),
            });
        }
        let [n, c, _, _] = input.spatial();
        if n != 1 {
            return Err(PicoError::UnsupportedBatch {
                op: "convolution",
                batches: n,
            });
        }
        let [o, ci, kh, kw] = self.kernel_dims;
        let groups = self.config.groups;
        if c % groups != 0 {
            return Err(PicoError::InvalidGroups { channels: c, groups });
        }
        if c / groups != ci {
            return Err(PicoError::DimensionMismatch {
                expected: ci * groups,
                actual: c,
            });
        }

        let [_, _, ph, pw] = input.padded(self.config.padding)?.spatial();
        if kh > ph || kw > pw {
            return Err(PicoError::KernelLargerThanInput {
                kernel_h: kh,
                kernel_w: kw,
                input_h: ph,
                input_w: pw,
            });
        }
        let [sh, sw] = self.config.stride;
        TensorShape::from_spatial(input.layout(), [1, o, (ph - kh) / sh + 1, (pw - kw) / sw + 1])
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        let out_shape = check_output(self, input, output)?;

        let padded: Cow<'_, Tensor> = if self.config.padding == [0; 4] {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(input.expand_with_padding(self.config.padding, 0.0)?)
        };

        let [_, _, ph, pw] = padded.shape().spatial();
        let [_, o, oh, ow] = out_shape.spatial();
        let [_, ci, kh, kw] = self.kernel_dims;
        let out_per_group = o / self.config.groups;
        let (in_plane, out_plane, taps) = (ph * pw, oh * ow, kh * kw);

        let src = padded.as_slice();
        let weights = self.kernel.as_slice();
        let bias = self.bias.map(Tensor::as_slice);
        let (strategy, stride) = (self.strategy, self.config.stride);

        for (g, group_out) in output
            .as_mut_slice()
            .chunks_mut(out_per_group * out_plane)
            .enumerate()
        {
            let group_in = &src[g * ci * in_plane..(g + 1) * ci * in_plane];
            math::for_each_plane(group_out, out_plane, |j, plane| {
                let oc = g * out_per_group + j;
                plane.fill(0.0);
                for ic in 0..ci {
                    let channel = &group_in[ic * in_plane..(ic + 1) * in_plane];
                    let k = &weights[(oc * ci + ic) * taps..(oc * ci + ic + 1) * taps];
                    strategy.accumulate(channel, pw, k, kh, kw, stride, plane, ow);
                }
                if let Some(bias) = bias {
                    let b = bias[oc];
                    plane.iter_mut().for_each(|v| *v += b);
                }
            });
        }
        Ok(())
    }
}
