//! Pooling layers: Max, Average, GlobalMax, GlobalAverage.
//!
//! Windowed pooling works on every `(batch, channel)` plane independently.
//! Padding for max pooling is filled with `f32::NEG_INFINITY` so a padded
//! cell never wins over a real one. Average pooling divides either by the
//! full kernel area or by the window's true overlap with the unpadded input.

use std::borrow::Cow;

use crate::error::{PicoError, PicoResult};
use crate::math::{self, AverageDivisor};
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use super::{check_output, Layer, LayerInfo};

/// Window size, stride and optional `(top, left, bottom, right)` padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub kernel_size: [usize; 2],
    pub stride: [usize; 2],
    pub padding: Option<[usize; 4]>,
}

impl PoolConfig {
    /// Window of `kernel_size` with stride equal to the window and no padding.
    pub fn new(kernel_size: [usize; 2]) -> Self {
        Self {
            kernel_size,
            stride: kernel_size,
            padding: None,
        }
    }

    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: [usize; 4]) -> Self {
        self.padding = Some(padding);
        self
    }

    fn validate(&self) -> PicoResult<()> {
        if self.kernel_size.contains(&0) {
            return Err(PicoError::EmptyKernel);
        }
        if self.stride.contains(&0) {
            return Err(PicoError::ZeroStride);
        }
        Ok(())
    }

    fn pad(&self) -> [usize; 4] {
        self.padding.unwrap_or([0; 4])
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        check_pool_rank(input)?;
        let [n, c, ph, pw] = input.padded(self.pad())?.spatial();
        let [kh, kw] = self.kernel_size;
        if kh > ph || kw > pw {
            return Err(PicoError::KernelLargerThanInput {
                kernel_h: kh,
                kernel_w: kw,
                input_h: ph,
                input_w: pw,
            });
        }
        let [sh, sw] = self.stride;
        TensorShape::from_spatial(input.layout(), [n, c, (ph - kh) / sh + 1, (pw - kw) / sw + 1])
    }

    fn padded_input<'a>(&self, input: &'a Tensor, fill: f32) -> PicoResult<Cow<'a, Tensor>> {
        match self.padding {
            Some(pad) if pad != [0; 4] => Ok(Cow::Owned(input.expand_with_padding(pad, fill)?)),
            _ => Ok(Cow::Borrowed(input)),
        }
    }
}

fn check_pool_rank(input: &TensorShape) -> PicoResult<()> {
    if input.rank() != 3 && input.rank() != 4 {
        return Err(PicoError::UnsupportedRank {
            op: "pooling",
            rank: input.rank(),
        });
    }
    Ok(())
}

// =============================================================================
// MaxPooling
// =============================================================================

pub struct MaxPooling {
    info: LayerInfo,
    config: PoolConfig,
}

impl MaxPooling {
    pub fn new(info: LayerInfo, config: PoolConfig) -> PicoResult<Self> {
        config.validate()?;
        Ok(Self { info, config })
    }
}

impl Layer for MaxPooling {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        self.config.output_shape(input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        let out_shape = check_output(self, input, output)?;
        let padded = self.config.padded_input(input, f32::NEG_INFINITY)?;
        let [_, _, ph, pw] = padded.shape().spatial();
        let [_, _, oh, ow] = out_shape.spatial();
        let src = padded.as_slice();
        let (kernel, stride) = (self.config.kernel_size, self.config.stride);

        math::for_each_plane(output.as_mut_slice(), oh * ow, |p, plane| {
            let channel = &src[p * ph * pw..(p + 1) * ph * pw];
            math::max_pool_plane(channel, pw, kernel, stride, plane, ow);
        });
        Ok(())
    }
}

// =============================================================================
// AveragePooling
// =============================================================================

pub struct AveragePooling {
    info: LayerInfo,
    config: PoolConfig,
    count_include_pad: bool,
}

impl AveragePooling {
    pub fn new(info: LayerInfo, config: PoolConfig, count_include_pad: bool) -> PicoResult<Self> {
        config.validate()?;
        Ok(Self {
            info,
            config,
            count_include_pad,
        })
    }
}

impl Layer for AveragePooling {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        self.config.output_shape(input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        let out_shape = check_output(self, input, output)?;
        let padded = self.config.padded_input(input, 0.0)?;
        let [_, _, h, w] = input.shape().spatial();
        let [_, _, ph, pw] = padded.shape().spatial();
        let [_, _, oh, ow] = out_shape.spatial();
        let [top, left, _, _] = self.config.pad();

        let divisor = if self.count_include_pad {
            AverageDivisor::KernelArea
        } else {
            AverageDivisor::Clipped {
                top,
                left,
                height: h,
                width: w,
            }
        };
        let src = padded.as_slice();
        let (kernel, stride) = (self.config.kernel_size, self.config.stride);

        math::try_for_each_plane(output.as_mut_slice(), oh * ow, |p, plane| {
            let channel = &src[p * ph * pw..(p + 1) * ph * pw];
            math::average_pool_plane(channel, pw, kernel, stride, divisor, plane, ow)
        })
    }
}

// =============================================================================
// Global pooling
// =============================================================================

fn global_output_shape(input: &TensorShape) -> PicoResult<TensorShape> {
    check_pool_rank(input)?;
    let [n, c, _, _] = input.spatial();
    TensorShape::from_spatial(input.layout(), [n, c, 1, 1])
}

/// Maximum of each channel's whole spatial extent.
pub struct GlobalMaxPooling {
    info: LayerInfo,
}

impl GlobalMaxPooling {
    pub fn new(info: LayerInfo) -> Self {
        Self { info }
    }
}

impl Layer for GlobalMaxPooling {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        global_output_shape(input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        let [_, _, h, w] = input.shape().spatial();
        for (out, plane) in output.as_mut_slice().iter_mut().zip(input.as_slice().chunks_exact(h * w)) {
            *out = plane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        }
        Ok(())
    }
}

/// Mean of each channel's whole spatial extent.
pub struct GlobalAveragePooling {
    info: LayerInfo,
}

impl GlobalAveragePooling {
    pub fn new(info: LayerInfo) -> Self {
        Self { info }
    }
}

impl Layer for GlobalAveragePooling {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        global_output_shape(input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        let [_, _, h, w] = input.shape().spatial();
        let area = (h * w) as f32;
        for (out, plane) in output.as_mut_slice().iter_mut().zip(input.as_slice().chunks_exact(h * w)) {
            *out = plane.iter().sum::<f32>() / area;
        }
        Ok(())
    }
}
