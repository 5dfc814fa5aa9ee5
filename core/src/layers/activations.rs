//! Activation layers: ReLU, LeakyReLU, ParametricReLU, Sigmoid, TanH,
//! Softmax, Clip, LRN.
//!
//! All of them preserve the input shape. Apart from LRN, which mixes
//! neighbouring channels, each is a pure per-element map.

use crate::error::{PicoError, PicoResult};
use crate::math;
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use super::{check_output, Layer, LayerInfo};

/// Check shapes, then apply `f` from the input buffer to the output buffer.
fn map_elements(
    layer: &impl Layer,
    input: &Tensor,
    output: &mut Tensor,
    f: impl FnOnce(&[f32], &mut [f32]),
) -> PicoResult<()> {
    check_output(layer, input, output)?;
    f(input.as_slice(), output.as_mut_slice());
    Ok(())
}

// =============================================================================
// ReLU
// =============================================================================

/// max(x, 0)
pub struct ReLU {
    info: LayerInfo,
}

impl ReLU {
    pub fn new(info: LayerInfo) -> Self {
        Self { info }
    }
}

impl Layer for ReLU {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        map_elements(self, input, output, math::relu)
    }
}

// =============================================================================
// LeakyReLU
// =============================================================================

/// x for x >= 0, leak * x otherwise.
pub struct LeakyReLU {
    info: LayerInfo,
    leak: f32,
}

impl LeakyReLU {
    pub fn new(info: LayerInfo, leak: f32) -> Self {
        Self { info, leak }
    }
}

impl Layer for LeakyReLU {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        map_elements(self, input, output, |i, o| math::leaky_relu(i, o, self.leak))
    }
}

// =============================================================================
// ParametricReLU
// =============================================================================

/// LeakyReLU with a learned slope per position. No broadcasting: the slope
/// tensor must have the input's shape.
pub struct ParametricReLU<'w> {
    info: LayerInfo,
    slope: &'w Tensor,
}

impl<'w> ParametricReLU<'w> {
    pub fn new(info: LayerInfo, slope: &'w Tensor) -> Self {
        Self { info, slope }
    }
}

impl Layer for ParametricReLU<'_> {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        if input != self.slope.shape() {
            return Err(PicoError::ShapeMismatch {
                expected: self.slope.shape().to_string(),
                actual: input.to_string(),
            });
        }
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        map_elements(self, input, output, |i, o| {
            math::parametric_relu(i, self.slope.as_slice(), o)
        })
    }
}

// =============================================================================
// Sigmoid
// =============================================================================

/// 1 / (1 + e^-x)
pub struct Sigmoid {
    info: LayerInfo,
}

impl Sigmoid {
    pub fn new(info: LayerInfo) -> Self {
        Self { info }
    }
}

impl Layer for Sigmoid {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        map_elements(self, input, output, math::sigmoid)
    }
}

// =============================================================================
// TanH
// =============================================================================

pub struct TanH {
    info: LayerInfo,
}

impl TanH {
    pub fn new(info: LayerInfo) -> Self {
        Self { info }
    }
}

impl Layer for TanH {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        map_elements(self, input, output, math::tanh)
    }
}

// =============================================================================
// Softmax
// =============================================================================

/// Softmax over the flattened extent of the input.
///
/// Typically the last layer of a classifier.
pub struct Softmax {
    info: LayerInfo,
}

impl Softmax {
    pub fn new(info: LayerInfo) -> Self {
        Self { info }
    }
}

impl Layer for Softmax {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        map_elements(self, input, output, math::softmax)
    }
}

// =============================================================================
// Clip
// =============================================================================

pub struct Clip {
    info: LayerInfo,
    min: f32,
    max: f32,
}

impl Clip {
    pub fn new(info: LayerInfo, min: f32, max: f32) -> PicoResult<Self> {
        if min > max {
            return Err(PicoError::InvalidParameter("clip minimum exceeds maximum"));
        }
        Ok(Self { info, min, max })
    }
}

impl Layer for Clip {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        map_elements(self, input, output, |i, o| math::clip(i, o, self.min, self.max))
    }
}

// =============================================================================
// LRN
// =============================================================================

/// Local response normalization across a window of `n` channels.
///
/// Input is a single image: `CHW`, or `NCHW` with one batch.
pub struct Lrn {
    info: LayerInfo,
    alpha: f32,
    beta: f32,
    n: usize,
}

impl Lrn {
    pub fn new(info: LayerInfo, alpha: f32, beta: f32, n: usize) -> PicoResult<Self> {
        if n == 0 {
            return Err(PicoError::InvalidParameter("LRN window must be non-empty"));
        }
        Ok(Self { info, alpha, beta, n })
    }
}

impl Layer for Lrn {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        if input.rank() < 3 {
            return Err(PicoError::UnsupportedRank {
                op: "LRN",
                rank: input.rank(),
            });
        }
        if input.num_batches() != 1 {
            return Err(PicoError::UnsupportedBatch {
                op: "LRN",
                batches: input.num_batches(),
            });
        }
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        let [_, depth, h, w] = input.shape().spatial();
        math::local_response_norm(
            input.as_slice(),
            output.as_mut_slice(),
            depth,
            h * w,
            self.alpha,
            self.beta,
            self.n,
        );
        Ok(())
    }
}
