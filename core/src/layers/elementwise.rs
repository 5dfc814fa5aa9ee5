//! Structural layers: Add (constant operand), Transpose, Pad, Concat.

use crate::error::{PicoError, PicoResult};
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use super::{check_output, Layer, LayerInfo};

// =============================================================================
// Add
// =============================================================================

/// Elementwise addition of a constant tensor with the input's element count.
pub struct Add<'w> {
    info: LayerInfo,
    operand: &'w Tensor,
}

impl<'w> Add<'w> {
    pub fn new(info: LayerInfo, operand: &'w Tensor) -> Self {
        Self { info, operand }
    }
}

impl Layer for Add<'_> {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        if input.total() != self.operand.len() {
            return Err(PicoError::ParameterLength {
                what: "add operand",
                expected: input.total(),
                actual: self.operand.len(),
            });
        }
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        let pairs = input.as_slice().iter().zip(self.operand.as_slice());
        for (o, (x, b)) in output.as_mut_slice().iter_mut().zip(pairs) {
            *o = x + b;
        }
        Ok(())
    }
}

// =============================================================================
// Transpose
// =============================================================================

/// Swap the two axes of a matrix.
pub struct Transpose {
    info: LayerInfo,
}

impl Transpose {
    pub fn new(info: LayerInfo) -> Self {
        Self { info }
    }
}

impl Layer for Transpose {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        match *input.dims() {
            [rows, cols] => Ok(TensorShape::d2(cols, rows)),
            _ => Err(PicoError::UnsupportedRank {
                op: "transpose",
                rank: input.rank(),
            }),
        }
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        let cols = input.shape().dims()[1];
        let rows = input.shape().dims()[0];
        let dst = output.as_mut_slice();
        for (r, row) in input.as_slice().chunks_exact(cols).enumerate() {
            for (c, &v) in row.iter().enumerate() {
                dst[c * rows + r] = v;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Pad
// =============================================================================

/// Constant padding of the spatial axes by `(top, left, bottom, right)`.
pub struct Pad {
    info: LayerInfo,
    padding: [usize; 4],
    fill: f32,
}

impl Pad {
    pub fn new(info: LayerInfo, padding: [usize; 4], fill: f32) -> Self {
        Self { info, padding, fill }
    }
}

impl Layer for Pad {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        input.padded(self.padding)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        input
            .expand_with_padding(self.padding, self.fill)?
            .copy_into(output)
    }
}

// =============================================================================
// Concat
// =============================================================================

/// Channel-axis concatenation of several inputs.
///
/// As a single-input `Layer` it is an identity; multi-input graphs call
/// [`Concat::run_many`] with every source.
pub struct Concat {
    info: LayerInfo,
    axis: usize,
}

impl Concat {
    pub fn new(info: LayerInfo, axis: usize) -> Self {
        Self { info, axis }
    }

    /// Shape produced by stacking `inputs` along the channel axis.
    pub fn output_shape_many(&self, inputs: &[&TensorShape]) -> PicoResult<TensorShape> {
        let first = inputs.first().ok_or(PicoError::InvalidParameter("concat needs at least one input"))?;
        if first.layout().channel_axis() != Some(self.axis) {
            return Err(PicoError::UnsupportedAxis(self.axis));
        }
        let [n, _, h, w] = first.spatial();
        let channels = inputs.iter().map(|s| s.num_channels()).sum();
        TensorShape::from_spatial(first.layout(), [n, channels, h, w])
    }

    pub fn run_many(&self, inputs: &[&Tensor], output: &mut Tensor) -> PicoResult<()> {
        output.concatenate_from(inputs, self.axis)
    }
}

impl Layer for Concat {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        self.output_shape_many(&[input])
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        self.run_many(&[input], output)
    }
}
