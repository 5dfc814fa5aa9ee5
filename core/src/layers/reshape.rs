//! Data-preserving shape changes: Reshape, Flatten, Squeeze.
//!
//! The buffer is copied unchanged; only the declared shape differs.

use crate::error::{PicoError, PicoResult};
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use super::{check_output, Layer, LayerInfo};

/// Rule deriving the output shape from the input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeOp {
    /// Fixed target shape with the same element count.
    Reshape(TensorShape),
    /// `[batches, everything else]`
    Flatten,
    /// Drop every extent of 1, keeping at least one axis.
    Squeeze,
}

pub struct Reshape {
    info: LayerInfo,
    op: ShapeOp,
}

impl Reshape {
    pub fn new(info: LayerInfo, op: ShapeOp) -> Self {
        Self { info, op }
    }
}

impl Layer for Reshape {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        match self.op {
            ShapeOp::Reshape(target) => {
                if target.total() != input.total() {
                    return Err(PicoError::DimensionMismatch {
                        expected: input.total(),
                        actual: target.total(),
                    });
                }
                Ok(target)
            }
            ShapeOp::Flatten => {
                let batches = input.num_batches();
                Ok(TensorShape::d2(batches, input.total() / batches))
            }
            ShapeOp::Squeeze => {
                let kept: Vec<usize> = input.dims().iter().copied().filter(|&d| d != 1).collect();
                if kept.is_empty() {
                    Ok(TensorShape::d1(1))
                } else {
                    TensorShape::new(&kept)
                }
            }
        }
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        input.copy_into(output)
    }
}
