//! Fully connected layer (Gemm / MatMul).
//!
//! Computes `out[1 x n] = in[1 x k] * W[k x n] + b[n]`. The kernel is stored
//! input-major, exactly as the weight file's Gemm payload lays it out.

use crate::error::{PicoError, PicoResult};
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use super::{check_output, Layer, LayerInfo};

pub struct FullyConnected<'w> {
    info: LayerInfo,
    kernel: &'w Tensor,
    bias: Option<&'w Tensor>,
    in_features: usize,
    out_features: usize,
}

impl<'w> FullyConnected<'w> {
    /// `kernel` must be rank 2 `[in_features, out_features]`; `bias`, if
    /// present, holds `out_features` values in any shape.
    pub fn new(info: LayerInfo, kernel: &'w Tensor, bias: Option<&'w Tensor>) -> PicoResult<Self> {
        let (in_features, out_features) = match *kernel.shape().dims() {
            [k, n] => (k, n),
            _ => {
                return Err(PicoError::RankMismatch {
                    expected: 2,
                    actual: kernel.rank(),
                })
            }
        };
        if let Some(bias) = bias {
            if bias.len() != out_features {
                return Err(PicoError::ParameterLength {
                    what: "fully connected bias",
                    expected: out_features,
                    actual: bias.len(),
                });
            }
        }
        Ok(Self {
            info,
            kernel,
            bias,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Layer for FullyConnected<'_> {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        if *input != TensorShape::d2(1, self.in_features) {
            return Err(PicoError::ShapeMismatch {
                expected: TensorShape::d2(1, self.in_features).to_string(),
                actual: input.to_string(),
            });
        }
        Ok(TensorShape::d2(1, self.out_features))
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        let x = input.as_slice();
        let w = self.kernel.as_slice();
        let n = self.out_features;

        let out = output.as_mut_slice();
        match self.bias {
            Some(bias) => out.copy_from_slice(bias.as_slice()),
            None => out.fill(0.0),
        }
        // Row-wise accumulation keeps the kernel access sequential.
        for (xi, row) in x.iter().zip(w.chunks_exact(n)) {
            for (o, wij) in out.iter_mut().zip(row) {
                *o += xi * wij;
            }
        }
        Ok(())
    }
}
