//! Batch normalization with frozen statistics.
//!
//! `out = gamma * (x - mean) / sqrt(variance + epsilon) + beta`, per channel.

use crate::error::{PicoError, PicoResult};
use crate::math;
use crate::shape::TensorShape;
use crate::tensor::Tensor;
use super::{check_output, Layer, LayerInfo};

/// Epsilon used when the model does not specify one.
pub const DEFAULT_EPSILON: f32 = 1e-5;

pub struct BatchNormalization<'w> {
    info: LayerInfo,
    gamma: &'w Tensor,
    beta: &'w Tensor,
    mean: &'w Tensor,
    variance: &'w Tensor,
    epsilon: f32,
}

impl<'w> BatchNormalization<'w> {
    pub fn new(
        info: LayerInfo,
        gamma: &'w Tensor,
        beta: &'w Tensor,
        mean: &'w Tensor,
        variance: &'w Tensor,
        epsilon: f32,
    ) -> PicoResult<Self> {
        let channels = gamma.len();
        for (what, t) in [("beta", beta), ("mean", mean), ("variance", variance)] {
            if t.len() != channels {
                return Err(PicoError::ParameterLength {
                    what,
                    expected: channels,
                    actual: t.len(),
                });
            }
        }
        if epsilon < 0.0 {
            return Err(PicoError::InvalidParameter("batch normalization epsilon is negative"));
        }
        Ok(Self {
            info,
            gamma,
            beta,
            mean,
            variance,
            epsilon,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.gamma.len()
    }
}

impl Layer for BatchNormalization<'_> {
    fn info(&self) -> &LayerInfo {
        &self.info
    }

    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape> {
        if input.rank() < 3 {
            return Err(PicoError::UnsupportedRank {
                op: "batch normalization",
                rank: input.rank(),
            });
        }
        let [n, c, _, _] = input.spatial();
        if n != 1 {
            return Err(PicoError::UnsupportedBatch {
                op: "batch normalization",
                batches: n,
            });
        }
        if c != self.num_channels() {
            return Err(PicoError::ParameterLength {
                what: "batch normalization channels",
                expected: self.num_channels(),
                actual: c,
            });
        }
        Ok(*input)
    }

    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()> {
        check_output(self, input, output)?;
        let [_, _, h, w] = input.shape().spatial();
        let src = input.as_slice();
        let (gamma, beta) = (self.gamma.as_slice(), self.beta.as_slice());
        let (mean, variance) = (self.mean.as_slice(), self.variance.as_slice());
        let epsilon = self.epsilon;

        math::for_each_plane(output.as_mut_slice(), h * w, |c, plane| {
            let scale = gamma[c] / (variance[c] + epsilon).sqrt();
            let x = &src[c * h * w..(c + 1) * h * w];
            for (o, &v) in plane.iter_mut().zip(x) {
                *o = scale * (v - mean[c]) + beta[c];
            }
        });
        Ok(())
    }
}
