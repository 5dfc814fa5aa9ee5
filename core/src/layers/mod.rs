//! Layer zoo for float32 inference.
//!
//! Every layer reads one input tensor and writes a caller-supplied output
//! tensor whose shape it declares up front through `output_shape`. Kernel,
//! bias and normalization tensors are borrowed, never owned: they live in the
//! caller's slot arrays for as long as the layer does.

pub mod activations;
pub mod conv;
pub mod dense;
pub mod elementwise;
pub mod norm;
pub mod pooling;
pub mod reshape;

use core::fmt;
use core::str::FromStr;

use crate::error::{PicoError, PicoResult};
use crate::shape::TensorShape;
use crate::tensor::Tensor;

/// Closed set of operation kinds, named by their weight-file tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Conv,
    Gemm,
    MatMul,
    MaxPool,
    AveragePool,
    GlobalMaxPool,
    GlobalAveragePool,
    Relu,
    LeakyRelu,
    PRelu,
    Sigmoid,
    TanH,
    Softmax,
    Clip,
    Lrn,
    BatchNormalization,
    Add,
    Transpose,
    Concat,
    Pad,
    Reshape,
    Flatten,
    Squeeze,
}

impl OpKind {
    pub const ALL: [OpKind; 23] = [
        OpKind::Conv,
        OpKind::Gemm,
        OpKind::MatMul,
        OpKind::MaxPool,
        OpKind::AveragePool,
        OpKind::GlobalMaxPool,
        OpKind::GlobalAveragePool,
        OpKind::Relu,
        OpKind::LeakyRelu,
        OpKind::PRelu,
        OpKind::Sigmoid,
        OpKind::TanH,
        OpKind::Softmax,
        OpKind::Clip,
        OpKind::Lrn,
        OpKind::BatchNormalization,
        OpKind::Add,
        OpKind::Transpose,
        OpKind::Concat,
        OpKind::Pad,
        OpKind::Reshape,
        OpKind::Flatten,
        OpKind::Squeeze,
    ];

    pub const fn tag(self) -> &'static str {
        match self {
            OpKind::Conv => "Conv",
            OpKind::Gemm => "Gemm",
            OpKind::MatMul => "MatMul",
            OpKind::MaxPool => "MaxPool",
            OpKind::AveragePool => "AveragePool",
            OpKind::GlobalMaxPool => "GlobalMaxPool",
            OpKind::GlobalAveragePool => "GlobalAveragePool",
            OpKind::Relu => "Relu",
            OpKind::LeakyRelu => "LeakyRelu",
            OpKind::PRelu => "PRelu",
            OpKind::Sigmoid => "Sigmoid",
            OpKind::TanH => "Tanh",
            OpKind::Softmax => "Softmax",
            OpKind::Clip => "Clip",
            OpKind::Lrn => "LRN",
            OpKind::BatchNormalization => "BatchNormalization",
            OpKind::Add => "Add",
            OpKind::Transpose => "Transpose",
            OpKind::Concat => "Concat",
            OpKind::Pad => "Pad",
            OpKind::Reshape => "Reshape",
            OpKind::Flatten => "Flatten",
            OpKind::Squeeze => "Squeeze",
        }
    }
}

impl FromStr for OpKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::ALL.iter().copied().find(|k| k.tag() == s).ok_or(())
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Identity shared by every layer: name, position id, and operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    pub id: u32,
    pub kind: OpKind,
}

impl LayerInfo {
    pub fn new(name: impl Into<String>, id: u32, kind: OpKind) -> Self {
        Self {
            name: name.into(),
            id,
            kind,
        }
    }
}

pub trait Layer: Send + Sync {
    fn info(&self) -> &LayerInfo;

    fn name(&self) -> &str {
        &self.info().name
    }

    fn id(&self) -> u32 {
        self.info().id
    }

    fn kind(&self) -> OpKind {
        self.info().kind
    }

    /// Shape `run` will write for an input of `input` shape.
    fn output_shape(&self, input: &TensorShape) -> PicoResult<TensorShape>;

    /// Compute the layer over `input`, overwriting every element of `output`.
    fn run(&self, input: &Tensor, output: &mut Tensor) -> PicoResult<()>;
}

/// Check that `output` has exactly the shape the layer will produce.
pub(crate) fn check_output(
    layer: &(impl Layer + ?Sized),
    input: &Tensor,
    output: &Tensor,
) -> PicoResult<TensorShape> {
    let expected = layer.output_shape(input.shape())?;
    if expected != *output.shape() {
        return Err(PicoError::ShapeMismatch {
            expected: expected.to_string(),
            actual: output.shape().to_string(),
        });
    }
    Ok(expected)
}

pub use activations::{Clip, LeakyReLU, Lrn, ParametricReLU, ReLU, Sigmoid, Softmax, TanH};
pub use conv::{ConvConfig, ConvStrategy, Convolution};
pub use dense::FullyConnected;
pub use elementwise::{Add, Concat, Pad, Transpose};
pub use norm::BatchNormalization;
pub use pooling::{AveragePooling, GlobalAveragePooling, GlobalMaxPooling, MaxPooling, PoolConfig};
pub use reshape::{Reshape, ShapeOp};
