//! # pico-rust-core: float32 CNN inference
//!
//! A small inference engine for convolutional networks with externally
//! supplied weights, aimed at constrained targets.
//!
//! ## Architecture
//!
//! - **Tensors**: dense row-major `f32` buffers of rank 1..=4 ([`Tensor`], [`TensorShape`])
//! - **Layer Zoo**: Convolution, FullyConnected, pooling, BatchNormalization, activations
//! - **Weight Slots**: kernels and biases decoded from a binary container into caller-owned arrays
//! - **Network**: ordered layers with shapes validated at construction time
//!
//! ## Usage
//!
//! ```ignore
//! use pico_rust_core::*;
//!
//! let store = WeightStore::decode(File::open("model.bin")?)?;
//! let (mut kernels, mut biases) = store.plan().allocate()?;
//! store.commit(&mut kernels, &mut biases)?;
//!
//! let conv = Convolution::new(
//!     LayerInfo::new("conv1", 0, OpKind::Conv),
//!     &kernels[0],
//!     Some(&biases[0]),
//!     ConvConfig::new().with_padding([1, 1, 1, 1]),
//! )?;
//! let relu = ReLU::new(LayerInfo::new("relu1", 1, OpKind::Relu));
//!
//! let net = Network::new(vec![Box::new(conv), Box::new(relu)], TensorShape::d3(3, 32, 32))?;
//! let mut acts = net.activations()?;
//! let output = net.forward_with(&input, &mut acts)?;
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): per-channel work in convolution, pooling and
//!   normalization runs on the rayon thread pool.

pub mod error;
pub mod layers;
pub mod math;
pub mod model;
pub mod shape;
pub mod tensor;
pub mod weights;

pub use error::{PicoError, PicoResult};
pub use layers::{Layer, LayerInfo, OpKind};
pub use layers::{
    Add, AveragePooling, BatchNormalization, Clip, Concat, ConvConfig, ConvStrategy, Convolution,
    FullyConnected, GlobalAveragePooling, GlobalMaxPooling, LeakyReLU, Lrn, MaxPooling, Pad,
    ParametricReLU, PoolConfig, ReLU, Reshape, ShapeOp, Sigmoid, Softmax, TanH, Transpose,
};
pub use model::{Activations, Network};
pub use shape::{Layout, TensorShape};
pub use tensor::Tensor;
pub use weights::{LayerRecord, SlotPlan, WeightFileWriter, WeightStore};
