//! Network: chain layers into a pipeline.
//!
//! ```text
//! Input → Layer[0] → Layer[1] → ... → Layer[N-1] → Output
//! ```
//!
//! Each layer declares its output shape, so the whole chain is validated at
//! construction time, before any data flows through. Intermediate results
//! live in an [`Activations`] set holding one preallocated buffer per layer;
//! a forward pass allocates nothing.

use log::{debug, trace};

use crate::error::{PicoError, PicoResult};
use crate::layers::Layer;
use crate::shape::TensorShape;
use crate::tensor::Tensor;

/// An ordered sequence of layers; layer `i`'s output feeds layer `i + 1`.
///
/// # Lifetime `'w`
/// Layers borrow their kernels and biases from the caller's slot arrays, so
/// the network cannot outlive them.
pub struct Network<'w> {
    layers: Vec<Box<dyn Layer + 'w>>,
    input_shape: TensorShape,
    /// Output shape of every layer, in order.
    shapes: Vec<TensorShape>,
}

/// Output buffers for every layer of one [`Network`].
///
/// Reusable across forward passes; buffer `i` holds layer `i`'s output.
#[derive(Debug, Clone)]
pub struct Activations {
    buffers: Vec<Tensor>,
}

impl Activations {
    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.buffers.get(index)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl<'w> Network<'w> {
    /// Build a network, failing fast if any layer rejects its input shape.
    pub fn new(layers: Vec<Box<dyn Layer + 'w>>, input_shape: TensorShape) -> PicoResult<Self> {
        input_shape.validate()?;
        let mut shapes = Vec::with_capacity(layers.len());
        let mut shape = input_shape;
        for layer in &layers {
            shape = layer.output_shape(&shape)?;
            debug!("layer {} {:?} ({}): output {}", layer.id(), layer.name(), layer.kind(), shape);
            shapes.push(shape);
        }
        Ok(Self {
            layers,
            input_shape,
            shapes,
        })
    }

    /// Fresh zeroed buffers sized for this network.
    pub fn activations(&self) -> PicoResult<Activations> {
        let buffers = self.shapes.iter().map(|s| Tensor::zeros(*s)).collect::<PicoResult<_>>()?;
        Ok(Activations { buffers })
    }

    /// Run every layer in order, writing into `activations`.
    ///
    /// Returns the last layer's output, or `input` itself for an empty
    /// network.
    pub fn forward_with<'a>(
        &self,
        input: &'a Tensor,
        activations: &'a mut Activations,
    ) -> PicoResult<&'a Tensor> {
        if *input.shape() != self.input_shape {
            return Err(PicoError::ShapeMismatch {
                expected: self.input_shape.to_string(),
                actual: input.shape().to_string(),
            });
        }
        if activations.buffers.len() != self.layers.len() {
            return Err(PicoError::DimensionMismatch {
                expected: self.layers.len(),
                actual: activations.buffers.len(),
            });
        }

        for (i, layer) in self.layers.iter().enumerate() {
            trace!("running layer {} {:?}", layer.id(), layer.name());
            let (done, rest) = activations.buffers.split_at_mut(i);
            let source = match done.last() {
                Some(prev) => prev,
                None => input,
            };
            layer.run(source, &mut rest[0])?;
        }

        Ok(activations.buffers.last().unwrap_or(input))
    }

    /// Forward pass with freshly allocated buffers; returns an owned output.
    pub fn forward(&self, input: &Tensor) -> PicoResult<Tensor> {
        let mut activations = self.activations()?;
        self.forward_with(input, &mut activations).map(Tensor::clone)
    }

    /// Index of the largest output element.
    pub fn predict(&self, input: &Tensor) -> PicoResult<usize> {
        let output = self.forward(input)?;
        output
            .argmax()
            .ok_or(PicoError::InvalidParameter("network output is empty"))
    }

    pub fn output_shape(&self) -> TensorShape {
        self.shapes.last().copied().unwrap_or(self.input_shape)
    }

    pub fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, idx: usize) -> Option<&dyn Layer> {
        self.layers.get(idx).map(|l| l.as_ref() as &dyn Layer)
    }
}
