//! Binary weight container decoding.
//!
//! The container is a tagged, variable-length stream:
//!
//! ```text
//! "FD\n" | network name "\n" | u32 layer_count
//! layer_count x ( layer name "\n" | type tag "\n" | payload )
//! "end\n"
//! ```
//!
//! Integers and floats are in host byte order. Each layer contributes at
//! most one kernel slot and at most one bias slot, except
//! `BatchNormalization`, which fills up to four bias slots (gamma, beta,
//! mean, variance). A `Gemm`, `MatMul` or `Transpose` entry always claims a
//! kernel slot, even when it declares no values; that slot is left as is.
//!
//! Loading is two-phase: the whole stream is decoded into owned records
//! first, then slot counts and sizes are checked against the caller's
//! arrays, and only then are values copied in. A failed load leaves every
//! slot untouched.

mod decode;
mod writer;

use log::info;

use crate::error::{PicoError, PicoResult};
use crate::layers::OpKind;
use crate::shape::TensorShape;
use crate::tensor::Tensor;

pub use writer::WeightFileWriter;

pub const MAGIC: [u8; 3] = *b"FD\n";
pub const END_MARKER: [u8; 4] = *b"end\n";

/// Longest accepted network, layer, or type name in bytes.
pub const MAX_NAME_LEN: usize = 1024;

/// Next kernel slot and next bias slot to be filled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotCursor {
    pub kernel: usize,
    pub bias: usize,
}

impl SlotCursor {
    fn take_kernel(&mut self) -> usize {
        self.kernel += 1;
        self.kernel - 1
    }

    fn take_bias(&mut self) -> usize {
        self.bias += 1;
        self.bias - 1
    }
}

/// Values destined for one slot, with the shape the stream declares for them.
///
/// `shape` is `None` for a slot the stream claims without filling it.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotWrite {
    pub index: usize,
    pub shape: Option<TensorShape>,
    pub values: Vec<f32>,
}

impl SlotWrite {
    pub fn is_empty(&self) -> bool {
        self.shape.is_none()
    }
}

/// One decoded layer entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub name: String,
    pub kind: OpKind,
    pub kernel: Option<SlotWrite>,
    pub biases: Vec<SlotWrite>,
}

/// Shapes of every slot a stream claims, in slot order; `None` marks a
/// claimed slot that receives no values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPlan {
    pub kernels: Vec<Option<TensorShape>>,
    pub biases: Vec<Option<TensorShape>>,
}

impl SlotPlan {
    /// Zeroed slot arrays sized for this plan. An unfilled slot gets a
    /// single-element placeholder so later indices stay aligned.
    pub fn allocate(&self) -> PicoResult<(Vec<Tensor>, Vec<Tensor>)> {
        Ok((allocate_slots(&self.kernels)?, allocate_slots(&self.biases)?))
    }
}

fn allocate_slots(shapes: &[Option<TensorShape>]) -> PicoResult<Vec<Tensor>> {
    shapes
        .iter()
        .map(|s| Tensor::zeros(s.unwrap_or(TensorShape::d1(1))))
        .collect()
}

/// A fully decoded weight container.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightStore {
    network_name: String,
    records: Vec<LayerRecord>,
    slots: SlotCursor,
}

impl WeightStore {
    /// Decode a whole container without touching any slot array.
    ///
    /// Bytes are consumed one field at a time and nothing after `"end\n"` is
    /// read, so a `&mut File` stays positioned just past the container. Wrap
    /// unbuffered sources in a `BufReader` for speed.
    pub fn decode<R: std::io::Read>(reader: R) -> PicoResult<Self> {
        decode::decode_stream(reader)
    }

    /// Decode a container and copy its values into the caller's slots.
    ///
    /// `kernels` and `biases` must hold exactly as many tensors as the stream
    /// fills, each with the element count the stream supplies. On error the
    /// slot arrays are left unmodified.
    pub fn load<R: std::io::Read>(
        reader: R,
        kernels: &mut [Tensor],
        biases: &mut [Tensor],
    ) -> PicoResult<Self> {
        let store = Self::decode(reader)?;
        store.commit(kernels, biases)?;
        info!(
            "loaded weights for {:?}: {} layers, {} kernel slots, {} bias slots",
            store.network_name,
            store.records.len(),
            store.slots.kernel,
            store.slots.bias
        );
        Ok(store)
    }

    /// Check every slot, then copy every value. Nothing is written unless
    /// all checks pass.
    pub fn commit(&self, kernels: &mut [Tensor], biases: &mut [Tensor]) -> PicoResult<()> {
        let kernel_writes: Vec<&SlotWrite> = self.records.iter().filter_map(|r| r.kernel.as_ref()).collect();
        let bias_writes: Vec<&SlotWrite> = self.records.iter().flat_map(|r| r.biases.iter()).collect();

        check_slots("kernel", &kernel_writes, kernels)?;
        check_slots("bias", &bias_writes, biases)?;

        for w in kernel_writes {
            if !w.is_empty() {
                kernels[w.index].as_mut_slice().copy_from_slice(&w.values);
            }
        }
        for w in bias_writes {
            biases[w.index].as_mut_slice().copy_from_slice(&w.values);
        }
        Ok(())
    }

    pub fn plan(&self) -> SlotPlan {
        SlotPlan {
            kernels: self.records.iter().filter_map(|r| r.kernel.as_ref()).map(|w| w.shape).collect(),
            biases: self.records.iter().flat_map(|r| r.biases.iter()).map(|w| w.shape).collect(),
        }
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    pub fn num_kernel_slots(&self) -> usize {
        self.slots.kernel
    }

    pub fn num_bias_slots(&self) -> usize {
        self.slots.bias
    }
}

fn check_slots(kind: &'static str, writes: &[&SlotWrite], slots: &[Tensor]) -> PicoResult<()> {
    if writes.len() != slots.len() {
        return Err(PicoError::SlotCount {
            kind,
            expected: writes.len(),
            actual: slots.len(),
        });
    }
    for w in writes.iter().filter(|w| !w.is_empty()) {
        let slot = &slots[w.index];
        if slot.len() != w.values.len() {
            return Err(PicoError::SlotSizeMismatch {
                kind,
                index: w.index,
                expected: slot.len(),
                actual: w.values.len(),
            });
        }
    }
    Ok(())
}
