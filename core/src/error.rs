//! Error types for the pico-rust-core library.
//!
//! Every fallible operation returns `PicoResult<T>`. Shape-contract and
//! degenerate-configuration failures are programming errors in the caller's
//! network description; they are reported as distinct variants so the caller
//! can stop before any partial prediction is emitted.

use std::io;

use thiserror::Error;

/// All possible error conditions in the pico-rust-core library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PicoError {
    // ---- shape contract ----------------------------------------------------
    #[error("rank must be in 1..=4, got {0}")]
    InvalidRank(usize),

    #[error("expected rank {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },

    #[error("dimension {index} must be positive")]
    ZeroDimension { index: usize },

    #[error("shape {0} is frozen")]
    ShapeFrozen(String),

    #[error("reducing rank from {from} to {to} would drop extents")]
    RankShrink { from: usize, to: usize },

    #[error("element count mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index {index} out of bounds for dimension {dim} of extent {extent}")]
    IndexOutOfBounds { dim: usize, index: usize, extent: usize },

    #[error("expected shape {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("{op} is not implemented for rank {rank}")]
    UnsupportedRank { op: &'static str, rank: usize },

    #[error("{op} expects layout {expected}, got {actual}")]
    LayoutMismatch {
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("concatenation along axis {0} is not implemented")]
    UnsupportedAxis(usize),

    #[error("{op} supports batch size 1 only, got {batches}")]
    UnsupportedBatch { op: &'static str, batches: usize },

    #[error("kernel {kernel_h}x{kernel_w} is larger than input {input_h}x{input_w}")]
    KernelLargerThanInput {
        kernel_h: usize,
        kernel_w: usize,
        input_h: usize,
        input_w: usize,
    },

    // ---- degenerate configuration -------------------------------------------
    #[error("kernel has no elements")]
    EmptyKernel,

    #[error("stride must be non-zero")]
    ZeroStride,

    #[error("{channels} channels cannot be split into {groups} groups")]
    InvalidGroups { channels: usize, groups: usize },

    #[error("pooling window at ({row}, {col}) has no overlap with the input")]
    ZeroDivisor { row: usize, col: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("{what}: expected {expected} values, got {actual}")]
    ParameterLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    // ---- weight container format --------------------------------------------
    #[error("bad magic number {0:?}")]
    BadMagic([u8; 3]),

    #[error("truncated stream while reading {context}")]
    Truncated { context: &'static str },

    #[error("i/o failure on {context}: {kind:?}")]
    Io {
        context: &'static str,
        kind: io::ErrorKind,
    },

    #[error("{context} is not valid UTF-8 or exceeds {max} bytes")]
    InvalidName { context: &'static str, max: usize },

    #[error("unknown layer type {tag:?} at layer {layer}")]
    UnknownLayerType { tag: String, layer: usize },

    #[error("bad end marker {0:?}")]
    BadEndMarker([u8; 4]),

    #[error("stream fills {expected} {kind} slots, caller provided {actual}")]
    SlotCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} slot {index} holds {expected} elements, stream supplies {actual}")]
    SlotSizeMismatch {
        kind: &'static str,
        index: usize,
        expected: usize,
        actual: usize,
    },
}

impl PicoError {
    /// Map an I/O failure, treating an early EOF as truncation.
    pub(crate) fn from_io(err: io::Error, context: &'static str) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => PicoError::Truncated { context },
            kind => PicoError::Io { context, kind },
        }
    }
}

pub type PicoResult<T> = Result<T, PicoError>;
