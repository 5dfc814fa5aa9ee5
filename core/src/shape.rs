//! Tensor shape metadata with an explicit layout tag.
//!
//! A rank alone does not say which axis is which: a rank-3 shape can be an
//! image `(channel, height, width)` or a 1-D signal `(batch, channel, width)`.
//! `TensorShape` carries a [`Layout`] so every consumer reads the same axes.
//!
//! Shapes published inside a [`Tensor`](crate::Tensor) are frozen; a frozen
//! shape rejects every further mutation.

use core::fmt;

use crate::error::{PicoError, PicoResult};

/// Positional meaning of a shape's dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `(width)`
    Flat,
    /// `(rows, cols)`
    Matrix,
    /// `(channel, height, width)`
    Chw,
    /// `(batch, channel, width)`
    Ncw,
    /// `(batch, channel, height, width)`
    Nchw,
}

impl Layout {
    pub const fn rank(self) -> usize {
        match self {
            Layout::Flat => 1,
            Layout::Matrix => 2,
            Layout::Chw | Layout::Ncw => 3,
            Layout::Nchw => 4,
        }
    }

    /// Layout assumed when only a rank is known.
    pub const fn default_for(rank: usize) -> Option<Layout> {
        match rank {
            1 => Some(Layout::Flat),
            2 => Some(Layout::Matrix),
            3 => Some(Layout::Chw),
            4 => Some(Layout::Nchw),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Layout::Flat => "W",
            Layout::Matrix => "RC",
            Layout::Chw => "CHW",
            Layout::Ncw => "NCW",
            Layout::Nchw => "NCHW",
        }
    }

    /// Axis index of the channel dimension, if the layout has one.
    pub const fn channel_axis(self) -> Option<usize> {
        match self {
            Layout::Chw => Some(0),
            Layout::Ncw | Layout::Nchw => Some(1),
            Layout::Flat | Layout::Matrix => None,
        }
    }
}

/// Rank (1..=4) and per-dimension extents of a tensor.
#[derive(Debug, Clone, Copy)]
pub struct TensorShape {
    dims: [usize; 4],
    ndim: usize,
    layout: Layout,
    frozen: bool,
}

impl TensorShape {
    pub const fn d1(w: usize) -> Self {
        Self::raw([w, 0, 0, 0], Layout::Flat)
    }

    pub const fn d2(rows: usize, cols: usize) -> Self {
        Self::raw([rows, cols, 0, 0], Layout::Matrix)
    }

    pub const fn d3(c: usize, h: usize, w: usize) -> Self {
        Self::raw([c, h, w, 0], Layout::Chw)
    }

    pub const fn ncw(n: usize, c: usize, w: usize) -> Self {
        Self::raw([n, c, w, 0], Layout::Ncw)
    }

    pub const fn d4(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self::raw([n, c, h, w], Layout::Nchw)
    }

    const fn raw(dims: [usize; 4], layout: Layout) -> Self {
        Self {
            dims,
            ndim: layout.rank(),
            layout,
            frozen: false,
        }
    }

    /// Build a shape from a dimension list, using the rank's default layout.
    pub fn new(dims: &[usize]) -> PicoResult<Self> {
        let layout = Layout::default_for(dims.len()).ok_or(PicoError::InvalidRank(dims.len()))?;
        let mut shape = Self::raw([0; 4], layout);
        shape.dims[..dims.len()].copy_from_slice(dims);
        shape.validate()?;
        Ok(shape)
    }

    /// Reinterpret the same extents under another layout of equal rank.
    pub fn with_layout(mut self, layout: Layout) -> PicoResult<Self> {
        if layout.rank() != self.ndim {
            return Err(PicoError::RankMismatch {
                expected: layout.rank(),
                actual: self.ndim,
            });
        }
        self.layout = layout;
        Ok(self)
    }

    /// Check rank and that every extent is positive.
    pub fn validate(&self) -> PicoResult<()> {
        if self.ndim == 0 || self.ndim > 4 {
            return Err(PicoError::InvalidRank(self.ndim));
        }
        match self.dims().iter().position(|&d| d == 0) {
            Some(index) => Err(PicoError::ZeroDimension { index }),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.ndim
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims[..self.ndim]
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn dim(&self, index: usize) -> PicoResult<usize> {
        self.dims().get(index).copied().ok_or(PicoError::IndexOutOfBounds {
            dim: index,
            index,
            extent: self.ndim,
        })
    }

    pub fn total(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Permanently block further mutation.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn ensure_mutable(&self) -> PicoResult<()> {
        if self.frozen {
            return Err(PicoError::ShapeFrozen(self.to_string()));
        }
        Ok(())
    }

    /// Grow the rank. New trailing extents are 1; shrinking is refused.
    pub fn set_rank(&mut self, rank: usize) -> PicoResult<()> {
        self.ensure_mutable()?;
        let layout = Layout::default_for(rank).ok_or(PicoError::InvalidRank(rank))?;
        if rank < self.ndim {
            return Err(PicoError::RankShrink {
                from: self.ndim,
                to: rank,
            });
        }
        if rank == self.ndim {
            return Ok(());
        }
        for d in &mut self.dims[self.ndim..rank] {
            *d = 1;
        }
        self.ndim = rank;
        self.layout = layout;
        Ok(())
    }

    pub fn set_dim(&mut self, index: usize, value: usize) -> PicoResult<()> {
        self.ensure_mutable()?;
        if index >= self.ndim {
            return Err(PicoError::IndexOutOfBounds {
                dim: index,
                index,
                extent: self.ndim,
            });
        }
        if value == 0 {
            return Err(PicoError::ZeroDimension { index });
        }
        self.dims[index] = value;
        Ok(())
    }

    /// `(batch, channel, height, width)` view read through the layout.
    ///
    /// Missing axes read as 1; a flat shape is a single row, a matrix is a
    /// single-channel `rows x cols` plane.
    pub fn spatial(&self) -> [usize; 4] {
        let d = self.dims;
        match self.layout {
            Layout::Flat => [1, 1, 1, d[0]],
            Layout::Matrix => [1, 1, d[0], d[1]],
            Layout::Chw => [1, d[0], d[1], d[2]],
            Layout::Ncw => [d[0], d[1], 1, d[2]],
            Layout::Nchw => [d[0], d[1], d[2], d[3]],
        }
    }

    pub fn num_batches(&self) -> usize {
        self.spatial()[0]
    }

    pub fn num_channels(&self) -> usize {
        self.spatial()[1]
    }

    pub fn height(&self) -> usize {
        self.spatial()[2]
    }

    pub fn width(&self) -> usize {
        self.spatial()[3]
    }

    /// Build a shape of this layout from a `(batch, channel, height, width)` view.
    pub fn from_spatial(layout: Layout, [n, c, h, w]: [usize; 4]) -> PicoResult<Self> {
        let shape = match layout {
            Layout::Chw if n == 1 => Self::d3(c, h, w),
            Layout::Ncw if h == 1 => Self::ncw(n, c, w),
            Layout::Nchw => Self::d4(n, c, h, w),
            other => {
                return Err(PicoError::LayoutMismatch {
                    op: "spatial reshape",
                    expected: Layout::Nchw.name(),
                    actual: other.name(),
                })
            }
        };
        shape.validate()?;
        Ok(shape)
    }

    /// Shape grown by `(top, left, bottom, right)` padding on the spatial axes.
    ///
    /// Signals (`NCW`) have no vertical axis, so `top` and `bottom` must be 0.
    pub fn padded(&self, [top, left, bottom, right]: [usize; 4]) -> PicoResult<Self> {
        let [n, c, h, w] = self.spatial();
        match self.layout {
            Layout::Chw | Layout::Nchw => {
                Self::from_spatial(self.layout, [n, c, h + top + bottom, w + left + right])
            }
            Layout::Ncw if top == 0 && bottom == 0 => {
                Self::from_spatial(self.layout, [n, c, h, w + left + right])
            }
            Layout::Ncw => Err(PicoError::UnsupportedRank {
                op: "vertical padding of a signal",
                rank: 3,
            }),
            Layout::Flat | Layout::Matrix => Err(PicoError::UnsupportedRank {
                op: "padding",
                rank: self.ndim,
            }),
        }
    }
}

/// Equal extents under the same layout. The frozen flag is ignored.
impl PartialEq for TensorShape {
    fn eq(&self, other: &Self) -> bool {
        self.layout == other.layout && self.dims() == other.dims()
    }
}

impl Eq for TensorShape {}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}
