//! Dense row-major f32 tensor.
//!
//! A `Tensor` exclusively owns its buffer; derived tensors (padded, cropped)
//! are new allocations, never views. The buffer length always equals the
//! shape's element count.

use crate::error::{PicoError, PicoResult};
use crate::shape::TensorShape;

/// A contiguous f32 array of rank 1..=4.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: TensorShape,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a zero-initialized tensor.
    pub fn zeros(shape: TensorShape) -> PicoResult<Self> {
        Self::full(shape, 0.0)
    }

    /// Create a tensor with every element set to `value`.
    pub fn full(mut shape: TensorShape, value: f32) -> PicoResult<Self> {
        shape.validate()?;
        shape.freeze();
        Ok(Self {
            data: vec![value; shape.total()],
            shape,
        })
    }

    /// Create a tensor from an owned buffer; its length must match the shape.
    pub fn from_vec(mut shape: TensorShape, data: Vec<f32>) -> PicoResult<Self> {
        shape.validate()?;
        if data.len() != shape.total() {
            return Err(PicoError::DimensionMismatch {
                expected: shape.total(),
                actual: data.len(),
            });
        }
        shape.freeze();
        Ok(Self { shape, data })
    }

    #[inline]
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Replace the shape with one of equal element count.
    pub fn reshape(&mut self, mut shape: TensorShape) -> PicoResult<()> {
        shape.validate()?;
        if shape.total() != self.data.len() {
            return Err(PicoError::DimensionMismatch {
                expected: self.data.len(),
                actual: shape.total(),
            });
        }
        shape.freeze();
        self.shape = shape;
        Ok(())
    }

    /// Flat buffer offset of a full index. The index length must equal the rank.
    ///
    /// Rank 4 resolves to `((n * C + c) * H + h) * W + w`; lower ranks follow
    /// the same row-major rule.
    pub fn offset(&self, index: &[usize]) -> PicoResult<usize> {
        let dims = self.shape.dims();
        if index.len() != dims.len() {
            return Err(PicoError::RankMismatch {
                expected: dims.len(),
                actual: index.len(),
            });
        }
        let mut offset = 0;
        for (dim, (&i, &extent)) in index.iter().zip(dims).enumerate() {
            if i >= extent {
                return Err(PicoError::IndexOutOfBounds { dim, index: i, extent });
            }
            offset = offset * extent + i;
        }
        Ok(offset)
    }

    pub fn get(&self, index: &[usize]) -> PicoResult<f32> {
        let offset = self.offset(index)?;
        Ok(self.data[offset])
    }

    pub fn get_mut(&mut self, index: &[usize]) -> PicoResult<&mut f32> {
        let offset = self.offset(index)?;
        Ok(&mut self.data[offset])
    }

    pub fn set(&mut self, index: &[usize], value: f32) -> PicoResult<()> {
        *self.get_mut(index)? = value;
        Ok(())
    }

    fn plane_range(&self, batch: usize, channel: usize) -> PicoResult<core::ops::Range<usize>> {
        let [n, c, h, w] = self.shape.spatial();
        if batch >= n {
            return Err(PicoError::IndexOutOfBounds { dim: 0, index: batch, extent: n });
        }
        if channel >= c {
            return Err(PicoError::IndexOutOfBounds { dim: 1, index: channel, extent: c });
        }
        let plane = h * w;
        let start = (batch * c + channel) * plane;
        Ok(start..start + plane)
    }

    /// The `height x width` plane of one channel.
    pub fn channel(&self, batch: usize, channel: usize) -> PicoResult<&[f32]> {
        let range = self.plane_range(batch, channel)?;
        Ok(&self.data[range])
    }

    pub fn channel_mut(&mut self, batch: usize, channel: usize) -> PicoResult<&mut [f32]> {
        let range = self.plane_range(batch, channel)?;
        Ok(&mut self.data[range])
    }

    /// Copy every element into `dest`. Element counts must match.
    pub fn copy_into(&self, dest: &mut Tensor) -> PicoResult<()> {
        if dest.data.len() != self.data.len() {
            return Err(PicoError::DimensionMismatch {
                expected: self.data.len(),
                actual: dest.data.len(),
            });
        }
        dest.data.copy_from_slice(&self.data);
        Ok(())
    }

    /// New tensor grown by `(top, left, bottom, right)` on the spatial axes.
    ///
    /// The border is `fill`; the interior is copied row by row.
    pub fn expand_with_padding(&self, pad: [usize; 4], fill: f32) -> PicoResult<Tensor> {
        let padded_shape = self.shape.padded(pad)?;
        let mut out = Tensor::full(padded_shape, fill)?;

        let [n, c, h, w] = self.shape.spatial();
        let [_, _, ph, pw] = padded_shape.spatial();
        let (top, left) = (pad[0], pad[1]);

        for plane in 0..n * c {
            let src = &self.data[plane * h * w..(plane + 1) * h * w];
            let dst = &mut out.data[plane * ph * pw..(plane + 1) * ph * pw];
            for (row, src_row) in src.chunks_exact(w).enumerate() {
                let start = (row + top) * pw + left;
                dst[start..start + w].copy_from_slice(src_row);
            }
        }
        Ok(out)
    }

    /// New tensor with `(top, left, bottom, right)` removed from the spatial axes.
    ///
    /// Inverse of [`Tensor::expand_with_padding`].
    pub fn crop(&self, [top, left, bottom, right]: [usize; 4]) -> PicoResult<Tensor> {
        let [n, c, h, w] = self.shape.spatial();
        if self.shape.rank() < 3 {
            return Err(PicoError::UnsupportedRank {
                op: "crop",
                rank: self.shape.rank(),
            });
        }
        if top + bottom >= h || left + right >= w {
            return Err(PicoError::InvalidParameter("crop removes the whole spatial extent"));
        }
        let (ch, cw) = (h - top - bottom, w - left - right);
        let shape = TensorShape::from_spatial(self.shape.layout(), [n, c, ch, cw])?;
        let mut out = Tensor::zeros(shape)?;

        for plane in 0..n * c {
            let src = &self.data[plane * h * w..(plane + 1) * h * w];
            let dst = &mut out.data[plane * ch * cw..(plane + 1) * ch * cw];
            for (row, dst_row) in dst.chunks_exact_mut(cw).enumerate() {
                let start = (row + top) * w + left;
                dst_row.copy_from_slice(&src[start..start + cw]);
            }
        }
        Ok(out)
    }

    /// Fill this tensor by stacking `sources` along the channel axis.
    ///
    /// Each source writes its channel range at a disjoint offset. Batch,
    /// height and width must agree; channel counts must sum to ours.
    pub fn concatenate_from(&mut self, sources: &[&Tensor], axis: usize) -> PicoResult<()> {
        let layout = self.shape.layout();
        if layout.channel_axis() != Some(axis) {
            return Err(PicoError::UnsupportedAxis(axis));
        }
        let [n, c, h, w] = self.shape.spatial();

        let mut total_channels = 0;
        for src in sources {
            let [sn, sc, sh, sw] = src.shape.spatial();
            if src.shape.layout() != layout || sn != n || sh != h || sw != w {
                return Err(PicoError::ShapeMismatch {
                    expected: self.shape.to_string(),
                    actual: src.shape.to_string(),
                });
            }
            total_channels += sc;
        }
        if total_channels != c {
            return Err(PicoError::DimensionMismatch {
                expected: c,
                actual: total_channels,
            });
        }

        let plane = h * w;
        for batch in 0..n {
            let mut channel_offset = 0;
            for src in sources {
                let sc = src.shape.num_channels();
                let src_start = batch * sc * plane;
                let dst_start = (batch * c + channel_offset) * plane;
                let len = sc * plane;
                self.data[dst_start..dst_start + len]
                    .copy_from_slice(&src.data[src_start..src_start + len]);
                channel_offset += sc;
            }
        }
        Ok(())
    }

    /// Accumulate one channel plane of `other` into the same plane of `self`.
    pub fn add_channel(&mut self, other: &Tensor, batch: usize, channel: usize) -> PicoResult<()> {
        let src = other.channel(batch, channel)?;
        let dst = self.channel_mut(batch, channel)?;
        if src.len() != dst.len() {
            return Err(PicoError::DimensionMismatch {
                expected: dst.len(),
                actual: src.len(),
            });
        }
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s;
        }
        Ok(())
    }

    /// Index of the largest element (first on ties).
    pub fn argmax(&self) -> Option<usize> {
        crate::math::argmax(&self.data)
    }
}
