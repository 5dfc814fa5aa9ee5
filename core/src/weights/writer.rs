use std::io::Write;

use byteorder::{NativeEndian, WriteBytesExt};

use crate::error::{PicoError, PicoResult};
use crate::layers::OpKind;
use super::{END_MARKER, MAGIC};

/// Encoder for the weight container, one layer entry at a time.
///
/// The layer count is declared up front; [`WeightFileWriter::finish`] refuses
/// to write the end marker unless exactly that many entries were written.
pub struct WeightFileWriter<W: Write> {
    inner: W,
    declared: usize,
    written: usize,
}

impl<W: Write> WeightFileWriter<W> {
    pub fn new(mut inner: W, network_name: &str, layer_count: u32) -> PicoResult<Self> {
        inner.write_all(&MAGIC).map_err(|e| PicoError::from_io(e, "magic number"))?;
        write_line(&mut inner, network_name, "network name")?;
        inner
            .write_u32::<NativeEndian>(layer_count)
            .map_err(|e| PicoError::from_io(e, "layer count"))?;
        Ok(Self {
            inner,
            declared: layer_count as usize,
            written: 0,
        })
    }

    /// `Conv` entry. `kernel` holds `out_ch * in_ch * kh * kw` values; an
    /// empty `bias` writes a zero count.
    pub fn conv(
        &mut self,
        name: &str,
        [out_ch, in_ch, kh, kw]: [u32; 4],
        kernel: &[f32],
        bias: &[f32],
    ) -> PicoResult<&mut Self> {
        let expected = [out_ch, in_ch, kh, kw].iter().map(|&d| d as usize).product();
        check_len("conv kernel", expected, kernel.len())?;
        self.header(name, OpKind::Conv)?;
        for d in [out_ch, in_ch, kh, kw] {
            self.count(d as usize)?;
        }
        self.floats(kernel)?;
        self.counted(bias)?;
        Ok(self)
    }

    /// `BatchNormalization` entry; an empty parameter writes a zero count.
    pub fn batch_norm(
        &mut self,
        name: &str,
        gamma: &[f32],
        beta: &[f32],
        mean: &[f32],
        variance: &[f32],
    ) -> PicoResult<&mut Self> {
        self.header(name, OpKind::BatchNormalization)?;
        for values in [gamma, beta, mean, variance] {
            self.counted(values)?;
        }
        Ok(self)
    }

    /// `Gemm`, `MatMul`, or `Transpose` entry of `num_kernels` blocks of `kh x kw`.
    pub fn dense(
        &mut self,
        name: &str,
        kind: OpKind,
        [num_kernels, kh, kw]: [u32; 3],
        kernel: &[f32],
        bias: &[f32],
    ) -> PicoResult<&mut Self> {
        if !matches!(kind, OpKind::Gemm | OpKind::MatMul | OpKind::Transpose) {
            return Err(PicoError::InvalidParameter("dense entry must be Gemm, MatMul or Transpose"));
        }
        let expected = [num_kernels, kh, kw].iter().map(|&d| d as usize).product();
        check_len("dense kernel", expected, kernel.len())?;
        self.header(name, kind)?;
        for d in [num_kernels, kh, kw] {
            self.count(d as usize)?;
        }
        self.floats(kernel)?;
        self.counted(bias)?;
        Ok(self)
    }

    /// `Add` entry carrying a constant operand.
    pub fn add(&mut self, name: &str, bias: &[f32]) -> PicoResult<&mut Self> {
        self.header(name, OpKind::Add)?;
        self.counted(bias)?;
        Ok(self)
    }

    /// Write the end marker and hand back the sink.
    pub fn finish(mut self) -> PicoResult<W> {
        if self.written != self.declared {
            return Err(PicoError::DimensionMismatch {
                expected: self.declared,
                actual: self.written,
            });
        }
        self.inner
            .write_all(&END_MARKER)
            .map_err(|e| PicoError::from_io(e, "end marker"))?;
        self.inner.flush().map_err(|e| PicoError::from_io(e, "end marker"))?;
        Ok(self.inner)
    }

    fn header(&mut self, name: &str, kind: OpKind) -> PicoResult<()> {
        if self.written == self.declared {
            return Err(PicoError::DimensionMismatch {
                expected: self.declared,
                actual: self.written + 1,
            });
        }
        write_line(&mut self.inner, name, "layer name")?;
        write_line(&mut self.inner, kind.tag(), "layer type")?;
        self.written += 1;
        Ok(())
    }

    fn count(&mut self, n: usize) -> PicoResult<()> {
        let n = u32::try_from(n).map_err(|_| PicoError::InvalidParameter("count exceeds u32"))?;
        self.inner
            .write_u32::<NativeEndian>(n)
            .map_err(|e| PicoError::from_io(e, "count"))
    }

    fn floats(&mut self, values: &[f32]) -> PicoResult<()> {
        for &v in values {
            self.inner
                .write_f32::<NativeEndian>(v)
                .map_err(|e| PicoError::from_io(e, "values"))?;
        }
        Ok(())
    }

    fn counted(&mut self, values: &[f32]) -> PicoResult<()> {
        self.count(values.len())?;
        self.floats(values)
    }
}

fn write_line<W: Write>(w: &mut W, text: &str, context: &'static str) -> PicoResult<()> {
    if text.contains('\n') {
        return Err(PicoError::InvalidName {
            context,
            max: super::MAX_NAME_LEN,
        });
    }
    w.write_all(text.as_bytes())
        .and_then(|_| w.write_all(b"\n"))
        .map_err(|e| PicoError::from_io(e, context))
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> PicoResult<()> {
    if expected != actual {
        return Err(PicoError::ParameterLength {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
