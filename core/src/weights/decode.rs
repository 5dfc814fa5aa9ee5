use std::io::Read;

use byteorder::{NativeEndian, ReadBytesExt};
use log::{debug, warn};

use crate::error::{PicoError, PicoResult};
use crate::layers::OpKind;
use crate::shape::TensorShape;
use super::{LayerRecord, SlotCursor, SlotWrite, WeightStore, END_MARKER, MAGIC, MAX_NAME_LEN};

/// Floats are read in chunks so a corrupt count cannot force a huge
/// allocation before the stream runs dry.
const READ_CHUNK: usize = 4096;

pub(super) fn decode_stream<R: Read>(reader: R) -> PicoResult<WeightStore> {
    let mut decoder = Decoder { reader };

    let magic: [u8; 3] = decoder.read_array("magic number")?;
    if magic != MAGIC {
        return Err(PicoError::BadMagic(magic));
    }
    let network_name = decoder.read_line("network name")?;
    let layer_count = decoder.read_count("layer count")?;
    debug!("network {network_name:?} declares {layer_count} layers");

    let mut cursor = SlotCursor::default();
    let mut records = Vec::new();
    for layer in 0..layer_count {
        records.push(decoder.layer(layer, &mut cursor)?);
    }
    debug!("kernel slots: {}, bias slots: {}", cursor.kernel, cursor.bias);

    let end: [u8; 4] = decoder.read_array("end marker")?;
    if end != END_MARKER {
        return Err(PicoError::BadEndMarker(end));
    }

    Ok(WeightStore {
        network_name,
        records,
        slots: cursor,
    })
}

/// Reads straight from the caller's reader, never past the end marker.
struct Decoder<R> {
    reader: R,
}

impl<R: Read> Decoder<R> {
    fn read_array<const N: usize>(&mut self, context: &'static str) -> PicoResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| PicoError::from_io(e, context))?;
        Ok(buf)
    }

    fn read_count(&mut self, context: &'static str) -> PicoResult<usize> {
        let n = self
            .reader
            .read_u32::<NativeEndian>()
            .map_err(|e| PicoError::from_io(e, context))?;
        Ok(n as usize)
    }

    /// Newline-terminated ASCII; the newline is consumed, not returned.
    fn read_line(&mut self, context: &'static str) -> PicoResult<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self
                .reader
                .read_u8()
                .map_err(|e| PicoError::from_io(e, context))?;
            if b == b'\n' {
                break;
            }
            if bytes.len() == MAX_NAME_LEN {
                return Err(PicoError::InvalidName {
                    context,
                    max: MAX_NAME_LEN,
                });
            }
            bytes.push(b);
        }
        String::from_utf8(bytes).map_err(|_| PicoError::InvalidName {
            context,
            max: MAX_NAME_LEN,
        })
    }

    fn read_floats(&mut self, count: usize, context: &'static str) -> PicoResult<Vec<f32>> {
        let mut values = Vec::with_capacity(count.min(READ_CHUNK));
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(READ_CHUNK);
            let start = values.len();
            values.resize(start + n, 0.0);
            self.reader
                .read_f32_into::<NativeEndian>(&mut values[start..])
                .map_err(|e| PicoError::from_io(e, context))?;
            remaining -= n;
        }
        Ok(values)
    }

    /// `u32 count` followed by that many floats; `None` when the count is 0.
    fn read_counted(&mut self, context: &'static str) -> PicoResult<Option<Vec<f32>>> {
        match self.read_count(context)? {
            0 => Ok(None),
            n => self.read_floats(n, context).map(Some),
        }
    }

    fn bias_slot(
        &mut self,
        context: &'static str,
        cursor: &mut SlotCursor,
    ) -> PicoResult<Option<SlotWrite>> {
        Ok(self.read_counted(context)?.map(|values| SlotWrite {
            index: cursor.take_bias(),
            shape: Some(TensorShape::d1(values.len())),
            values,
        }))
    }

    fn layer(&mut self, layer: usize, cursor: &mut SlotCursor) -> PicoResult<LayerRecord> {
        let name = self.read_line("layer name")?;
        let tag = self.read_line("layer type")?;
        let kind = match tag.parse::<OpKind>() {
            Ok(kind @ (OpKind::Conv
            | OpKind::BatchNormalization
            | OpKind::Gemm
            | OpKind::MatMul
            | OpKind::Transpose
            | OpKind::Add)) => kind,
            _ => return Err(PicoError::UnknownLayerType { tag, layer }),
        };

        let mut record = LayerRecord {
            name,
            kind,
            kernel: None,
            biases: Vec::new(),
        };

        match kind {
            OpKind::Conv => {
                let out_ch = self.read_count("conv output channels")?;
                let in_ch = self.read_count("conv input channels")?;
                let kh = self.read_count("conv kernel height")?;
                let kw = self.read_count("conv kernel width")?;
                if out_ch != 0 && in_ch != 0 && kh != 0 && kw != 0 {
                    let total = checked_product(&[out_ch, in_ch, kh, kw])?;
                    let values = self.read_floats(total, "conv kernel values")?;
                    record.kernel = Some(SlotWrite {
                        index: cursor.take_kernel(),
                        shape: Some(TensorShape::d4(out_ch, in_ch, kh, kw)),
                        values,
                    });
                } else {
                    warn!(
                        "layer {layer} ({}): conv kernel {out_ch}x{in_ch}x{kh}x{kw} is empty, no kernel slot used",
                        record.name
                    );
                }
                record.biases.extend(self.bias_slot("conv bias values", cursor)?);
            }
            OpKind::BatchNormalization => {
                for context in ["gamma values", "beta values", "mean values", "variance values"] {
                    record.biases.extend(self.bias_slot(context, cursor)?);
                }
            }
            OpKind::Gemm | OpKind::MatMul | OpKind::Transpose => {
                let num_kernels = self.read_count("number of kernels")?;
                let kh = self.read_count("kernel height")?;
                let kw = self.read_count("kernel width")?;
                let total = checked_product(&[num_kernels, kh, kw])?;
                let values = self.read_floats(total, "kernel values")?;
                let shape = match (total, num_kernels) {
                    (0, _) => None,
                    (_, 1) => Some(TensorShape::d2(kh, kw)),
                    _ => Some(TensorShape::d3(num_kernels, kh, kw)),
                };
                record.kernel = Some(SlotWrite {
                    index: cursor.take_kernel(),
                    shape,
                    values,
                });
                record.biases.extend(self.bias_slot("bias values", cursor)?);
            }
            _ => {
                record.biases.extend(self.bias_slot("bias values", cursor)?);
            }
        }

        debug!(
            "layer {layer}: {:?} of type {kind}, kernel slot {:?}, bias slots {:?}",
            record.name,
            record.kernel.as_ref().map(|w| w.index),
            record.biases.iter().map(|w| w.index).collect::<Vec<_>>()
        );
        Ok(record)
    }
}

fn checked_product(dims: &[usize]) -> PicoResult<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(PicoError::InvalidParameter("declared weight count overflows"))
}
