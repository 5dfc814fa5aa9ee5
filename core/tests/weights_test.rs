//! Weight container decoding and slot filling.

use std::io::Cursor;

use pico_rust_core::*;

/// Hand-assembled container, independent of `WeightFileWriter`.
struct RawStream(Vec<u8>);

impl RawStream {
    fn new(name: &str, layers: u32) -> Self {
        let mut s = Self(b"FD\n".to_vec());
        s.line(name).u32(layers);
        s
    }

    fn line(&mut self, text: &str) -> &mut Self {
        self.0.extend_from_slice(text.as_bytes());
        self.0.push(b'\n');
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_ne_bytes());
        self
    }

    fn floats(&mut self, values: &[f32]) -> &mut Self {
        for v in values {
            self.0.extend_from_slice(&v.to_ne_bytes());
        }
        self
    }

    fn end(&mut self) -> Vec<u8> {
        self.0.extend_from_slice(b"end\n");
        self.0.clone()
    }
}

fn conv_stream() -> Vec<u8> {
    let mut s = RawStream::new("tiny", 1);
    s.line("conv1").line("Conv");
    s.u32(2).u32(1).u32(1).u32(1).floats(&[2.0, 2.0]);
    s.u32(1).floats(&[0.5]);
    s.end()
}

fn slots(kernels: &[usize], biases: &[usize]) -> (Vec<Tensor>, Vec<Tensor>) {
    let make = |n: &usize| Tensor::zeros(TensorShape::d1(*n)).unwrap();
    (kernels.iter().map(make).collect(), biases.iter().map(make).collect())
}

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_load_conv_entry() {
    let (mut kernels, mut biases) = slots(&[2], &[1]);
    let store = WeightStore::load(Cursor::new(conv_stream()), &mut kernels, &mut biases).unwrap();

    assert_eq!(store.network_name(), "tiny");
    assert_eq!(kernels[0].as_slice(), &[2.0, 2.0]);
    assert_eq!(biases[0].as_slice(), &[0.5]);
    assert_eq!((store.num_kernel_slots(), store.num_bias_slots()), (1, 1));

    let record = &store.records()[0];
    assert_eq!(record.name, "conv1");
    assert_eq!(record.kind, OpKind::Conv);
    assert_eq!(record.kernel.as_ref().unwrap().shape.unwrap().dims(), &[2, 1, 1, 1]);
}

#[test]
fn test_plan_allocates_matching_slots() {
    let store = WeightStore::decode(Cursor::new(conv_stream())).unwrap();
    let plan = store.plan();
    assert_eq!(plan.kernels, vec![Some(TensorShape::d4(2, 1, 1, 1))]);
    assert_eq!(plan.biases, vec![Some(TensorShape::d1(1))]);

    let (mut kernels, mut biases) = plan.allocate().unwrap();
    store.commit(&mut kernels, &mut biases).unwrap();
    assert_eq!(kernels[0].shape().dims(), &[2, 1, 1, 1]);
    assert_eq!(kernels[0].as_slice(), &[2.0, 2.0]);
}

#[test]
fn test_batch_norm_fills_only_present_parameters() {
    let mut s = RawStream::new("bn", 1);
    s.line("bn1").line("BatchNormalization");
    s.u32(2).floats(&[1.0, 1.5]);
    s.u32(2).floats(&[0.0, -1.0]);
    s.u32(0);
    s.u32(0);
    let store = WeightStore::decode(Cursor::new(s.end())).unwrap();
    assert_eq!((store.num_kernel_slots(), store.num_bias_slots()), (0, 2));

    let (mut kernels, mut biases) = slots(&[], &[2, 2]);
    store.commit(&mut kernels, &mut biases).unwrap();
    assert_eq!(biases[0].as_slice(), &[1.0, 1.5]);
    assert_eq!(biases[1].as_slice(), &[0.0, -1.0]);
}

#[test]
fn test_slot_indices_advance_across_layers() {
    let mut s = RawStream::new("multi", 3);
    s.line("fc").line("Gemm").u32(1).u32(2).u32(2).floats(&[1.0, 2.0, 3.0, 4.0]).u32(2).floats(&[0.1, 0.2]);
    s.line("add").line("Add").u32(3).floats(&[7.0, 8.0, 9.0]);
    s.line("stack").line("MatMul").u32(2).u32(1).u32(2).floats(&[5.0, 6.0, 7.0, 8.0]).u32(0);
    let store = WeightStore::decode(Cursor::new(s.end())).unwrap();

    let plan = store.plan();
    assert_eq!(plan.kernels, vec![Some(TensorShape::d2(2, 2)), Some(TensorShape::d3(2, 1, 2))]);
    assert_eq!(plan.biases, vec![Some(TensorShape::d1(2)), Some(TensorShape::d1(3))]);

    let records = store.records();
    assert_eq!(records[1].biases[0].index, 1);
    assert_eq!(records[2].kernel.as_ref().unwrap().index, 1);
    assert!(records[2].biases.is_empty());
}

#[test]
fn test_empty_dense_kernel_still_claims_a_slot() {
    let mut s = RawStream::new("dense", 2);
    s.line("fc0").line("Gemm").u32(0).u32(4).u32(4).u32(0);
    s.line("fc1").line("Gemm").u32(1).u32(1).u32(1).floats(&[7.0]).u32(0);
    let store = WeightStore::decode(Cursor::new(s.end())).unwrap();
    assert_eq!((store.num_kernel_slots(), store.num_bias_slots()), (2, 0));

    let records = store.records();
    let empty = records[0].kernel.as_ref().unwrap();
    assert_eq!(empty.index, 0);
    assert!(empty.is_empty());
    assert_eq!(records[1].kernel.as_ref().unwrap().index, 1);

    let plan = store.plan();
    assert_eq!(plan.kernels, vec![None, Some(TensorShape::d2(1, 1))]);

    let (mut kernels, mut biases) = plan.allocate().unwrap();
    kernels[0].as_mut_slice().fill(-3.0);
    store.commit(&mut kernels, &mut biases).unwrap();
    assert_eq!(kernels[0].as_slice(), &[-3.0]);
    assert_eq!(kernels[1].as_slice(), &[7.0]);
}

#[test]
fn test_empty_dense_slot_accepts_any_tensor() {
    let mut s = RawStream::new("dense", 2);
    s.line("t0").line("Transpose").u32(3).u32(0).u32(2).u32(0);
    s.line("fc1").line("MatMul").u32(1).u32(1).u32(2).floats(&[1.0, 2.0]).u32(0);
    let (mut kernels, mut biases) = slots(&[5, 2], &[]);
    WeightStore::load(Cursor::new(s.end()), &mut kernels, &mut biases).unwrap();
    assert_eq!(kernels[0].as_slice(), &[0.0; 5]);
    assert_eq!(kernels[1].as_slice(), &[1.0, 2.0]);
}

#[test]
fn test_empty_conv_kernel_uses_no_slot() {
    let mut s = RawStream::new("odd", 1);
    s.line("conv0").line("Conv").u32(0).u32(3).u32(3).u32(3).u32(0);
    let store = WeightStore::decode(Cursor::new(s.end())).unwrap();
    assert_eq!((store.num_kernel_slots(), store.num_bias_slots()), (0, 0));
}

#[test]
fn test_trailing_bytes_after_end_are_ignored() {
    let mut bytes = conv_stream();
    bytes.extend_from_slice(b"garbage");
    assert!(WeightStore::decode(Cursor::new(bytes)).is_ok());
}

#[test]
fn test_decode_stops_at_end_marker() {
    let container = conv_stream();
    let mut bytes = container.clone();
    bytes.extend_from_slice(b"next record");

    let mut reader = Cursor::new(bytes);
    WeightStore::decode(&mut reader).unwrap();
    assert_eq!(reader.position(), container.len() as u64);
}

// =============================================================================
// Malformed streams
// =============================================================================

#[test]
fn test_bad_magic_is_rejected() {
    let mut bytes = conv_stream();
    bytes[0] = b'X';
    assert_eq!(
        WeightStore::decode(Cursor::new(bytes)).unwrap_err(),
        PicoError::BadMagic(*b"XD\n")
    );
}

#[test]
fn test_unknown_layer_type_is_rejected() {
    let mut s = RawStream::new("net", 1);
    s.line("mystery").line("Dropout");
    let err = WeightStore::decode(Cursor::new(s.end())).unwrap_err();
    assert_eq!(
        err,
        PicoError::UnknownLayerType {
            tag: "Dropout".to_string(),
            layer: 0
        }
    );
}

#[test]
fn test_bad_end_marker_is_rejected() {
    let mut bytes = conv_stream();
    let n = bytes.len();
    bytes[n - 4..].copy_from_slice(b"END\n");
    assert!(matches!(
        WeightStore::decode(Cursor::new(bytes)),
        Err(PicoError::BadEndMarker(_))
    ));
}

#[test]
fn test_truncated_stream_leaves_slots_untouched() {
    let bytes = conv_stream();
    let cut = bytes[..bytes.len() - 9].to_vec();
    let (mut kernels, mut biases) = slots(&[2], &[1]);
    kernels[0].as_mut_slice().fill(-1.0);

    let err = WeightStore::load(Cursor::new(cut), &mut kernels, &mut biases).unwrap_err();
    assert!(matches!(err, PicoError::Truncated { .. }));
    assert_eq!(kernels[0].as_slice(), &[-1.0, -1.0]);
    assert_eq!(biases[0].as_slice(), &[0.0]);
}

#[test]
fn test_slot_count_mismatch_writes_nothing() {
    let (mut kernels, mut biases) = slots(&[2, 4], &[1]);
    let err = WeightStore::load(Cursor::new(conv_stream()), &mut kernels, &mut biases).unwrap_err();
    assert_eq!(
        err,
        PicoError::SlotCount {
            kind: "kernel",
            expected: 1,
            actual: 2
        }
    );
    assert_eq!(kernels[0].as_slice(), &[0.0, 0.0]);
}

#[test]
fn test_slot_size_mismatch_writes_nothing() {
    let (mut kernels, mut biases) = slots(&[2], &[3]);
    let err = WeightStore::load(Cursor::new(conv_stream()), &mut kernels, &mut biases).unwrap_err();
    assert!(matches!(err, PicoError::SlotSizeMismatch { kind: "bias", index: 0, .. }));
    assert_eq!(kernels[0].as_slice(), &[0.0, 0.0]);
}

#[test]
fn test_oversized_name_is_rejected() {
    let long = "n".repeat(2000);
    let s = RawStream::new(&long, 0).end();
    assert!(matches!(
        WeightStore::decode(Cursor::new(s)),
        Err(PicoError::InvalidName { .. })
    ));
}

// =============================================================================
// Writer
// =============================================================================

#[test]
fn test_writer_output_decodes() {
    let mut writer = WeightFileWriter::new(Vec::new(), "written", 4).unwrap();
    writer
        .conv("conv1", [2, 1, 1, 1], &[2.0, 2.0], &[0.5])
        .unwrap()
        .batch_norm("bn1", &[1.0, 1.0], &[0.0, 0.0], &[0.1, 0.2], &[1.0, 1.0])
        .unwrap()
        .dense("fc", OpKind::Gemm, [1, 2, 3], &[1.0; 6], &[])
        .unwrap()
        .add("bias", &[9.0, 9.0, 9.0])
        .unwrap();
    let bytes = writer.finish().unwrap();

    let store = WeightStore::decode(Cursor::new(bytes)).unwrap();
    assert_eq!(store.network_name(), "written");
    assert_eq!(store.records().len(), 4);
    assert_eq!((store.num_kernel_slots(), store.num_bias_slots()), (2, 6));

    let kinds: Vec<OpKind> = store.records().iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![OpKind::Conv, OpKind::BatchNormalization, OpKind::Gemm, OpKind::Add]);
}

#[test]
fn test_writer_checks_declared_layer_count() {
    let mut writer = WeightFileWriter::new(Vec::new(), "short", 2).unwrap();
    writer.add("only", &[1.0]).unwrap();
    assert!(writer.finish().is_err());

    let mut writer = WeightFileWriter::new(Vec::new(), "full", 0).unwrap();
    assert!(writer.add("extra", &[1.0]).is_err());
}

#[test]
fn test_writer_checks_kernel_length() {
    let mut writer = WeightFileWriter::new(Vec::new(), "bad", 1).unwrap();
    assert!(matches!(
        writer.conv("c", [1, 1, 2, 2], &[1.0], &[]),
        Err(PicoError::ParameterLength { .. })
    ));
}

// =============================================================================
// End to end
// =============================================================================

#[test]
fn test_loaded_weights_drive_a_network() {
    let mut writer = WeightFileWriter::new(Vec::new(), "e2e", 1).unwrap();
    writer.conv("conv1", [1, 1, 1, 1], &[2.0], &[]).unwrap();
    let store = WeightStore::decode(Cursor::new(writer.finish().unwrap())).unwrap();
    let (mut kernels, mut biases) = store.plan().allocate().unwrap();
    store.commit(&mut kernels, &mut biases).unwrap();
    assert!(biases.is_empty());

    let conv = Convolution::new(
        LayerInfo::new("conv1", 0, OpKind::Conv),
        &kernels[0],
        None,
        ConvConfig::new(),
    )
    .unwrap();
    let relu = ReLU::new(LayerInfo::new("relu1", 1, OpKind::Relu));
    let layers: Vec<Box<dyn Layer + '_>> = vec![Box::new(conv), Box::new(relu)];
    let net = Network::new(layers, TensorShape::d4(1, 1, 2, 2)).unwrap();

    let input = Tensor::from_vec(TensorShape::d4(1, 1, 2, 2), vec![-1.0, 2.0, -3.0, 4.0]).unwrap();
    assert_eq!(net.forward(&input).unwrap().as_slice(), &[0.0, 4.0, 0.0, 8.0]);
}
