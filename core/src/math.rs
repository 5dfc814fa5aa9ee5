//! Raw f32 kernels over contiguous slices.
//!
//! Layers validate shapes and configuration, then hand flat planes to these
//! functions. Nothing here allocates or checks shapes beyond what is needed
//! to stay in bounds; callers pass consistent extents.

use crate::error::{PicoError, PicoResult};

// =============================================================================
// Geometry
// =============================================================================

/// Output extent along one axis: `floor((input + before + after - kernel) / stride) + 1`.
pub fn window_output_size(
    input: usize,
    kernel: usize,
    pad_before: usize,
    pad_after: usize,
    stride: usize,
) -> PicoResult<usize> {
    if stride == 0 {
        return Err(PicoError::ZeroStride);
    }
    if kernel == 0 {
        return Err(PicoError::EmptyKernel);
    }
    let padded = input + pad_before + pad_after;
    if kernel > padded {
        return Err(PicoError::KernelLargerThanInput {
            kernel_h: kernel,
            kernel_w: kernel,
            input_h: padded,
            input_w: padded,
        });
    }
    Ok((padded - kernel) / stride + 1)
}

/// Per-plane work split across output channels.
///
/// Each call receives the plane index and exclusive access to that plane,
/// so no two workers ever write the same element.
pub(crate) fn try_for_each_plane<F>(output: &mut [f32], plane: usize, f: F) -> PicoResult<()>
where
    F: Fn(usize, &mut [f32]) -> PicoResult<()> + Send + Sync,
{
    if plane == 0 {
        return Ok(());
    }

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        output
            .par_chunks_mut(plane)
            .enumerate()
            .try_for_each(|(i, p)| f(i, p))
    }

    #[cfg(not(feature = "parallel"))]
    {
        output
            .chunks_mut(plane)
            .enumerate()
            .try_for_each(|(i, p)| f(i, p))
    }
}

pub(crate) fn for_each_plane<F>(output: &mut [f32], plane: usize, f: F)
where
    F: Fn(usize, &mut [f32]) + Send + Sync,
{
    // Infallible closure, so the result is always Ok.
    let _ = try_for_each_plane(output, plane, |i, p| {
        f(i, p);
        Ok(())
    });
}

// =============================================================================
// Cross-correlation
// =============================================================================

/// Accumulate the cross-correlation of one input plane with one kernel plane.
///
/// `input` is `in_h x in_w` (already padded), `kernel` is `kh x kw` and is not
/// flipped. Each output element receives `sum(kernel * window)` added to its
/// current value.
#[allow(clippy::too_many_arguments)]
pub fn correlate_accumulate(
    input: &[f32],
    in_w: usize,
    kernel: &[f32],
    kh: usize,
    kw: usize,
    stride: [usize; 2],
    output: &mut [f32],
    out_w: usize,
) {
    for (oy, out_row) in output.chunks_exact_mut(out_w).enumerate() {
        let y0 = oy * stride[0];
        for (ox, out) in out_row.iter_mut().enumerate() {
            let x0 = ox * stride[1];
            let mut acc = 0.0f32;
            for ky in 0..kh {
                let row = &input[(y0 + ky) * in_w + x0..][..kw];
                let taps = &kernel[ky * kw..][..kw];
                for (x, k) in row.iter().zip(taps) {
                    acc += x * k;
                }
            }
            *out += acc;
        }
    }
}

/// Fixed-size variant of [`correlate_accumulate`].
///
/// The kernel is copied into a stack array so the tap loops have constant
/// bounds and unroll. Summation order matches the generic path.
pub fn correlate_accumulate_fixed<const KH: usize, const KW: usize>(
    input: &[f32],
    in_w: usize,
    kernel: &[f32],
    stride: [usize; 2],
    output: &mut [f32],
    out_w: usize,
) {
    let mut taps = [[0.0f32; KW]; KH];
    for (ky, row) in taps.iter_mut().enumerate() {
        row.copy_from_slice(&kernel[ky * KW..(ky + 1) * KW]);
    }

    for (oy, out_row) in output.chunks_exact_mut(out_w).enumerate() {
        let y0 = oy * stride[0];
        for (ox, out) in out_row.iter_mut().enumerate() {
            let x0 = ox * stride[1];
            let mut acc = 0.0f32;
            for (ky, tap_row) in taps.iter().enumerate() {
                let row = &input[(y0 + ky) * in_w + x0..][..KW];
                for kx in 0..KW {
                    acc += row[kx] * tap_row[kx];
                }
            }
            *out += acc;
        }
    }
}

// =============================================================================
// Pooling
// =============================================================================

/// Max over each window of an already padded plane.
pub fn max_pool_plane(
    input: &[f32],
    in_w: usize,
    kernel: [usize; 2],
    stride: [usize; 2],
    output: &mut [f32],
    out_w: usize,
) {
    for (oy, out_row) in output.chunks_exact_mut(out_w).enumerate() {
        let y0 = oy * stride[0];
        for (ox, out) in out_row.iter_mut().enumerate() {
            let x0 = ox * stride[1];
            let mut max = f32::NEG_INFINITY;
            for ky in 0..kernel[0] {
                for &v in &input[(y0 + ky) * in_w + x0..][..kernel[1]] {
                    if v > max {
                        max = v;
                    }
                }
            }
            *out = max;
        }
    }
}

/// Divisor policy for average pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageDivisor {
    /// Always the full kernel area.
    KernelArea,
    /// Overlap of the window with the unpadded region
    /// `[top, top + height) x [left, left + width)` of the padded plane.
    Clipped {
        top: usize,
        left: usize,
        height: usize,
        width: usize,
    },
}

/// Window sum divided per [`AverageDivisor`] over an already padded plane.
pub fn average_pool_plane(
    input: &[f32],
    in_w: usize,
    kernel: [usize; 2],
    stride: [usize; 2],
    divisor: AverageDivisor,
    output: &mut [f32],
    out_w: usize,
) -> PicoResult<()> {
    let area = (kernel[0] * kernel[1]) as f32;
    for (oy, out_row) in output.chunks_exact_mut(out_w).enumerate() {
        let y0 = oy * stride[0];
        for (ox, out) in out_row.iter_mut().enumerate() {
            let x0 = ox * stride[1];
            let mut sum = 0.0f32;
            for ky in 0..kernel[0] {
                sum += input[(y0 + ky) * in_w + x0..][..kernel[1]].iter().sum::<f32>();
            }
            let div = match divisor {
                AverageDivisor::KernelArea => area,
                AverageDivisor::Clipped { top, left, height, width } => {
                    let rows = overlap(y0, kernel[0], top, height);
                    let cols = overlap(x0, kernel[1], left, width);
                    if rows * cols == 0 {
                        return Err(PicoError::ZeroDivisor { row: oy, col: ox });
                    }
                    (rows * cols) as f32
                }
            };
            *out = sum / div;
        }
    }
    Ok(())
}

/// Length of `[start, start + len) ∩ [lo, lo + extent)`.
fn overlap(start: usize, len: usize, lo: usize, extent: usize) -> usize {
    let a = start.max(lo);
    let b = (start + len).min(lo + extent);
    b.saturating_sub(a)
}

// =============================================================================
// Activation Functions
// =============================================================================

pub fn relu(input: &[f32], output: &mut [f32]) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = if x < 0.0 { 0.0 } else { x };
    }
}

pub fn leaky_relu(input: &[f32], output: &mut [f32], leak: f32) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = if x < 0.0 { leak * x } else { x };
    }
}

/// ReLU with a per-position slope for negative inputs.
pub fn parametric_relu(input: &[f32], slope: &[f32], output: &mut [f32]) {
    for ((o, &x), &s) in output.iter_mut().zip(input).zip(slope) {
        *o = if x < 0.0 { s * x } else { x };
    }
}

pub fn sigmoid(input: &[f32], output: &mut [f32]) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = 1.0 / (1.0 + (-x).exp());
    }
}

pub fn tanh(input: &[f32], output: &mut [f32]) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = x.tanh();
    }
}

pub fn clip(input: &[f32], output: &mut [f32], min: f32, max: f32) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = if x < min {
            min
        } else if x > max {
            max
        } else {
            x
        };
    }
}

/// Softmax over the whole slice.
///
/// The maximum is subtracted before exponentiating and the sum is kept in
/// f64, so large logits do not overflow.
pub fn softmax(input: &[f32], output: &mut [f32]) {
    let max = input.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let denominator: f64 = input.iter().map(|&x| ((x - max) as f64).exp()).sum();
    for (o, &x) in output.iter_mut().zip(input) {
        *o = (((x - max) as f64).exp() / denominator) as f32;
    }
}

/// Local response normalization across channels of a `depth x plane` block.
///
/// For channel `c` the window is `[max(0, c - n/2), min(depth - 1, c + n/2)]`
/// and `out = x / (1 + alpha / n * sum(window^2))^beta`.
pub fn local_response_norm(
    input: &[f32],
    output: &mut [f32],
    depth: usize,
    plane: usize,
    alpha: f32,
    beta: f32,
    n: usize,
) {
    let half = n / 2;
    let scale = alpha / n as f32;
    for c in 0..depth {
        let from = c.saturating_sub(half);
        let to = (c + half).min(depth - 1);
        for p in 0..plane {
            let sum: f32 = (from..=to).map(|i| input[i * plane + p].powi(2)).sum();
            let x = input[c * plane + p];
            output[c * plane + p] = x / (1.0 + scale * sum).powf(beta);
        }
    }
}

// =============================================================================
// Utility
// =============================================================================

/// Index of the maximum value (first on ties). `None` for an empty slice.
pub fn argmax(data: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in data.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
