// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rotary position embedding.

use super::{check_contiguous, check_cpu, check_rank, check_same_device, check_same_dtype};
use crate::{DType, Element, Tensor, TensorError};

/// Applies rotary position embedding in the split-halves layout.
///
/// `input` and `out` are `[seq, heads, d]` with `d` even; `pos_ids` is a
/// 1-D `i64` tensor of absolute positions, one per sequence slot. With
/// `half = d / 2`, each pair `(in[s,h,i], in[s,h,half+i])` rotates by the
/// angle `pos_ids[s] / theta^(2i/d)`:
///
/// ```text
/// out[s,h,i]        = x_a·cos − x_b·sin
/// out[s,h,half+i]   = x_b·cos + x_a·sin
/// ```
///
/// The first and second halves of the head dimension are paired (not the
/// interleaved even/odd layout). The `half`-length inverse-frequency
/// table and the per-position sin/cos tables are precomputed once and
/// shared across heads.
///
/// # Errors
/// Returns [`TensorError::UnsupportedDType`] for dtypes outside
/// `{f32, f16, bf16}`, and precondition errors for rank, shape, dtype,
/// device, contiguity, or odd-`d` violations.
pub fn rope(
    out: &mut Tensor,
    input: &Tensor,
    pos_ids: &Tensor,
    theta: f32,
) -> Result<(), TensorError> {
    const OP: &str = "rope";

    check_same_device(OP, &[out, input, pos_ids])?;
    check_cpu(OP, out)?;
    check_contiguous(OP, &[out, input, pos_ids])?;
    check_rank(OP, input, 3)?;
    check_rank(OP, out, 3)?;
    check_rank(OP, pos_ids, 1)?;
    check_same_dtype(OP, &[out, input])?;

    if pos_ids.dtype() != DType::I64 {
        return Err(TensorError::DTypeMismatch {
            op: OP,
            lhs: DType::I64,
            rhs: pos_ids.dtype(),
        });
    }

    super::check_shape(OP, out, input.shape())?;
    let seq_len = input.shape()[0];
    super::check_shape(OP, pos_ids, &[seq_len])?;

    let d = input.shape()[2];
    if d % 2 != 0 {
        return Err(TensorError::Precondition {
            op: OP,
            detail: format!("head dimension {d} must be even"),
        });
    }

    match out.dtype() {
        DType::F32 => rotate::<f32>(out, input, pos_ids, theta),
        DType::F16 => rotate::<half::f16>(out, input, pos_ids, theta),
        DType::BF16 => rotate::<half::bf16>(out, input, pos_ids, theta),
        dtype => Err(TensorError::UnsupportedDType { op: OP, dtype }),
    }
}

fn rotate<T: Element>(
    out: &mut Tensor,
    input: &Tensor,
    pos_ids: &Tensor,
    theta: f32,
) -> Result<(), TensorError> {
    let seq_len = input.shape()[0];
    let n_heads = input.shape()[1];
    let d = input.shape()[2];
    let half = d / 2;

    let positions = pos_ids.as_slice::<i64>()?;
    let src = input.as_slice::<T>()?;
    let dst = out.as_slice_mut::<T>()?;

    // theta^(2i/d) for each pair index.
    let theta_pow: Vec<f32> = (0..half)
        .map(|i| theta.powf(2.0 * i as f32 / d as f32))
        .collect();

    // Per-position rotation tables, shared across heads.
    let mut sin_table = vec![0.0f32; seq_len * half];
    let mut cos_table = vec![0.0f32; seq_len * half];
    for s in 0..seq_len {
        let position = positions[s] as f32;
        for i in 0..half {
            let freq = position / theta_pow[i];
            sin_table[s * half + i] = freq.sin();
            cos_table[s * half + i] = freq.cos();
        }
    }

    for s in 0..seq_len {
        let sin_row = &sin_table[s * half..(s + 1) * half];
        let cos_row = &cos_table[s * half..(s + 1) * half];
        for h in 0..n_heads {
            let base = (s * n_heads + h) * d;
            for i in 0..half {
                let x_a = src[base + i].to_f32();
                let x_b = src[base + half + i].to_f32();
                dst[base + i] = T::from_f32(x_a * cos_row[i] - x_b * sin_row[i]);
                dst[base + half + i] = T::from_f32(x_b * cos_row[i] + x_a * sin_row[i]);
            }
        }
    }
    Ok(())
}
