// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Linear (affine) projection.

use super::{check_contiguous, check_cpu, check_rank, check_same_device, check_same_dtype};
use crate::{DType, Element, Tensor, TensorError};

/// Computes `out = input · weightᵀ + bias`.
///
/// `input` is `[batch, in_features]`, `weight` is
/// `[out_features, in_features]` — output features first, so each output
/// unit's weights are one contiguous row — and `bias`, when present, is
/// `[out_features]`. A missing bias is treated as zero.
///
/// For `f16`/`bf16` the products accumulate into a temporary `f32`
/// buffer which is narrowed once at the end; `f32` writes the output
/// directly.
///
/// # Errors
/// Returns [`TensorError::UnsupportedDType`] for dtypes outside
/// `{f32, f16, bf16}`, and precondition errors for rank, shape, dtype,
/// device, or contiguity violations.
pub fn linear(
    out: &mut Tensor,
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
) -> Result<(), TensorError> {
    const OP: &str = "linear";

    check_same_device(OP, &[out, input, weight])?;
    check_cpu(OP, out)?;
    check_contiguous(OP, &[out, input, weight])?;
    check_rank(OP, input, 2)?;
    check_rank(OP, weight, 2)?;
    check_rank(OP, out, 2)?;
    check_same_dtype(OP, &[out, input, weight])?;

    let batch = input.shape()[0];
    let in_features = input.shape()[1];
    let out_features = weight.shape()[0];

    if weight.shape()[1] != in_features {
        return Err(TensorError::ShapeMismatch {
            op: OP,
            expected: vec![out_features, in_features],
            actual: weight.shape().to_vec(),
        });
    }
    super::check_shape(OP, out, &[batch, out_features])?;

    if let Some(bias) = bias {
        check_same_device(OP, &[out, bias])?;
        check_contiguous(OP, &[bias])?;
        check_rank(OP, bias, 1)?;
        check_same_dtype(OP, &[out, bias])?;
        super::check_shape(OP, bias, &[out_features])?;
    }

    match out.dtype() {
        DType::F32 => linear_f32(out, input, weight, bias),
        DType::F16 => linear_promoted::<half::f16>(out, input, weight, bias),
        DType::BF16 => linear_promoted::<half::bf16>(out, input, weight, bias),
        dtype => Err(TensorError::UnsupportedDType { op: OP, dtype }),
    }
}

/// 4-wide unrolled dot product on `f32`.
#[inline]
fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len();
    let mut sum = 0.0f32;
    let mut i = 0;
    while i + 3 < n {
        sum += a[i] * b[i]
            + a[i + 1] * b[i + 1]
            + a[i + 2] * b[i + 2]
            + a[i + 3] * b[i + 3];
        i += 4;
    }
    while i < n {
        sum += a[i] * b[i];
        i += 1;
    }
    sum
}

/// 4-wide unrolled dot product promoting each element to `f32`.
#[inline]
fn dot_promoted<T: Element>(a: &[T], b: &[T]) -> f32 {
    let n = a.len();
    let mut sum = 0.0f32;
    let mut i = 0;
    while i + 3 < n {
        sum += a[i].to_f32() * b[i].to_f32()
            + a[i + 1].to_f32() * b[i + 1].to_f32()
            + a[i + 2].to_f32() * b[i + 2].to_f32()
            + a[i + 3].to_f32() * b[i + 3].to_f32();
        i += 4;
    }
    while i < n {
        sum += a[i].to_f32() * b[i].to_f32();
        i += 1;
    }
    sum
}

fn linear_f32(
    out: &mut Tensor,
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
) -> Result<(), TensorError> {
    let batch = input.shape()[0];
    let in_features = input.shape()[1];
    let out_features = weight.shape()[0];

    let x = input.as_slice::<f32>()?;
    let w = weight.as_slice::<f32>()?;
    let bias = bias.map(|b| b.as_slice::<f32>()).transpose()?;
    let y = out.as_slice_mut::<f32>()?;

    // Preload the bias (or zero) so the GEMM below is pure accumulation.
    match bias {
        Some(bias) => {
            for b in 0..batch {
                y[b * out_features..(b + 1) * out_features].copy_from_slice(bias);
            }
        }
        None => y.fill(0.0),
    }

    for b in 0..batch {
        let x_row = &x[b * in_features..(b + 1) * in_features];
        let y_row = &mut y[b * out_features..(b + 1) * out_features];
        for o in 0..out_features {
            let w_row = &w[o * in_features..(o + 1) * in_features];
            y_row[o] += dot_f32(x_row, w_row);
        }
    }
    Ok(())
}

fn linear_promoted<T: Element>(
    out: &mut Tensor,
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
) -> Result<(), TensorError> {
    let batch = input.shape()[0];
    let in_features = input.shape()[1];
    let out_features = weight.shape()[0];

    let x = input.as_slice::<T>()?;
    let w = weight.as_slice::<T>()?;
    let bias = bias.map(|b| b.as_slice::<T>()).transpose()?;

    // Accumulate in f32, narrow exactly once at the end.
    let mut acc = vec![0.0f32; batch * out_features];
    if let Some(bias) = bias {
        for o in 0..out_features {
            let v = bias[o].to_f32();
            for b in 0..batch {
                acc[b * out_features + o] = v;
            }
        }
    }

    for b in 0..batch {
        let x_row = &x[b * in_features..(b + 1) * in_features];
        let acc_row = &mut acc[b * out_features..(b + 1) * out_features];
        for o in 0..out_features {
            let w_row = &w[o * in_features..(o + 1) * in_features];
            acc_row[o] += dot_promoted(x_row, w_row);
        }
    }

    let y = out.as_slice_mut::<T>()?;
    for (dst, &v) in y.iter_mut().zip(acc.iter()) {
        *dst = T::from_f32(v);
    }
    Ok(())
}
