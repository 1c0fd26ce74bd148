// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Root-mean-square normalization.

use super::{check_contiguous, check_cpu, check_rank, check_same_device, check_same_dtype};
use crate::{DType, Element, Tensor, TensorError};

/// Normalizes each row of `input` by its root mean square, then applies
/// the learned gain:
///
/// ```text
/// rms = sqrt(mean(x²) + eps)
/// out[b, i] = weight[i] * in[b, i] / rms
/// ```
///
/// `input` and `out` are `[batch, hidden]`, `weight` is `[hidden]`.
/// `eps` sits inside the square root. Accumulation happens in `f32`
/// regardless of the input dtype, so the result is scale-invariant to the
/// same degree for all supported dtypes.
///
/// # Errors
/// Returns [`TensorError::UnsupportedDType`] for dtypes outside
/// `{f32, f16, bf16}`, and precondition errors for rank, shape, dtype,
/// device, or contiguity violations.
pub fn rms_norm(
    out: &mut Tensor,
    input: &Tensor,
    weight: &Tensor,
    eps: f32,
) -> Result<(), TensorError> {
    const OP: &str = "rms_norm";

    check_same_device(OP, &[out, input, weight])?;
    check_cpu(OP, out)?;
    check_contiguous(OP, &[out, input, weight])?;
    check_rank(OP, input, 2)?;
    check_rank(OP, weight, 1)?;
    check_rank(OP, out, 2)?;
    check_same_dtype(OP, &[out, input, weight])?;

    super::check_shape(OP, out, input.shape())?;
    let hidden = input.shape()[1];
    super::check_shape(OP, weight, &[hidden])?;

    match out.dtype() {
        DType::F32 => normalize_rows::<f32>(out, input, weight, eps),
        DType::F16 => normalize_rows::<half::f16>(out, input, weight, eps),
        DType::BF16 => normalize_rows::<half::bf16>(out, input, weight, eps),
        dtype => Err(TensorError::UnsupportedDType { op: OP, dtype }),
    }
}

fn normalize_rows<T: Element>(
    out: &mut Tensor,
    input: &Tensor,
    weight: &Tensor,
    eps: f32,
) -> Result<(), TensorError> {
    let batch = input.shape()[0];
    let hidden = input.shape()[1];
    let src = input.as_slice::<T>()?;
    let gain = weight.as_slice::<T>()?;
    let dst = out.as_slice_mut::<T>()?;

    for b in 0..batch {
        let row = &src[b * hidden..(b + 1) * hidden];

        let mut sum_sq = 0.0f32;
        for &x in row {
            let v = x.to_f32();
            sum_sq += v * v;
        }
        let rms = (sum_sq / hidden as f32 + eps).sqrt();
        let scale = 1.0 / rms;

        let out_row = &mut dst[b * hidden..(b + 1) * hidden];
        for i in 0..hidden {
            out_row[i] = T::from_f32(gain[i].to_f32() * row[i].to_f32() * scale);
        }
    }
    Ok(())
}
