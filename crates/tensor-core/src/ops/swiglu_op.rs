// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! SwiGLU activation.

use super::{check_contiguous, check_cpu, check_rank, check_same_device, check_same_dtype};
use crate::{DType, Element, Tensor, TensorError};

/// Elementwise SwiGLU: `out = up · SiLU(gate)` where
/// `SiLU(x) = x / (1 + exp(−x))`.
///
/// All three tensors are `[rows, cols]` with identical shape and dtype.
/// This is the one operator where passing the same tensor as input and
/// output is defined: the kernel reads both inputs for an element before
/// writing it.
///
/// # Errors
/// Returns [`TensorError::UnsupportedDType`] for dtypes outside
/// `{f32, f16, bf16}`, and precondition errors for rank, shape, dtype,
/// device, or contiguity violations.
pub fn swiglu(out: &mut Tensor, gate: &Tensor, up: &Tensor) -> Result<(), TensorError> {
    const OP: &str = "swiglu";

    check_same_device(OP, &[out, gate, up])?;
    check_cpu(OP, out)?;
    check_contiguous(OP, &[out, gate, up])?;
    check_rank(OP, out, 2)?;
    check_rank(OP, gate, 2)?;
    check_rank(OP, up, 2)?;
    check_same_dtype(OP, &[out, gate, up])?;

    super::check_shape(OP, gate, out.shape())?;
    super::check_shape(OP, up, out.shape())?;

    match out.dtype() {
        DType::F32 => activate::<f32>(out, gate, up),
        DType::F16 => activate::<half::f16>(out, gate, up),
        DType::BF16 => activate::<half::bf16>(out, gate, up),
        dtype => Err(TensorError::UnsupportedDType { op: OP, dtype }),
    }
}

fn activate<T: Element>(out: &mut Tensor, gate: &Tensor, up: &Tensor) -> Result<(), TensorError> {
    let n = out.numel();
    // Raw pointers instead of slices: `gate` or `up` may be the same
    // tensor as `out` (in-place activation is part of the contract), and
    // each element is read before it is written.
    let gate_ptr = gate.data() as *const T;
    let up_ptr = up.data() as *const T;
    let out_ptr = out.data_mut() as *mut T;

    for i in 0..n {
        // SAFETY: all three tensors are contiguous with n elements,
        // checked by the caller; reads happen before the write at i.
        unsafe {
            let g = (*gate_ptr.add(i)).to_f32();
            let u = (*up_ptr.add(i)).to_f32();
            let silu = g / (1.0 + (-g).exp());
            *out_ptr.add(i) = T::from_f32(u * silu);
        }
    }
    Ok(())
}
