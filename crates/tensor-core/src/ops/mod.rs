// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Transformer inference operator kernels.
//!
//! Every operator is a pure function over tensors: the caller allocates
//! the output, the kernel validates shapes, dtypes, devices, and
//! contiguity, then computes. Nothing here allocates output tensors or
//! spawns background work; calls complete synchronously in program order.
//!
//! Shared contract:
//! - inputs must be contiguous and on the same device;
//! - all value tensors share one dtype (index tensors are `i64`);
//! - kernels run on the CPU — accelerator tensors are rejected;
//! - `f16`/`bf16` arithmetic happens at `f32` precision and narrows on
//!   write.

mod argmax_op;
mod embedding_op;
mod linear_op;
mod rms_norm_op;
mod rope_op;
mod self_attention_op;
mod swiglu_op;

pub use argmax_op::argmax;
pub use embedding_op::embedding;
pub use linear_op::linear;
pub use rms_norm_op::rms_norm;
pub use rope_op::rope;
pub use self_attention_op::self_attention;
pub use swiglu_op::swiglu;

use crate::{Tensor, TensorError};
use device_runtime::DeviceKind;

/// Rejects non-CPU tensors; operators only execute on the host.
pub(crate) fn check_cpu(op: &'static str, tensor: &Tensor) -> Result<(), TensorError> {
    if tensor.device_kind() != DeviceKind::Cpu {
        return Err(TensorError::UnsupportedDevice {
            op,
            kind: tensor.device_kind(),
        });
    }
    Ok(())
}

/// All tensors must live on the first tensor's device.
pub(crate) fn check_same_device(
    op: &'static str,
    tensors: &[&Tensor],
) -> Result<(), TensorError> {
    let (first, rest) = tensors.split_first().expect("at least one tensor");
    for t in rest {
        if t.device_kind() != first.device_kind() || t.device_id() != first.device_id() {
            return Err(TensorError::DeviceMismatch {
                op,
                lhs: first.device_kind(),
                rhs: t.device_kind(),
            });
        }
    }
    Ok(())
}

/// All tensors must share the first tensor's dtype.
pub(crate) fn check_same_dtype(op: &'static str, tensors: &[&Tensor]) -> Result<(), TensorError> {
    let (first, rest) = tensors.split_first().expect("at least one tensor");
    for t in rest {
        if t.dtype() != first.dtype() {
            return Err(TensorError::DTypeMismatch {
                op,
                lhs: first.dtype(),
                rhs: t.dtype(),
            });
        }
    }
    Ok(())
}

/// Every tensor must be stride-packed.
pub(crate) fn check_contiguous(op: &'static str, tensors: &[&Tensor]) -> Result<(), TensorError> {
    for t in tensors {
        if !t.is_contiguous() {
            return Err(TensorError::NotContiguous { op });
        }
    }
    Ok(())
}

/// The tensor must have exactly `rank` dimensions.
pub(crate) fn check_rank(
    op: &'static str,
    tensor: &Tensor,
    rank: usize,
) -> Result<(), TensorError> {
    if tensor.ndim() != rank {
        return Err(TensorError::RankMismatch {
            op,
            expected: rank,
            actual: tensor.ndim(),
        });
    }
    Ok(())
}

/// The tensor's shape must equal `expected`.
pub(crate) fn check_shape(
    op: &'static str,
    tensor: &Tensor,
    expected: &[usize],
) -> Result<(), TensorError> {
    if tensor.shape() != expected {
        return Err(TensorError::ShapeMismatch {
            op,
            expected: expected.to_vec(),
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(())
}
