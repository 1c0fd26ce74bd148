// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor construction and operator kernels.

use crate::DType;
use device_runtime::DeviceKind;

/// Errors that can occur during tensor operations.
///
/// Every message names the operation and the violated condition. Nothing
/// is retried; partially written outputs must be treated as garbage.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// Two tensors have incompatible shapes for the requested operation.
    #[error("{op}: shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A tensor has the wrong number of dimensions.
    #[error("{op}: rank mismatch: expected {expected}, got {actual}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Two tensors that must share a dtype do not.
    #[error("{op}: dtype mismatch: {lhs:?} vs {rhs:?}")]
    DTypeMismatch {
        op: &'static str,
        lhs: DType,
        rhs: DType,
    },

    /// Two tensors that must share a device do not.
    #[error("{op}: device mismatch: {lhs:?} vs {rhs:?}")]
    DeviceMismatch {
        op: &'static str,
        lhs: DeviceKind,
        rhs: DeviceKind,
    },

    /// The operation requires a contiguous tensor.
    #[error("{op}: tensor must be contiguous")]
    NotContiguous { op: &'static str },

    /// A dimension or element index is out of range.
    #[error("{op}: index {index} out of range for size {len}")]
    IndexOutOfRange {
        op: &'static str,
        index: usize,
        len: usize,
    },

    /// A precondition not covered by the structured variants failed.
    #[error("{op}: {detail}")]
    Precondition { op: &'static str, detail: String },

    /// The operator has no kernel for this dtype.
    #[error("unsupported dtype {dtype:?} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// The operator cannot run on this device kind.
    #[error("operation {op} is not supported on {kind:?} devices")]
    UnsupportedDevice { op: &'static str, kind: DeviceKind },

    /// The device runtime reported a failure.
    #[error("device runtime failure: {0}")]
    Runtime(#[from] device_runtime::RuntimeError),

    /// An internal invariant was violated; indicates a bug in the core.
    #[error("internal invariant violated in {op}: {detail}")]
    Internal {
        op: &'static str,
        detail: &'static str,
    },
}
