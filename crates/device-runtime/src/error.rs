// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device runtimes and storage.

use crate::{DeviceKind, MemcpyDirection};

/// Errors surfaced by device runtimes.
///
/// Runtime failures are fatal from the caller's perspective — nothing is
/// retried, and partially written buffers must be treated as garbage.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime could not provide a buffer of the requested size.
    #[error("allocation of {size_bytes} bytes failed on {kind:?}")]
    AllocationFailed {
        size_bytes: usize,
        kind: DeviceKind,
    },

    /// A synchronous memory copy failed.
    #[error("memcpy of {size_bytes} bytes ({direction:?}) failed: {detail}")]
    CopyFailed {
        direction: MemcpyDirection,
        size_bytes: usize,
        detail: String,
    },

    /// The requested device does not exist for this runtime.
    #[error("no device {device_id} for {kind:?} runtime")]
    InvalidDevice { kind: DeviceKind, device_id: i32 },

    /// An accelerator runtime is already registered for this process.
    ///
    /// Exactly one accelerator family may be active per process.
    #[error("an accelerator runtime is already registered")]
    AcceleratorAlreadyRegistered,

    /// An operation asked for the accelerator runtime, but none is registered.
    #[error("no accelerator runtime registered")]
    NoAccelerator,

    /// The device driver reported a failure during synchronization.
    #[error("device synchronize failed on {kind:?}: {detail}")]
    SynchronizeFailed { kind: DeviceKind, detail: String },
}
