// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The device runtime provider interface and the built-in host runtime.
//!
//! A [`DeviceRuntime`] is an opaque provider of allocation, synchronous
//! memory copies, and synchronization for one device family. The core ships
//! the host (CPU) implementation; an accelerator family plugs in by
//! implementing the same trait and registering through
//! [`Context::register_accelerator`](crate::Context::register_accelerator).
//!
//! Every call is synchronous from the caller's viewpoint: any device-side
//! asynchrony is the provider's business and must be hidden behind
//! `memcpy_sync` and `synchronize`.

use crate::{RuntimeError, Storage};

/// The device family a buffer or runtime belongs to.
///
/// Exactly one accelerator family is active per process; the device id
/// distinguishes devices within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DeviceKind {
    /// Host memory, computed on by the operator kernels.
    Cpu,
    /// The registered accelerator family (if any).
    Accelerator,
}

impl DeviceKind {
    /// Returns a human-readable label for this device kind.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Accelerator => "accelerator",
        }
    }
}

/// Direction of a synchronous memory copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemcpyDirection {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

/// An opaque provider of allocation, copy, and synchronize for one device
/// family.
///
/// Implementations must be safe to share across threads; the thread-local
/// current-device binding lives in [`Context`](crate::Context), not here.
pub trait DeviceRuntime: Send + Sync + std::fmt::Debug {
    /// The device family this runtime serves.
    fn kind(&self) -> DeviceKind;

    /// Binds subsequent calls on this thread to `device_id`.
    ///
    /// # Errors
    /// Returns [`RuntimeError::InvalidDevice`] if the id does not exist.
    fn set_device(&self, device_id: i32) -> Result<(), RuntimeError>;

    /// Allocates host-addressable memory.
    ///
    /// Accelerator runtimes return pinned host memory suitable for
    /// transfers; the host runtime returns ordinary aligned memory.
    fn allocate_host(&self, size_bytes: usize) -> Result<Storage, RuntimeError>;

    /// Allocates memory on the currently bound device.
    fn allocate_device(&self, size_bytes: usize, device_id: i32) -> Result<Storage, RuntimeError>;

    /// Copies `size_bytes` from `src` to `dst`, blocking until complete.
    ///
    /// # Safety
    /// `dst` and `src` must be valid for `size_bytes` on the sides named
    /// by `direction`, and the ranges must not overlap.
    unsafe fn memcpy_sync(
        &self,
        dst: *mut u8,
        src: *const u8,
        size_bytes: usize,
        direction: MemcpyDirection,
    ) -> Result<(), RuntimeError>;

    /// Blocks until all outstanding work on the bound device completes.
    fn synchronize(&self) -> Result<(), RuntimeError>;
}

/// The built-in host runtime.
///
/// All four copy directions degrade to plain host memcpy, and
/// `synchronize` is a no-op: host work is complete when the call returns.
#[derive(Debug, Default)]
pub struct HostRuntime;

impl DeviceRuntime for HostRuntime {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Cpu
    }

    fn set_device(&self, device_id: i32) -> Result<(), RuntimeError> {
        if device_id != 0 {
            return Err(RuntimeError::InvalidDevice {
                kind: DeviceKind::Cpu,
                device_id,
            });
        }
        Ok(())
    }

    fn allocate_host(&self, size_bytes: usize) -> Result<Storage, RuntimeError> {
        Storage::host(size_bytes)
    }

    fn allocate_device(&self, size_bytes: usize, device_id: i32) -> Result<Storage, RuntimeError> {
        self.set_device(device_id)?;
        Storage::host(size_bytes)
    }

    unsafe fn memcpy_sync(
        &self,
        dst: *mut u8,
        src: *const u8,
        size_bytes: usize,
        _direction: MemcpyDirection,
    ) -> Result<(), RuntimeError> {
        // SAFETY: caller guarantees both ranges are valid host memory and
        // non-overlapping.
        unsafe { std::ptr::copy_nonoverlapping(src, dst, size_bytes) };
        Ok(())
    }

    fn synchronize(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_runtime_kind() {
        assert_eq!(HostRuntime.kind(), DeviceKind::Cpu);
    }

    #[test]
    fn test_host_runtime_rejects_nonzero_device() {
        let err = HostRuntime.set_device(1).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidDevice { device_id: 1, .. }));
    }

    #[test]
    fn test_host_memcpy_roundtrip() {
        let rt = HostRuntime;
        let src = rt.allocate_host(8).unwrap();
        let dst = rt.allocate_host(8).unwrap();

        unsafe {
            std::slice::from_raw_parts_mut(src.memory(), 8).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
            rt.memcpy_sync(dst.memory(), src.memory(), 8, MemcpyDirection::HostToHost)
                .unwrap();
            assert_eq!(std::slice::from_raw_parts(dst.memory(), 8), &[1, 2, 3, 4, 5, 6, 7, 8]);
        }
    }

    #[test]
    fn test_device_kind_labels() {
        assert_eq!(DeviceKind::Cpu.as_str(), "cpu");
        assert_eq!(DeviceKind::Accelerator.as_str(), "accelerator");
    }
}
