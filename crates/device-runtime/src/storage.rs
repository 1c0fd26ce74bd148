// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference-counted storage buffers.
//!
//! A [`Storage`] is a shared-ownership handle over a raw byte range on a
//! specific device. Tensors alias storage freely — many tensors may point
//! into the same buffer at different offsets and strides — and the buffer
//! is released exactly when the last handle drops. The refcount is atomic
//! (`Arc`) so handles may be dropped from any thread.
//!
//! Host buffers are allocated by the built-in [`HostRuntime`] with 64-byte
//! alignment, which keeps every element-size-multiple offset inside the
//! buffer correctly aligned for typed access. Accelerator buffers carry a
//! release hook back to the runtime that allocated them.
//!
//! [`HostRuntime`]: crate::HostRuntime

use crate::{DeviceKind, RuntimeError};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

/// Alignment for host allocations. Large enough for every supported
/// element type and for cache-line-friendly kernel access.
const HOST_ALIGN: usize = 64;

/// Release hook invoked when the last [`Storage`] handle drops.
///
/// Accelerator runtimes supply one of these from [`Storage::external`] so
/// that device memory is returned through the driver that allocated it.
pub type ReleaseFn = Box<dyn Fn(NonNull<u8>, usize) + Send + Sync>;

enum Release {
    /// Host allocation owned by this crate; freed with `std::alloc`.
    Host,
    /// Foreign allocation; freed through the provided hook.
    External(ReleaseFn),
}

struct StorageInner {
    ptr: NonNull<u8>,
    size: usize,
    kind: DeviceKind,
    device_id: i32,
    release: Release,
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        tracing::trace!(size = self.size, kind = ?self.kind, "releasing storage");
        match &self.release {
            Release::Host => {
                // SAFETY: the pointer was produced by `alloc_zeroed` with
                // exactly this layout in `Storage::host`.
                unsafe {
                    alloc::dealloc(self.ptr.as_ptr(), host_layout(self.size));
                }
            }
            Release::External(release) => release(self.ptr, self.size),
        }
    }
}

// SAFETY: StorageInner owns its allocation exclusively; the raw pointer is
// never handed out with lifetime beyond the Arc, and all mutation through
// it is the tensor layer's responsibility.
unsafe impl Send for StorageInner {}
unsafe impl Sync for StorageInner {}

fn host_layout(size: usize) -> Layout {
    // Zero-sized tensors still get a live, legally addressable buffer.
    Layout::from_size_align(size.max(1), HOST_ALIGN).expect("host layout")
}

/// A shared-ownership byte buffer on a specific device.
///
/// Cloning a `Storage` is cheap (an `Arc` bump) and does not copy data.
/// The underlying buffer stays live and legally addressable on its device
/// for the whole lifetime of the last clone.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

impl Storage {
    /// Allocates a zero-initialised host buffer.
    ///
    /// Only runtimes create storage; the tensor layer goes through
    /// [`Context`](crate::Context) instead.
    pub(crate) fn host(size_bytes: usize) -> Result<Self, RuntimeError> {
        let layout = host_layout(size_bytes);
        // SAFETY: layout has non-zero size by construction.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RuntimeError::AllocationFailed {
            size_bytes,
            kind: DeviceKind::Cpu,
        })?;
        tracing::trace!(size = size_bytes, "allocated host storage");
        Ok(Self {
            inner: Arc::new(StorageInner {
                ptr,
                size: size_bytes,
                kind: DeviceKind::Cpu,
                device_id: 0,
                release: Release::Host,
            }),
        })
    }

    /// Wraps memory allocated by an external device runtime.
    ///
    /// `release` is called with the pointer and size when the last handle
    /// drops. The caller guarantees the memory is live and legally
    /// addressable on `(kind, device_id)` until then.
    pub fn external(
        ptr: NonNull<u8>,
        size_bytes: usize,
        kind: DeviceKind,
        device_id: i32,
        release: ReleaseFn,
    ) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                ptr,
                size: size_bytes,
                kind,
                device_id,
                release: Release::External(release),
            }),
        }
    }

    /// Base pointer of the buffer.
    ///
    /// For accelerator storage this is a device pointer and must not be
    /// dereferenced on the host.
    pub fn memory(&self) -> *mut u8 {
        self.inner.ptr.as_ptr()
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// The device kind this buffer lives on.
    pub fn device_kind(&self) -> DeviceKind {
        self.inner.kind
    }

    /// The device id within the device kind.
    pub fn device_id(&self) -> i32 {
        self.inner.device_id
    }

    /// `true` when the buffer is host-addressable.
    pub fn is_host(&self) -> bool {
        self.inner.kind == DeviceKind::Cpu
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("size", &self.inner.size)
            .field("device_kind", &self.inner.kind)
            .field("device_id", &self.inner.device_id)
            .field("refcount", &Arc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_host_storage_is_zeroed() {
        let s = Storage::host(64).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(s.memory(), s.size()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_host_storage_alignment() {
        let s = Storage::host(32).unwrap();
        assert_eq!(s.memory() as usize % HOST_ALIGN, 0);
    }

    #[test]
    fn test_zero_sized_storage() {
        let s = Storage::host(0).unwrap();
        assert_eq!(s.size(), 0);
        assert!(!s.memory().is_null());
    }

    #[test]
    fn test_clone_shares_buffer() {
        let a = Storage::host(16).unwrap();
        let b = a.clone();
        assert_eq!(a.memory(), b.memory());
    }

    #[test]
    fn test_external_release_runs_once() {
        static RELEASED: AtomicUsize = AtomicUsize::new(0);

        let layout = Layout::from_size_align(128, HOST_ALIGN).unwrap();
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw).unwrap();

        let s = Storage::external(
            ptr,
            128,
            DeviceKind::Accelerator,
            0,
            Box::new(move |p, _size| {
                RELEASED.fetch_add(1, Ordering::SeqCst);
                unsafe { alloc::dealloc(p.as_ptr(), layout) };
            }),
        );
        let s2 = s.clone();
        drop(s);
        assert_eq!(RELEASED.load(Ordering::SeqCst), 0);
        drop(s2);
        assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
    }
}
