// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The strided tensor type and its view machinery.
//!
//! A [`Tensor`] is metadata over a shared [`Storage`] buffer: a dtype, a
//! shape, a vector of signed **element** strides, and a **byte** offset
//! into the buffer. Views (`permute`, `view`, `slice`) share storage and
//! only rewrite metadata; `contiguous` and `to` allocate fresh storage and
//! copy. Storage is released exactly when the last tensor referencing it
//! drops.
//!
//! # Units
//! Strides count elements; the offset counts bytes. The conversion between
//! the two happens in exactly one place — the raw data accessors
//! ([`Tensor::data`] / [`Tensor::data_mut`]) and the gather loop in
//! [`Tensor::contiguous`]. Everything else stays in a single unit.

use crate::{DType, Element, TensorError};
use device_runtime::{context, DeviceKind, MemcpyDirection, Storage};

/// Computes row-major element strides for `shape`.
fn contiguous_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut stride = 1isize;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i] as isize;
    }
    strides
}

/// An n-dimensional strided view over reference-counted storage.
///
/// Cloning a tensor is cheap: the clone shares storage and copies only
/// metadata. Metadata (dtype, shape, strides, offset) is immutable after
/// construction — derived tensors are new values.
///
/// # Aliasing
/// Multiple tensors may point into the same storage at different offsets
/// and strides. The core does not detect aliasing between operator inputs
/// and outputs; callers must ensure writes do not invalidate reads
/// (passing one tensor as both input and output is defined only for pure
/// elementwise operators).
#[derive(Clone)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    strides: Vec<isize>,
    storage: Storage,
    byte_offset: usize,
}

impl Tensor {
    /// Allocates a fresh contiguous row-major tensor on the given device.
    ///
    /// When CPU storage is requested while an accelerator runtime is
    /// active, the buffer comes from the accelerator's pinned host
    /// allocator so that later transfers are cheap. Otherwise the target
    /// device is bound and the allocation happens there.
    ///
    /// # Errors
    /// Propagates [`RuntimeError`](device_runtime::RuntimeError) from the
    /// device runtime as [`TensorError::Runtime`].
    pub fn create(
        shape: &[usize],
        dtype: DType,
        kind: DeviceKind,
        device_id: i32,
    ) -> Result<Self, TensorError> {
        let numel: usize = shape.iter().product();
        let size_bytes = numel * dtype.size_bytes();
        let ctx = context();

        let storage = if kind == DeviceKind::Cpu && ctx.active_kind() != DeviceKind::Cpu {
            ctx.runtime(DeviceKind::Accelerator)?
                .allocate_host(size_bytes)?
        } else {
            ctx.set_device(kind, device_id)?;
            ctx.runtime(kind)?.allocate_device(size_bytes, device_id)?
        };

        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            strides: contiguous_strides(shape),
            storage,
            byte_offset: 0,
        })
    }

    /// Builds a CPU tensor from a typed slice (row-major order).
    ///
    /// # Errors
    /// Fails when `values.len()` does not match the shape's element count.
    pub fn from_slice<T: Element>(shape: &[usize], values: &[T]) -> Result<Self, TensorError> {
        let numel: usize = shape.iter().product();
        if values.len() != numel {
            return Err(TensorError::Precondition {
                op: "from_slice",
                detail: format!(
                    "shape {:?} needs {} elements, got {}",
                    shape,
                    numel,
                    values.len()
                ),
            });
        }
        let mut tensor = Self::create(shape, T::DTYPE, DeviceKind::Cpu, 0)?;
        // SAFETY: reinterpreting &[T] of a Copy type as bytes is sound.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                values.as_ptr() as *const u8,
                values.len() * std::mem::size_of::<T>(),
            )
        };
        tensor.load(bytes)?;
        Ok(tensor)
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// The tensor's extents, outermost dimension first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Signed strides in **elements**, one per dimension.
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// The element data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements (1 for rank-0 tensors).
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        self.dtype.size_bytes()
    }

    /// The device kind the backing storage lives on.
    pub fn device_kind(&self) -> DeviceKind {
        self.storage.device_kind()
    }

    /// The device id within the device kind.
    pub fn device_id(&self) -> i32 {
        self.storage.device_id()
    }

    /// Byte offset of the first element inside the storage buffer.
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Pointer to the first element.
    ///
    /// For accelerator tensors this is a device pointer and must not be
    /// dereferenced on the host. This is the single place (together with
    /// [`Tensor::data_mut`]) where the byte offset meets the raw buffer.
    pub fn data(&self) -> *const u8 {
        // SAFETY: byte_offset stays within the buffer for every tensor
        // built through the public constructors (checked there).
        unsafe { self.storage.memory().add(self.byte_offset) }
    }

    /// Mutable pointer to the first element.
    pub fn data_mut(&mut self) -> *mut u8 {
        unsafe { self.storage.memory().add(self.byte_offset) }
    }

    /// `true` iff the tensor is row-major stride-packed:
    /// `strides[n-1] == 1` and `strides[k] == strides[k+1] * shape[k+1]`.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1isize;
        for i in (0..self.shape.len()).rev() {
            if self.strides[i] != expected {
                return false;
            }
            expected *= self.shape[i] as isize;
        }
        true
    }

    /// Interprets the tensor as a typed slice in storage order.
    ///
    /// Requires a contiguous CPU tensor whose dtype matches `T`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], TensorError> {
        self.check_typed_access::<T>("as_slice")?;
        // SAFETY: bounds and dtype checked; host buffers are 64-byte
        // aligned and byte_offset is a multiple of the element size.
        Ok(unsafe { std::slice::from_raw_parts(self.data() as *const T, self.numel()) })
    }

    /// Interprets the tensor as a mutable typed slice in storage order.
    ///
    /// Requires a contiguous CPU tensor whose dtype matches `T`. Storage
    /// may be shared with other tensors; the caller is responsible for
    /// not invalidating concurrent reads through aliasing views.
    pub fn as_slice_mut<T: Element>(&mut self) -> Result<&mut [T], TensorError> {
        self.check_typed_access::<T>("as_slice_mut")?;
        let n = self.numel();
        // SAFETY: as above.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.data_mut() as *mut T, n) })
    }

    fn check_typed_access<T: Element>(&self, op: &'static str) -> Result<(), TensorError> {
        if self.device_kind() != DeviceKind::Cpu {
            return Err(TensorError::UnsupportedDevice {
                op,
                kind: self.device_kind(),
            });
        }
        if self.dtype != T::DTYPE {
            return Err(TensorError::DTypeMismatch {
                op,
                lhs: self.dtype,
                rhs: T::DTYPE,
            });
        }
        if !self.is_contiguous() {
            return Err(TensorError::NotContiguous { op });
        }
        if self.byte_offset + self.numel() * self.element_size() > self.storage.size() {
            return Err(TensorError::Internal {
                op,
                detail: "tensor span exceeds storage size",
            });
        }
        Ok(())
    }

    // ── Views ──────────────────────────────────────────────────────

    /// Reorders dimensions; `order` must be a permutation of `0..ndim`.
    ///
    /// Returns a view sharing this tensor's storage. The result is
    /// generally non-contiguous.
    pub fn permute(&self, order: &[usize]) -> Result<Tensor, TensorError> {
        let n = self.ndim();
        if order.len() != n {
            return Err(TensorError::RankMismatch {
                op: "permute",
                expected: n,
                actual: order.len(),
            });
        }
        let mut seen = vec![false; n];
        for &d in order {
            if d >= n {
                return Err(TensorError::IndexOutOfRange {
                    op: "permute",
                    index: d,
                    len: n,
                });
            }
            if seen[d] {
                return Err(TensorError::Precondition {
                    op: "permute",
                    detail: format!("order {order:?} is not a permutation"),
                });
            }
            seen[d] = true;
        }

        let shape = order.iter().map(|&d| self.shape[d]).collect();
        let strides = order.iter().map(|&d| self.strides[d]).collect();
        Ok(Tensor {
            dtype: self.dtype,
            shape,
            strides,
            storage: self.storage.clone(),
            byte_offset: self.byte_offset,
        })
    }

    /// Reinterprets a contiguous tensor under a new shape with the same
    /// element count. Returns a contiguous view sharing storage.
    pub fn view(&self, new_shape: &[usize]) -> Result<Tensor, TensorError> {
        if !self.is_contiguous() {
            return Err(TensorError::NotContiguous { op: "view" });
        }
        let total: usize = new_shape.iter().product();
        if total != self.numel() {
            return Err(TensorError::Precondition {
                op: "view",
                detail: format!(
                    "cannot view {} elements as shape {:?}",
                    self.numel(),
                    new_shape
                ),
            });
        }
        Ok(Tensor {
            dtype: self.dtype,
            shape: new_shape.to_vec(),
            strides: contiguous_strides(new_shape),
            storage: self.storage.clone(),
            byte_offset: self.byte_offset,
        })
    }

    /// Alias of [`Tensor::view`].
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Tensor, TensorError> {
        self.view(new_shape)
    }

    /// Narrows dimension `dim` to `start..end`.
    ///
    /// Returns a view with the same strides and an advanced byte offset;
    /// non-contiguity along other dimensions is preserved.
    pub fn slice(&self, dim: usize, start: usize, end: usize) -> Result<Tensor, TensorError> {
        if dim >= self.ndim() {
            return Err(TensorError::IndexOutOfRange {
                op: "slice",
                index: dim,
                len: self.ndim(),
            });
        }
        if start > end || end > self.shape[dim] {
            return Err(TensorError::Precondition {
                op: "slice",
                detail: format!(
                    "invalid range {start}..{end} for dimension {dim} of size {}",
                    self.shape[dim]
                ),
            });
        }

        // Strides are in elements, the offset is in bytes; convert here.
        let elem_offset = start as isize * self.strides[dim];
        let byte_offset =
            self.byte_offset as isize + elem_offset * self.element_size() as isize;
        if byte_offset < 0 || byte_offset as usize > self.storage.size() {
            return Err(TensorError::Internal {
                op: "slice",
                detail: "computed offset escapes storage",
            });
        }

        let mut shape = self.shape.clone();
        shape[dim] = end - start;
        Ok(Tensor {
            dtype: self.dtype,
            shape,
            strides: self.strides.clone(),
            storage: self.storage.clone(),
            byte_offset: byte_offset as usize,
        })
    }

    // ── Materialization ────────────────────────────────────────────

    /// Returns a stride-packed tensor with this tensor's values.
    ///
    /// Already-contiguous tensors return a view sharing storage. Otherwise
    /// a fresh buffer is allocated and filled by a gather copy: each
    /// row-major destination index is delinearized against the destination
    /// strides and remapped through the source strides. Only defined for
    /// CPU tensors; transfer with [`Tensor::to`] first.
    pub fn contiguous(&self) -> Result<Tensor, TensorError> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        if self.device_kind() != DeviceKind::Cpu {
            return Err(TensorError::UnsupportedDevice {
                op: "contiguous",
                kind: self.device_kind(),
            });
        }

        let out = Tensor::create(&self.shape, self.dtype, DeviceKind::Cpu, 0)?;
        let esize = self.element_size();
        let src_base = self.storage.memory() as *const u8;
        let dst_base = out.storage.memory();

        for i in 0..self.numel() {
            let mut remaining = i;
            let mut elem_offset = 0isize;
            for d in 0..self.ndim() {
                let step = out.strides[d] as usize;
                elem_offset += (remaining / step) as isize * self.strides[d];
                remaining %= step;
            }
            let src_byte = self.byte_offset as isize + elem_offset * esize as isize;
            debug_assert!(src_byte >= 0 && (src_byte as usize) < self.storage.size().max(1));
            // SAFETY: source offset is within storage (view constructors
            // keep every element in bounds); destination is a fresh
            // buffer of numel * esize bytes.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    src_base.add(src_byte as usize),
                    dst_base.add(i * esize),
                    esize,
                );
            }
        }
        Ok(out)
    }

    /// Moves the tensor to the given device.
    ///
    /// Returns an identity view when the tensor already lives there
    /// (`device_id < 0` matches any id on the same kind). Non-contiguous
    /// sources are gathered first so the transferred bytes are
    /// value-correct.
    pub fn to(&self, kind: DeviceKind, device_id: i32) -> Result<Tensor, TensorError> {
        if kind == self.device_kind() && (device_id < 0 || device_id == self.device_id()) {
            return Ok(self.clone());
        }

        let source = if self.is_contiguous() {
            self.clone()
        } else {
            self.contiguous()?
        };

        let mut dest = Tensor::create(&source.shape, source.dtype, kind, device_id)?;
        let size_bytes = source.numel() * source.element_size();
        let direction = match (source.device_kind(), kind) {
            (DeviceKind::Cpu, DeviceKind::Cpu) => MemcpyDirection::HostToHost,
            (DeviceKind::Cpu, DeviceKind::Accelerator) => MemcpyDirection::HostToDevice,
            (DeviceKind::Accelerator, DeviceKind::Cpu) => MemcpyDirection::DeviceToHost,
            (DeviceKind::Accelerator, DeviceKind::Accelerator) => MemcpyDirection::DeviceToDevice,
        };
        let runtime_kind = if source.device_kind() == DeviceKind::Accelerator
            || kind == DeviceKind::Accelerator
        {
            DeviceKind::Accelerator
        } else {
            DeviceKind::Cpu
        };

        tracing::debug!(
            from = source.device_kind().as_str(),
            to = kind.as_str(),
            size_bytes,
            "tensor transfer"
        );
        // SAFETY: both tensors are contiguous with size_bytes of valid
        // memory on their respective devices, and they do not overlap.
        unsafe {
            context().runtime(runtime_kind)?.memcpy_sync(
                dest.data_mut(),
                source.data(),
                size_bytes,
                direction,
            )?;
        }
        Ok(dest)
    }

    /// Copies `numel * element_size` raw bytes into the tensor's storage
    /// at its byte offset, treating the destination as contiguous.
    ///
    /// Host sources only; the copy goes through a host-to-device memcpy
    /// when the tensor lives on an accelerator.
    pub fn load(&mut self, src: &[u8]) -> Result<(), TensorError> {
        let expected = self.numel() * self.element_size();
        if src.len() != expected {
            return Err(TensorError::Precondition {
                op: "load",
                detail: format!("source has {} bytes, tensor needs {expected}", src.len()),
            });
        }
        if self.byte_offset + expected > self.storage.size() {
            return Err(TensorError::Internal {
                op: "load",
                detail: "destination span exceeds storage size",
            });
        }

        if self.device_kind() == DeviceKind::Cpu {
            // SAFETY: span checked against storage size above; src is a
            // live slice of exactly `expected` bytes.
            unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.data_mut(), expected) };
        } else {
            let ctx = context();
            ctx.set_device(self.device_kind(), self.device_id())?;
            // SAFETY: as above; dst is device memory owned by this storage.
            unsafe {
                ctx.runtime(self.device_kind())?.memcpy_sync(
                    self.data_mut(),
                    src.as_ptr(),
                    expected,
                    MemcpyDirection::HostToDevice,
                )?;
            }
        }
        Ok(())
    }

    // ── Debugging ──────────────────────────────────────────────────

    /// One-line description: shape, strides, dtype, device.
    pub fn info(&self) -> String {
        format!(
            "Tensor: shape {:?} strides {:?} dtype={} device={}:{}",
            self.shape,
            self.strides,
            self.dtype,
            self.device_kind().as_str(),
            self.device_id()
        )
    }

    /// Synchronizes the device, prints [`Tensor::info`], then prints every
    /// element in shape order (one line per innermost row).
    ///
    /// Half-precision values are promoted to `f32` for display.
    /// Accelerator tensors are staged through a host copy first.
    pub fn debug(&self) -> Result<(), TensorError> {
        context().synchronize(self.device_kind())?;
        println!("{}", self.info());

        let staged;
        let host = if self.device_kind() == DeviceKind::Cpu {
            self
        } else {
            staged = self.to(DeviceKind::Cpu, 0)?;
            &staged
        };

        match host.dtype {
            DType::Byte => host.dump(|v: i8| v.to_string()),
            DType::Bool => host.dump(|v: bool| v.to_string()),
            DType::I8 => host.dump(|v: i8| v.to_string()),
            DType::I16 => host.dump(|v: i16| v.to_string()),
            DType::I32 => host.dump(|v: i32| v.to_string()),
            DType::I64 => host.dump(|v: i64| v.to_string()),
            DType::U8 => host.dump(|v: u8| v.to_string()),
            DType::U16 => host.dump(|v: u16| v.to_string()),
            DType::U32 => host.dump(|v: u32| v.to_string()),
            DType::U64 => host.dump(|v: u64| v.to_string()),
            DType::F16 => host.dump(|v: half::f16| v.to_f32().to_string()),
            DType::BF16 => host.dump(|v: half::bf16| v.to_f32().to_string()),
            DType::F32 => host.dump(|v: f32| v.to_string()),
            DType::F64 => host.dump(|v: f64| v.to_string()),
        }
        Ok(())
    }

    fn dump<T: Copy>(&self, format: impl Fn(T) -> String) {
        fn walk<T: Copy, F: Fn(T) -> String>(
            base: *const u8,
            shape: &[usize],
            strides: &[isize],
            esize: usize,
            dim: usize,
            format: &F,
            line: &mut String,
        ) {
            if shape.is_empty() {
                // SAFETY: rank-0 tensors hold exactly one element at base.
                let v = unsafe { std::ptr::read_unaligned(base as *const T) };
                println!("{}", format(v));
                return;
            }
            if dim == shape.len() - 1 {
                line.clear();
                for i in 0..shape[dim] {
                    let off = i as isize * strides[dim] * esize as isize;
                    // SAFETY: every in-shape index stays inside storage.
                    let v = unsafe { std::ptr::read_unaligned(base.offset(off) as *const T) };
                    line.push_str(&format(v));
                    line.push(' ');
                }
                println!("{}", line.trim_end());
            } else {
                for i in 0..shape[dim] {
                    let off = i as isize * strides[dim] * esize as isize;
                    // SAFETY: as above.
                    let child = unsafe { base.offset(off) };
                    walk(child, shape, strides, esize, dim + 1, format, line);
                }
            }
        }

        let mut line = String::new();
        walk(
            self.data(),
            &self.shape,
            &self.strides,
            self.element_size(),
            0,
            &format,
            &mut line,
        );
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("byte_offset", &self.byte_offset)
            .field("device", &(self.device_kind(), self.device_id()))
            .finish()
    }
}
