// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # device-runtime
//!
//! Device providers and reference-counted storage for the tensor runtime.
//!
//! This crate provides:
//! - [`DeviceRuntime`] — the opaque provider trait: allocate, synchronous
//!   memcpy, synchronize, per-thread device binding.
//! - [`HostRuntime`] — the built-in CPU implementation.
//! - [`Storage`] — a reference-counted byte buffer tagged with its device.
//! - [`Context`] — process-wide runtime registry with a thread-local
//!   current-device selection; at most one accelerator family per process.
//!
//! # Design Goals
//! - The tensor layer never touches a driver API directly.
//! - Storage is freed exactly when the last owner drops, from any thread.
//! - All calls are synchronous; failures are fatal and propagate as
//!   [`RuntimeError`].

mod context;
mod error;
mod runtime;
mod storage;

pub use context::{context, Context};
pub use error::RuntimeError;
pub use runtime::{DeviceKind, DeviceRuntime, HostRuntime, MemcpyDirection};
pub use storage::{ReleaseFn, Storage};
