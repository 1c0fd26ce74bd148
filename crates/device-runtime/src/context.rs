// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Process-wide runtime registry and thread-local device binding.
//!
//! The [`Context`] is the single entry point through which the tensor layer
//! reaches device runtimes. It always owns the built-in [`HostRuntime`];
//! at most one accelerator runtime may be registered per process, after
//! which [`Context::active_kind`] reports `Accelerator` and host-side
//! allocations are routed through the accelerator's pinned-memory path.
//!
//! The current device is a thread-local `(kind, id)` pair, moved by
//! [`Context::set_device`]. Dispatch sites bind the current device to the
//! callee's device before issuing runtime calls.

use crate::{DeviceKind, DeviceRuntime, HostRuntime, RuntimeError};
use std::cell::Cell;
use std::sync::{Arc, OnceLock};

thread_local! {
    static CURRENT_DEVICE: Cell<(DeviceKind, i32)> = const { Cell::new((DeviceKind::Cpu, 0)) };
}

static CONTEXT: OnceLock<Context> = OnceLock::new();

/// Returns the process-wide runtime context.
pub fn context() -> &'static Context {
    CONTEXT.get_or_init(Context::new)
}

/// Registry of device runtimes plus the thread-local device binding.
pub struct Context {
    host: Arc<HostRuntime>,
    accelerator: OnceLock<Arc<dyn DeviceRuntime>>,
}

impl Context {
    fn new() -> Self {
        Self {
            host: Arc::new(HostRuntime),
            accelerator: OnceLock::new(),
        }
    }

    /// Registers the process-wide accelerator runtime.
    ///
    /// # Errors
    /// Returns [`RuntimeError::AcceleratorAlreadyRegistered`] on the second
    /// and subsequent calls: exactly one accelerator family per process.
    pub fn register_accelerator(
        &self,
        runtime: Arc<dyn DeviceRuntime>,
    ) -> Result<(), RuntimeError> {
        debug_assert_eq!(runtime.kind(), DeviceKind::Accelerator);
        self.accelerator
            .set(runtime)
            .map_err(|_| RuntimeError::AcceleratorAlreadyRegistered)?;
        tracing::info!("accelerator runtime registered");
        Ok(())
    }

    /// The runtime serving `kind`.
    ///
    /// # Errors
    /// Returns [`RuntimeError::NoAccelerator`] when asked for the
    /// accelerator and none is registered.
    pub fn runtime(&self, kind: DeviceKind) -> Result<Arc<dyn DeviceRuntime>, RuntimeError> {
        match kind {
            DeviceKind::Cpu => Ok(self.host.clone() as Arc<dyn DeviceRuntime>),
            DeviceKind::Accelerator => self
                .accelerator
                .get()
                .cloned()
                .ok_or(RuntimeError::NoAccelerator),
        }
    }

    /// The device kind new allocations default to: `Accelerator` when one
    /// is registered, `Cpu` otherwise.
    pub fn active_kind(&self) -> DeviceKind {
        if self.accelerator.get().is_some() {
            DeviceKind::Accelerator
        } else {
            DeviceKind::Cpu
        }
    }

    /// Binds the calling thread's current device to `(kind, id)`.
    pub fn set_device(&self, kind: DeviceKind, device_id: i32) -> Result<(), RuntimeError> {
        self.runtime(kind)?.set_device(device_id)?;
        CURRENT_DEVICE.with(|c| c.set((kind, device_id)));
        tracing::debug!(kind = kind.as_str(), device_id, "current device bound");
        Ok(())
    }

    /// The calling thread's current `(kind, id)` binding.
    pub fn current_device(&self) -> (DeviceKind, i32) {
        CURRENT_DEVICE.with(|c| c.get())
    }

    /// Blocks until outstanding work on `kind` completes.
    pub fn synchronize(&self, kind: DeviceKind) -> Result<(), RuntimeError> {
        self.runtime(kind)?.synchronize()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("active_kind", &self.active_kind())
            .field("current_device", &self.current_device())
            .finish()
    }
}
