// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Strided tensors and transformer inference operator kernels.
//!
//! This crate provides:
//! - [`Tensor`] — an n-dimensional strided view over reference-counted
//!   [`device_runtime::Storage`], with `permute`/`view`/`slice`/
//!   `contiguous`/`to` and raw `load`/`debug`.
//! - [`DType`] and [`Element`] — the closed element-type registry and the
//!   scalar promotion rules (`f16`/`bf16` compute at `f32`).
//! - The operator kernels: [`embedding`], [`rms_norm`], [`linear`],
//!   [`rope`], [`self_attention`], [`swiglu`], [`argmax`].
//!
//! # Design Goals
//! - Callers allocate outputs; kernels never allocate tensors.
//! - Strides are element counts, offsets are bytes, and the conversion
//!   between the two lives in one place.
//! - Clean error types via `thiserror`; every failure names the operator
//!   and the violated condition.

mod dtype;
mod error;
mod ops;
mod tensor;

pub use dtype::{DType, Element};
pub use error::TensorError;
pub use ops::{argmax, embedding, linear, rms_norm, rope, self_attention, swiglu};
pub use tensor::Tensor;
