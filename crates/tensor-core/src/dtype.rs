// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types and scalar conversion.
//!
//! [`DType`] is the closed set of element types a [`crate::Tensor`] can
//! hold. The [`Element`] trait ties each dtype tag to its concrete Rust
//! scalar and defines the promotion rules the operator kernels rely on:
//! half-precision values (`f16`, `bf16`) are promoted to `f32` for
//! arithmetic and narrowed on write.
//!
//! # Conversion conventions
//! - `f16` ↔ `f32` follows IEEE 754 binary16 round-to-nearest-even via the
//!   `half` crate; narrowing overflow goes to ±∞ (applied consistently —
//!   this is the one narrowing path in the crate). Subnormals are
//!   preserved.
//! - `bf16` ↔ `f32` truncates to the high 16 bits with round-to-nearest-
//!   even on narrowing (`half::bf16::from_f32`).
//! - Integer ↔ float uses Rust `as` semantics (round toward zero on
//!   float→int, saturating at the type bounds).
//! - `bool` maps `true` to 1 and any non-zero to `true`.

use half::{bf16, f16};

/// Enumerates the element types a [`crate::Tensor`] can hold.
///
/// The runtime uses `DType` to decide memory layout and which compute
/// kernel to dispatch. The set is closed and known at build time, so
/// operators match on the tag rather than going through virtual dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DType {
    /// 8-bit signed character (raw byte payloads).
    Byte,
    /// Boolean, stored as one byte.
    Bool,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer (index tensors).
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 64-bit IEEE 754 floating point.
    F64,
}

impl DType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::Byte | DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 | DType::BF16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Returns `true` for floating-point dtypes, including the 16-bit ones.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Byte => "byte",
            DType::Bool => "bool",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Rust scalar that can live inside a [`crate::Tensor`].
///
/// The `DTYPE` constant is the tag the typed accessors check against, and
/// `to_f32`/`from_f32` are the promotion rules kernels use for
/// mixed-precision arithmetic. `DType::Byte` has no `Element` impl — byte
/// tensors are raw payloads and are only interpreted at the debug-print
/// boundary.
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// The dtype tag for this scalar type.
    const DTYPE: DType;
    /// The additive identity.
    const ZERO: Self;

    /// Promotes this value to `f32` for arithmetic.
    fn to_f32(self) -> f32;
    /// Narrows an `f32` arithmetic result back to this type.
    fn from_f32(v: f32) -> Self;
}

macro_rules! impl_element_int {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = $dtype;
                const ZERO: Self = 0;

                #[inline]
                fn to_f32(self) -> f32 {
                    self as f32
                }

                #[inline]
                fn from_f32(v: f32) -> Self {
                    v as $ty
                }
            }
        )*
    };
}

impl_element_int! {
    i8 => DType::I8,
    i16 => DType::I16,
    i32 => DType::I32,
    i64 => DType::I64,
    u8 => DType::U8,
    u16 => DType::U16,
    u32 => DType::U32,
    u64 => DType::U64,
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
    const ZERO: Self = 0.0;

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;
    const ZERO: Self = 0.0;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v as f64
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;
    const ZERO: Self = f16::ZERO;

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::BF16;
    const ZERO: Self = bf16::ZERO;

    #[inline]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        bf16::from_f32(v)
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;
    const ZERO: Self = false;

    #[inline]
    fn to_f32(self) -> f32 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v != 0.0
    }
}
