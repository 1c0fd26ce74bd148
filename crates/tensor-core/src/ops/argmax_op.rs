// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Flat argmax reduction.

use super::{check_contiguous, check_cpu, check_same_device};
use crate::{DType, Element, Tensor, TensorError};

/// Scans every element of `vals` in storage order and writes the smallest
/// index achieving the maximum into `max_idx` (`i64`, one element) and
/// the corresponding value into `max_val` (same dtype as `vals`, one
/// element).
///
/// Shape is ignored beyond `numel`; ties resolve to the earliest index.
/// Comparison is a raw `>`, so NaN values never replace the running
/// maximum — a NaN after index 0 is silently ignored, a NaN at index 0
/// propagates.
///
/// # Errors
/// Returns [`TensorError::UnsupportedDType`] for dtypes outside
/// `{f32, f16, bf16, i32, i64}`, and precondition errors for empty input,
/// wrong result shapes, dtype, device, or contiguity violations.
pub fn argmax(max_idx: &mut Tensor, max_val: &mut Tensor, vals: &Tensor) -> Result<(), TensorError> {
    const OP: &str = "argmax";

    check_same_device(OP, &[vals, max_idx, max_val])?;
    check_cpu(OP, vals)?;
    check_contiguous(OP, &[vals, max_idx, max_val])?;

    if vals.numel() == 0 {
        return Err(TensorError::Precondition {
            op: OP,
            detail: "input tensor is empty".into(),
        });
    }
    if max_idx.numel() != 1 || max_val.numel() != 1 {
        return Err(TensorError::Precondition {
            op: OP,
            detail: "result tensors must hold exactly one element".into(),
        });
    }
    if max_idx.dtype() != DType::I64 {
        return Err(TensorError::DTypeMismatch {
            op: OP,
            lhs: DType::I64,
            rhs: max_idx.dtype(),
        });
    }
    if max_val.dtype() != vals.dtype() {
        return Err(TensorError::DTypeMismatch {
            op: OP,
            lhs: vals.dtype(),
            rhs: max_val.dtype(),
        });
    }

    match vals.dtype() {
        DType::F32 => scan::<f32>(max_idx, max_val, vals),
        DType::F16 => scan::<half::f16>(max_idx, max_val, vals),
        DType::BF16 => scan::<half::bf16>(max_idx, max_val, vals),
        DType::I32 => scan::<i32>(max_idx, max_val, vals),
        DType::I64 => scan::<i64>(max_idx, max_val, vals),
        dtype => Err(TensorError::UnsupportedDType { op: OP, dtype }),
    }
}

fn scan<T: Element + PartialOrd>(
    max_idx: &mut Tensor,
    max_val: &mut Tensor,
    vals: &Tensor,
) -> Result<(), TensorError> {
    let data = vals.as_slice::<T>()?;

    let mut best = data[0];
    let mut best_idx = 0usize;
    for (i, &v) in data.iter().enumerate().skip(1) {
        if v > best {
            best = v;
            best_idx = i;
        }
    }

    max_val.as_slice_mut::<T>()?[0] = best;
    max_idx.as_slice_mut::<i64>()?[0] = best_idx as i64;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_runtime::DeviceKind;

    fn results(dtype: DType) -> (Tensor, Tensor) {
        let idx = Tensor::create(&[1], DType::I64, DeviceKind::Cpu, 0).unwrap();
        let val = Tensor::create(&[1], dtype, DeviceKind::Cpu, 0).unwrap();
        (idx, val)
    }

    #[test]
    fn test_argmax_basic() {
        let vals = Tensor::from_slice(&[8], &[3.0f32, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0]).unwrap();
        let (mut idx, mut val) = results(DType::F32);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], 5);
        assert_eq!(val.as_slice::<f32>().unwrap()[0], 9.0);
    }

    #[test]
    fn test_argmax_increasing_sequence() {
        let n = 16;
        let data: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let vals = Tensor::from_slice(&[n], &data).unwrap();
        let (mut idx, mut val) = results(DType::F32);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], (n - 1) as i64);
        assert_eq!(val.as_slice::<f32>().unwrap()[0], (n - 1) as f32);
    }

    #[test]
    fn test_argmax_ties_take_earliest() {
        let vals = Tensor::from_slice(&[4], &[7.0f32, 7.0, 7.0, 7.0]).unwrap();
        let (mut idx, mut val) = results(DType::F32);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], 0);
        assert_eq!(val.as_slice::<f32>().unwrap()[0], 7.0);
    }

    #[test]
    fn test_argmax_ignores_shape() {
        // Storage-order scan over a [2, 3] tensor.
        let vals = Tensor::from_slice(&[2, 3], &[0.0f32, 8.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        let (mut idx, mut val) = results(DType::F32);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], 1);
    }

    #[test]
    fn test_argmax_i64() {
        let vals = Tensor::from_slice(&[4], &[-10i64, 500, 499, -3]).unwrap();
        let (mut idx, mut val) = results(DType::I64);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], 1);
        assert_eq!(val.as_slice::<i64>().unwrap()[0], 500);
    }

    #[test]
    fn test_argmax_i32() {
        let vals = Tensor::from_slice(&[3], &[5i32, -2, 5]).unwrap();
        let (mut idx, mut val) = results(DType::I32);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], 0);
        assert_eq!(val.as_slice::<i32>().unwrap()[0], 5);
    }

    #[test]
    fn test_argmax_f16() {
        let data: Vec<half::f16> = [1.0f32, 3.5, 2.0]
            .iter()
            .map(|&v| half::f16::from_f32(v))
            .collect();
        let vals = Tensor::from_slice(&[3], &data).unwrap();
        let (mut idx, mut val) = results(DType::F16);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], 1);
        assert_eq!(val.as_slice::<half::f16>().unwrap()[0].to_f32(), 3.5);
    }

    #[test]
    fn test_argmax_nan_after_start_is_ignored() {
        let vals = Tensor::from_slice(&[3], &[1.0f32, f32::NAN, 2.0]).unwrap();
        let (mut idx, mut val) = results(DType::F32);

        argmax(&mut idx, &mut val, &vals).unwrap();

        assert_eq!(idx.as_slice::<i64>().unwrap()[0], 2);
        assert_eq!(val.as_slice::<f32>().unwrap()[0], 2.0);
    }

    #[test]
    fn test_argmax_empty_input() {
        let vals = Tensor::create(&[0], DType::F32, DeviceKind::Cpu, 0).unwrap();
        let (mut idx, mut val) = results(DType::F32);

        let result = argmax(&mut idx, &mut val, &vals);
        assert!(matches!(result, Err(TensorError::Precondition { .. })));
    }

    #[test]
    fn test_argmax_requires_i64_index_tensor() {
        let vals = Tensor::from_slice(&[2], &[1.0f32, 2.0]).unwrap();
        let mut idx = Tensor::create(&[1], DType::I32, DeviceKind::Cpu, 0).unwrap();
        let mut val = Tensor::create(&[1], DType::F32, DeviceKind::Cpu, 0).unwrap();

        let result = argmax(&mut idx, &mut val, &vals);
        assert!(matches!(result, Err(TensorError::DTypeMismatch { .. })));
    }

    #[test]
    fn test_argmax_rejects_unsupported_dtype() {
        let vals = Tensor::from_slice(&[2], &[1u8, 2]).unwrap();
        let mut idx = Tensor::create(&[1], DType::I64, DeviceKind::Cpu, 0).unwrap();
        let mut val = Tensor::create(&[1], DType::U8, DeviceKind::Cpu, 0).unwrap();

        let result = argmax(&mut idx, &mut val, &vals);
        assert!(matches!(
            result,
            Err(TensorError::UnsupportedDType { dtype: DType::U8, .. })
        ));
    }
}
