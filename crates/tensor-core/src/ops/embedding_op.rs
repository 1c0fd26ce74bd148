// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Embedding table lookup.

use super::{check_contiguous, check_cpu, check_rank, check_same_device, check_same_dtype};
use crate::{DType, Element, Tensor, TensorError};

/// Gathers rows of `weight` into `out`: `out[b, :] = weight[index[b], :]`.
///
/// `index` is a 1-D `i64` tensor of token ids, `weight` is the
/// `[vocab, embed]` table, and `out` is `[index.numel(), embed]` with the
/// weight's dtype. An out-of-range id (negative or ≥ vocab) writes a zero
/// row rather than failing — callers that need bounds errors must check
/// beforehand.
///
/// # Errors
/// Returns [`TensorError::UnsupportedDType`] for dtypes outside
/// `{f32, f16, bf16}`, and precondition errors for rank, shape, dtype,
/// device, or contiguity violations.
pub fn embedding(out: &mut Tensor, index: &Tensor, weight: &Tensor) -> Result<(), TensorError> {
    const OP: &str = "embedding";

    check_same_device(OP, &[out, index, weight])?;
    check_cpu(OP, out)?;
    check_contiguous(OP, &[out, index, weight])?;
    check_rank(OP, index, 1)?;
    check_rank(OP, weight, 2)?;
    check_rank(OP, out, 2)?;

    if index.dtype() != DType::I64 {
        return Err(TensorError::DTypeMismatch {
            op: OP,
            lhs: DType::I64,
            rhs: index.dtype(),
        });
    }
    check_same_dtype(OP, &[out, weight])?;

    let expected = [index.numel(), weight.shape()[1]];
    super::check_shape(OP, out, &expected)?;

    match out.dtype() {
        DType::F32 => gather_rows::<f32>(out, index, weight),
        DType::F16 => gather_rows::<half::f16>(out, index, weight),
        DType::BF16 => gather_rows::<half::bf16>(out, index, weight),
        dtype => Err(TensorError::UnsupportedDType { op: OP, dtype }),
    }
}

fn gather_rows<T: Element>(
    out: &mut Tensor,
    index: &Tensor,
    weight: &Tensor,
) -> Result<(), TensorError> {
    let ids = index.as_slice::<i64>()?;
    let vocab = weight.shape()[0] as i64;
    let embed = weight.shape()[1];
    let table = weight.as_slice::<T>()?;
    let dst = out.as_slice_mut::<T>()?;

    for (b, &id) in ids.iter().enumerate() {
        let row = &mut dst[b * embed..(b + 1) * embed];
        if id < 0 || id >= vocab {
            row.fill(T::ZERO);
        } else {
            let start = id as usize * embed;
            row.copy_from_slice(&table[start..start + embed]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_runtime::DeviceKind;

    #[test]
    fn test_embedding_gathers_rows() {
        let weight =
            Tensor::from_slice(&[3, 2], &[1.0f32, 1.0, 2.0, 2.0, 3.0, 3.0]).unwrap();
        let index = Tensor::from_slice(&[4], &[0i64, 2, -1, 1]).unwrap();
        let mut out = Tensor::create(&[4, 2], DType::F32, DeviceKind::Cpu, 0).unwrap();

        embedding(&mut out, &index, &weight).unwrap();

        assert_eq!(
            out.as_slice::<f32>().unwrap(),
            &[1.0, 1.0, 3.0, 3.0, 0.0, 0.0, 2.0, 2.0]
        );
    }

    #[test]
    fn test_embedding_out_of_range_zero_fills() {
        let weight = Tensor::from_slice(&[2, 3], &[5.0f32; 6]).unwrap();
        let index = Tensor::from_slice(&[2], &[-1i64, 2]).unwrap();
        let mut out = Tensor::create(&[2, 3], DType::F32, DeviceKind::Cpu, 0).unwrap();

        embedding(&mut out, &index, &weight).unwrap();

        assert_eq!(out.as_slice::<f32>().unwrap(), &[0.0; 6]);
    }

    #[test]
    fn test_embedding_half_precision() {
        let weight = Tensor::from_slice(
            &[2, 2],
            &[
                half::f16::from_f32(1.5),
                half::f16::from_f32(-2.0),
                half::f16::from_f32(0.25),
                half::f16::from_f32(8.0),
            ],
        )
        .unwrap();
        let index = Tensor::from_slice(&[2], &[1i64, 0]).unwrap();
        let mut out = Tensor::create(&[2, 2], DType::F16, DeviceKind::Cpu, 0).unwrap();

        embedding(&mut out, &index, &weight).unwrap();

        let got: Vec<f32> = out
            .as_slice::<half::f16>()
            .unwrap()
            .iter()
            .map(|v| v.to_f32())
            .collect();
        assert_eq!(got, vec![0.25, 8.0, 1.5, -2.0]);
    }

    #[test]
    fn test_embedding_requires_i64_index() {
        let weight = Tensor::from_slice(&[2, 2], &[0.0f32; 4]).unwrap();
        let index = Tensor::from_slice(&[1], &[0i32]).unwrap();
        let mut out = Tensor::create(&[1, 2], DType::F32, DeviceKind::Cpu, 0).unwrap();

        let result = embedding(&mut out, &index, &weight);
        assert!(matches!(result, Err(TensorError::DTypeMismatch { .. })));
    }

    #[test]
    fn test_embedding_shape_mismatch() {
        let weight = Tensor::from_slice(&[2, 2], &[0.0f32; 4]).unwrap();
        let index = Tensor::from_slice(&[3], &[0i64, 1, 0]).unwrap();
        let mut out = Tensor::create(&[2, 2], DType::F32, DeviceKind::Cpu, 0).unwrap();

        let result = embedding(&mut out, &index, &weight);
        assert!(matches!(result, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_embedding_rejects_unsupported_dtype() {
        let weight = Tensor::from_slice(&[2, 2], &[0i32; 4]).unwrap();
        let index = Tensor::from_slice(&[1], &[0i64]).unwrap();
        let mut out = Tensor::create(&[1, 2], DType::I32, DeviceKind::Cpu, 0).unwrap();

        let result = embedding(&mut out, &index, &weight);
        assert!(matches!(
            result,
            Err(TensorError::UnsupportedDType { dtype: DType::I32, .. })
        ));
    }
}
