// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Grouped-query self-attention over a KV cache.

use super::{check_contiguous, check_cpu, check_rank, check_same_device, check_same_dtype};
use crate::{DType, Element, Tensor, TensorError};

/// Causal grouped-query attention.
///
/// Shapes: `q` is `[seq, n_q_head, d]`, `k` is `[total, n_kv_head, d]`,
/// `v` is `[total, n_kv_head, dv]`, `attn` is `[seq, n_q_head, dv]`, with
/// `total ≥ seq` (the K/V tensors hold the whole cache; the final `seq`
/// positions correspond to the queries) and `n_q_head` a multiple of
/// `n_kv_head`. Query head `hq` reads KV head `hq / (n_q_head/n_kv_head)`.
///
/// For query position `qp`, only the causal context
/// `kp < min(qp + (total − seq) + 1, total)` is visited — the mask is
/// implicit. Scores are `scale · ⟨q, k⟩`, softmaxed with max subtraction;
/// a zero exponent sum yields all-zero weights. Arithmetic runs in `f32`
/// for every dtype and narrows on write.
///
/// # Errors
/// Returns [`TensorError::UnsupportedDType`] for dtypes outside
/// `{f32, f16, bf16}`, and precondition errors for rank, shape, dtype,
/// device, contiguity, head-divisibility, or `total < seq` violations.
pub fn self_attention(
    attn: &mut Tensor,
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    scale: f32,
) -> Result<(), TensorError> {
    const OP: &str = "self_attention";

    check_same_device(OP, &[attn, q, k, v])?;
    check_cpu(OP, attn)?;
    check_contiguous(OP, &[attn, q, k, v])?;
    check_rank(OP, q, 3)?;
    check_rank(OP, k, 3)?;
    check_rank(OP, v, 3)?;
    check_rank(OP, attn, 3)?;
    check_same_dtype(OP, &[attn, q, k, v])?;

    let seq_len = q.shape()[0];
    let n_q_head = q.shape()[1];
    let d = q.shape()[2];
    let total_len = k.shape()[0];
    let n_kv_head = k.shape()[1];
    let dv = v.shape()[2];

    if k.shape()[2] != d {
        return Err(TensorError::ShapeMismatch {
            op: OP,
            expected: vec![total_len, n_kv_head, d],
            actual: k.shape().to_vec(),
        });
    }
    super::check_shape(OP, v, &[total_len, n_kv_head, dv])?;
    super::check_shape(OP, attn, &[seq_len, n_q_head, dv])?;

    if n_kv_head == 0 || n_q_head % n_kv_head != 0 {
        return Err(TensorError::Precondition {
            op: OP,
            detail: format!("{n_q_head} query heads not divisible by {n_kv_head} kv heads"),
        });
    }
    if total_len < seq_len {
        return Err(TensorError::Precondition {
            op: OP,
            detail: format!("kv length {total_len} shorter than query length {seq_len}"),
        });
    }

    match attn.dtype() {
        DType::F32 => attend::<f32>(attn, q, k, v, scale),
        DType::F16 => attend::<half::f16>(attn, q, k, v, scale),
        DType::BF16 => attend::<half::bf16>(attn, q, k, v, scale),
        dtype => Err(TensorError::UnsupportedDType { op: OP, dtype }),
    }
}

fn attend<T: Element>(
    attn: &mut Tensor,
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    scale: f32,
) -> Result<(), TensorError> {
    let seq_len = q.shape()[0];
    let n_q_head = q.shape()[1];
    let d = q.shape()[2];
    let total_len = k.shape()[0];
    let n_kv_head = k.shape()[1];
    let dv = v.shape()[2];

    let group = n_q_head / n_kv_head;
    let kv_offset = total_len - seq_len;

    let q_data = q.as_slice::<T>()?;
    let k_data = k.as_slice::<T>()?;
    let v_data = v.as_slice::<T>()?;
    let out = attn.as_slice_mut::<T>()?;

    let mut q_vec = vec![0.0f32; d];
    let mut out_vec = vec![0.0f32; dv];
    let mut scores = Vec::with_capacity(total_len);

    for q_head in 0..n_q_head {
        let kv_head = q_head / group;

        for q_pos in 0..seq_len {
            let q_base = (q_pos * n_q_head + q_head) * d;
            for (i, slot) in q_vec.iter_mut().enumerate() {
                *slot = q_data[q_base + i].to_f32();
            }

            let context_len = (q_pos + kv_offset + 1).min(total_len);

            scores.clear();
            let mut max_score = f32::NEG_INFINITY;
            for k_pos in 0..context_len {
                let k_base = (k_pos * n_kv_head + kv_head) * d;
                let mut s = 0.0f32;
                for i in 0..d {
                    s += q_vec[i] * k_data[k_base + i].to_f32();
                }
                s *= scale;
                scores.push(s);
                if s > max_score {
                    max_score = s;
                }
            }

            let mut sum_exp = 0.0f32;
            for s in scores.iter_mut() {
                *s = (*s - max_score).exp();
                sum_exp += *s;
            }
            // Degenerate rows (all -inf scores) get zero weights.
            let inv_sum = if sum_exp > 0.0 { 1.0 / sum_exp } else { 0.0 };

            out_vec.fill(0.0);
            for (k_pos, &w) in scores.iter().enumerate() {
                let weight = w * inv_sum;
                let v_base = (k_pos * n_kv_head + kv_head) * dv;
                for i in 0..dv {
                    out_vec[i] += weight * v_data[v_base + i].to_f32();
                }
            }

            let out_base = (q_pos * n_q_head + q_head) * dv;
            for i in 0..dv {
                out[out_base + i] = T::from_f32(out_vec[i]);
            }
        }
    }
    Ok(())
}
