// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: operator laws across dtypes, and a full decode
//! step composing every kernel the way an inference loop would.

use device_runtime::DeviceKind;
use half::{bf16, f16};
use tensor_core::{argmax, embedding, linear, rms_norm, rope, self_attention, swiglu};
use tensor_core::{DType, Tensor};

// ── Helpers ────────────────────────────────────────────────────

fn f32s(t: &Tensor) -> Vec<f32> {
    match t.dtype() {
        DType::F32 => t.as_slice::<f32>().unwrap().to_vec(),
        DType::F16 => t.as_slice::<f16>().unwrap().iter().map(|v| v.to_f32()).collect(),
        DType::BF16 => t.as_slice::<bf16>().unwrap().iter().map(|v| v.to_f32()).collect(),
        other => panic!("unexpected dtype {other:?}"),
    }
}

fn tensor_of(dtype: DType, shape: &[usize], values: &[f32]) -> Tensor {
    match dtype {
        DType::F32 => Tensor::from_slice(shape, values).unwrap(),
        DType::F16 => {
            let halves: Vec<f16> = values.iter().copied().map(f16::from_f32).collect();
            Tensor::from_slice(shape, &halves).unwrap()
        }
        DType::BF16 => {
            let halves: Vec<bf16> = values.iter().copied().map(bf16::from_f32).collect();
            Tensor::from_slice(shape, &halves).unwrap()
        }
        other => panic!("unexpected dtype {other:?}"),
    }
}

fn out_of(dtype: DType, shape: &[usize]) -> Tensor {
    Tensor::create(shape, dtype, DeviceKind::Cpu, 0).unwrap()
}

const FLOAT_DTYPES: [DType; 3] = [DType::F32, DType::F16, DType::BF16];

// ── rms_norm ───────────────────────────────────────────────────

#[test]
fn rms_norm_is_scale_invariant_across_dtypes() {
    let base = [0.5f32, -1.0, 0.75, 0.25];
    let weight_vals = [1.0f32, 0.5, 2.0, 1.5];

    for dtype in FLOAT_DTYPES {
        let weight = tensor_of(dtype, &[4], &weight_vals);
        let scaled: Vec<f32> = base.iter().map(|v| v * 4.0).collect();

        let mut out_a = out_of(dtype, &[1, 4]);
        let mut out_b = out_of(dtype, &[1, 4]);
        rms_norm(&mut out_a, &tensor_of(dtype, &[1, 4], &base), &weight, 0.0).unwrap();
        rms_norm(&mut out_b, &tensor_of(dtype, &[1, 4], &scaled), &weight, 0.0).unwrap();

        // Scaling by exactly 4 is lossless in every float dtype, so the
        // normalized rows agree to narrowing precision.
        let tol = match dtype {
            DType::F32 => 1e-6,
            DType::F16 => 4e-3,
            _ => 2e-2,
        };
        for (a, b) in f32s(&out_a).iter().zip(f32s(&out_b).iter()) {
            assert!((a - b).abs() <= tol, "{dtype:?}: {a} vs {b}");
        }
    }
}

#[test]
fn rms_norm_unit_row_scenario() {
    let input = Tensor::from_slice(&[1, 4], &[1.0f32; 4]).unwrap();
    let weight = Tensor::from_slice(&[4], &[1.0f32; 4]).unwrap();
    let mut out = out_of(DType::F32, &[1, 4]);

    rms_norm(&mut out, &input, &weight, 0.0).unwrap();

    assert_eq!(out.as_slice::<f32>().unwrap(), &[1.0; 4]);
}

// ── linear ─────────────────────────────────────────────────────

#[test]
fn linear_without_bias_is_linear_across_dtypes() {
    let weight_vals = [0.5f32, -0.25, 1.0, 0.125, 0.75, -0.5];
    let x = [1.0f32, -2.0, 0.5];
    let y = [0.25f32, 1.0, -1.0];
    let (a, b) = (2.0f32, 0.5f32);

    for dtype in FLOAT_DTYPES {
        let weight = tensor_of(dtype, &[2, 3], &weight_vals);

        let run = |vals: &[f32]| -> Vec<f32> {
            let input = tensor_of(dtype, &[1, 3], vals);
            let mut out = out_of(dtype, &[1, 2]);
            linear(&mut out, &input, &weight, None).unwrap();
            f32s(&out)
        };

        let combined: Vec<f32> = x.iter().zip(&y).map(|(xv, yv)| a * xv + b * yv).collect();
        let fx = run(&x);
        let fy = run(&y);
        let fc = run(&combined);

        // Inputs were chosen exactly representable in every dtype; the
        // error left is kernel accumulation plus one narrowing of each
        // side of the comparison.
        let tol = match dtype {
            DType::F32 => 1e-5,
            DType::F16 => 8e-3,
            _ => 6e-2,
        };
        for o in 0..2 {
            let expected = a * fx[o] + b * fy[o];
            assert!(
                (fc[o] - expected).abs() <= tol,
                "{dtype:?}: {} vs {expected}",
                fc[o]
            );
        }
    }
}

#[test]
fn linear_projection_scenario() {
    let input = Tensor::from_slice(&[1, 2], &[1.0f32, 2.0]).unwrap();
    let weight = Tensor::from_slice(&[3, 2], &[1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
    let mut out = out_of(DType::F32, &[1, 3]);

    linear(&mut out, &input, &weight, None).unwrap();

    assert_eq!(out.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0]);
}

// ── rope ───────────────────────────────────────────────────────

#[test]
fn rope_at_position_zero_is_identity_for_all_dtypes() {
    let values = [0.5f32, -0.25, 2.0, 1.5];
    let pos = Tensor::from_slice(&[1], &[0i64]).unwrap();

    for dtype in FLOAT_DTYPES {
        let input = tensor_of(dtype, &[1, 1, 4], &values);
        let mut out = out_of(dtype, &[1, 1, 4]);
        rope(&mut out, &input, &pos, 10000.0).unwrap();
        // cos(0)=1, sin(0)=0 — exact in every dtype.
        assert_eq!(f32s(&out), f32s(&input), "{dtype:?}");
    }
}

// ── self_attention ─────────────────────────────────────────────

#[test]
fn attention_zero_scale_is_causal_mean_of_values() {
    // seq = 3, total = 5 → query qp sees qp + 3 cached positions.
    let seq = 3;
    let total = 5;
    let d = 2;
    let q = Tensor::from_slice(&[seq, 1, d], &[1.0f32; 6]).unwrap();
    let k = Tensor::from_slice(&[total, 1, d], &[0.5f32; 10]).unwrap();
    let v_vals: Vec<f32> = (0..total * d).map(|i| i as f32).collect();
    let v = Tensor::from_slice(&[total, 1, d], &v_vals).unwrap();
    let mut attn = out_of(DType::F32, &[seq, 1, d]);

    self_attention(&mut attn, &q, &k, &v, 0.0).unwrap();

    let got = attn.as_slice::<f32>().unwrap();
    for qp in 0..seq {
        let context = qp + (total - seq) + 1;
        for i in 0..d {
            let mean = (0..context).map(|kp| v_vals[kp * d + i]).sum::<f32>() / context as f32;
            let idx = qp * d + i;
            assert!(
                (got[idx] - mean).abs() < 1e-5,
                "qp={qp} i={i}: {} vs {mean}",
                got[idx]
            );
        }
    }
}

// ── swiglu / argmax / embedding laws ───────────────────────────

#[test]
fn swiglu_zero_gate_is_zero_for_all_dtypes() {
    for dtype in FLOAT_DTYPES {
        let gate = tensor_of(dtype, &[1, 4], &[0.0f32; 4]);
        let up = tensor_of(dtype, &[1, 4], &[3.0f32, -7.0, 0.5, 100.0]);
        let mut out = out_of(dtype, &[1, 4]);

        swiglu(&mut out, &gate, &up).unwrap();

        assert_eq!(f32s(&out), vec![0.0; 4], "{dtype:?}");
    }
}

#[test]
fn argmax_constant_sequence_takes_index_zero() {
    let vals = Tensor::from_slice(&[5], &[2.5f32; 5]).unwrap();
    let mut idx = out_of_i64();
    let mut val = out_of(DType::F32, &[1]);

    argmax(&mut idx, &mut val, &vals).unwrap();

    assert_eq!(idx.as_slice::<i64>().unwrap()[0], 0);
    assert_eq!(val.as_slice::<f32>().unwrap()[0], 2.5);
}

fn out_of_i64() -> Tensor {
    Tensor::create(&[1], DType::I64, DeviceKind::Cpu, 0).unwrap()
}

#[test]
fn embedding_negative_index_yields_zero_row() {
    let weight = Tensor::from_slice(&[4, 3], &[1.0f32; 12]).unwrap();
    let index = Tensor::from_slice(&[1], &[-1i64]).unwrap();
    let mut out = out_of(DType::F32, &[1, 3]);

    embedding(&mut out, &index, &weight).unwrap();

    assert_eq!(out.as_slice::<f32>().unwrap(), &[0.0; 3]);
}

// ── Full decode step ───────────────────────────────────────────

/// Wires every kernel into one greedy decode step over a toy model:
/// embed → rms_norm → QKV projections → rope → attention → output
/// projection → SwiGLU MLP → logits → argmax.
#[test]
fn decode_step_composes_all_operators() {
    let vocab = 8;
    let hidden = 4;
    let heads = 2;
    let head_dim = hidden / heads;
    let ff = 6;

    // Deterministic pseudo-random weights, exactly representable-ish
    // small values so every dtype path would behave.
    let fill = |n: usize, seed: u32| -> Vec<f32> {
        (0..n)
            .map(|i| {
                let x = (i as u32).wrapping_mul(2654435761).wrapping_add(seed);
                ((x >> 16) & 0xFF) as f32 / 256.0 - 0.5
            })
            .collect()
    };

    let embed_table = Tensor::from_slice(&[vocab, hidden], &fill(vocab * hidden, 1)).unwrap();
    let norm_gain = Tensor::from_slice(&[hidden], &vec![1.0f32; hidden]).unwrap();
    let wq = Tensor::from_slice(&[hidden, hidden], &fill(hidden * hidden, 2)).unwrap();
    let wk = Tensor::from_slice(&[hidden, hidden], &fill(hidden * hidden, 3)).unwrap();
    let wv = Tensor::from_slice(&[hidden, hidden], &fill(hidden * hidden, 4)).unwrap();
    let wo = Tensor::from_slice(&[hidden, hidden], &fill(hidden * hidden, 5)).unwrap();
    let w_gate = Tensor::from_slice(&[ff, hidden], &fill(ff * hidden, 6)).unwrap();
    let w_up = Tensor::from_slice(&[ff, hidden], &fill(ff * hidden, 7)).unwrap();
    let w_down = Tensor::from_slice(&[hidden, ff], &fill(hidden * ff, 8)).unwrap();
    let lm_head = Tensor::from_slice(&[vocab, hidden], &fill(vocab * hidden, 9)).unwrap();

    let seq = 3;
    let tokens = Tensor::from_slice(&[seq], &[1i64, 4, 2]).unwrap();
    let positions = Tensor::from_slice(&[seq], &[0i64, 1, 2]).unwrap();

    // Embed.
    let mut x = out_of(DType::F32, &[seq, hidden]);
    embedding(&mut x, &tokens, &embed_table).unwrap();

    // Pre-attention norm.
    let mut normed = out_of(DType::F32, &[seq, hidden]);
    rms_norm(&mut normed, &x, &norm_gain, 1e-5).unwrap();

    // QKV.
    let mut q = out_of(DType::F32, &[seq, hidden]);
    let mut k = out_of(DType::F32, &[seq, hidden]);
    let mut v = out_of(DType::F32, &[seq, hidden]);
    linear(&mut q, &normed, &wq, None).unwrap();
    linear(&mut k, &normed, &wk, None).unwrap();
    linear(&mut v, &normed, &wv, None).unwrap();

    // Rotate Q and K in [seq, heads, head_dim] layout.
    let q3 = q.view(&[seq, heads, head_dim]).unwrap();
    let k3 = k.view(&[seq, heads, head_dim]).unwrap();
    let mut q_rot = out_of(DType::F32, &[seq, heads, head_dim]);
    let mut k_rot = out_of(DType::F32, &[seq, heads, head_dim]);
    rope(&mut q_rot, &q3, &positions, 10000.0).unwrap();
    rope(&mut k_rot, &k3, &positions, 10000.0).unwrap();

    // Attention (cache == current sequence).
    let v3 = v.view(&[seq, heads, head_dim]).unwrap();
    let mut attn = out_of(DType::F32, &[seq, heads, head_dim]);
    let scale = 1.0 / (head_dim as f32).sqrt();
    self_attention(&mut attn, &q_rot, &k_rot, &v3, scale).unwrap();

    // Output projection + MLP on the last position.
    let attn2 = attn.view(&[seq, hidden]).unwrap();
    let mut projected = out_of(DType::F32, &[seq, hidden]);
    linear(&mut projected, &attn2, &wo, None).unwrap();

    let mut gate = out_of(DType::F32, &[seq, ff]);
    let mut up = out_of(DType::F32, &[seq, ff]);
    linear(&mut gate, &projected, &w_gate, None).unwrap();
    linear(&mut up, &projected, &w_up, None).unwrap();

    let mut activated = out_of(DType::F32, &[seq, ff]);
    swiglu(&mut activated, &gate, &up).unwrap();

    let mut mlp_out = out_of(DType::F32, &[seq, hidden]);
    linear(&mut mlp_out, &activated, &w_down, None).unwrap();

    // Logits for the final position only.
    let last = mlp_out.slice(0, seq - 1, seq).unwrap();
    let mut logits = out_of(DType::F32, &[1, vocab]);
    linear(&mut logits, &last, &lm_head, None).unwrap();

    let flat = logits.view(&[vocab]).unwrap();
    let mut idx = out_of_i64();
    let mut val = out_of(DType::F32, &[1]);
    argmax(&mut idx, &mut val, &flat).unwrap();

    // The pipeline must be deterministic and produce a valid token id
    // whose logit matches the reported maximum.
    let token = idx.as_slice::<i64>().unwrap()[0];
    assert!((0..vocab as i64).contains(&token));
    let logit_vals = flat.as_slice::<f32>().unwrap();
    let max = logit_vals.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    assert_eq!(val.as_slice::<f32>().unwrap()[0], max);
    assert_eq!(logit_vals[token as usize], max);
    assert!(logit_vals.iter().all(|v| v.is_finite()));
}
