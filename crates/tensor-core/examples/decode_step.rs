// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: one greedy decode step through a toy transformer block.
//!
//! Demonstrates the operator surface end to end: embedding lookup,
//! RMS normalization, QKV projection, rotary embedding, grouped-query
//! attention, the SwiGLU MLP, and a final argmax over the logits.
//!
//! ```bash
//! cargo run -p tensor-core --example decode_step
//! ```

use anyhow::Result;
use device_runtime::DeviceKind;
use tensor_core::{
    argmax, embedding, linear, rms_norm, rope, self_attention, swiglu, DType, Tensor,
};

/// Deterministic pseudo-random weights in [-0.5, 0.5).
fn fill(n: usize, seed: u32) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = (i as u32).wrapping_mul(2654435761).wrapping_add(seed);
            ((x >> 16) & 0xFF) as f32 / 256.0 - 0.5
        })
        .collect()
}

fn zeros(shape: &[usize]) -> Result<Tensor> {
    Ok(Tensor::create(shape, DType::F32, DeviceKind::Cpu, 0)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let vocab = 32;
    let hidden = 8;
    let heads = 2;
    let head_dim = hidden / heads;
    let ff = 16;
    let seq = 4;

    // Toy weights.
    let embed_table = Tensor::from_slice(&[vocab, hidden], &fill(vocab * hidden, 1))?;
    let norm_gain = Tensor::from_slice(&[hidden], &vec![1.0f32; hidden])?;
    let wq = Tensor::from_slice(&[hidden, hidden], &fill(hidden * hidden, 2))?;
    let wk = Tensor::from_slice(&[hidden, hidden], &fill(hidden * hidden, 3))?;
    let wv = Tensor::from_slice(&[hidden, hidden], &fill(hidden * hidden, 4))?;
    let w_gate = Tensor::from_slice(&[ff, hidden], &fill(ff * hidden, 5))?;
    let w_up = Tensor::from_slice(&[ff, hidden], &fill(ff * hidden, 6))?;
    let w_down = Tensor::from_slice(&[hidden, ff], &fill(hidden * ff, 7))?;
    let lm_head = Tensor::from_slice(&[vocab, hidden], &fill(vocab * hidden, 8))?;

    let tokens = Tensor::from_slice(&[seq], &[3i64, 17, 9, 28])?;
    let positions = Tensor::from_slice(&[seq], &[0i64, 1, 2, 3])?;

    // Embed and normalize.
    let mut x = zeros(&[seq, hidden])?;
    embedding(&mut x, &tokens, &embed_table)?;
    let mut normed = zeros(&[seq, hidden])?;
    rms_norm(&mut normed, &x, &norm_gain, 1e-5)?;

    // Project to Q/K/V and rotate.
    let mut q = zeros(&[seq, hidden])?;
    let mut k = zeros(&[seq, hidden])?;
    let mut v = zeros(&[seq, hidden])?;
    linear(&mut q, &normed, &wq, None)?;
    linear(&mut k, &normed, &wk, None)?;
    linear(&mut v, &normed, &wv, None)?;

    let q3 = q.view(&[seq, heads, head_dim])?;
    let k3 = k.view(&[seq, heads, head_dim])?;
    let mut q_rot = zeros(&[seq, heads, head_dim])?;
    let mut k_rot = zeros(&[seq, heads, head_dim])?;
    rope(&mut q_rot, &q3, &positions, 10000.0)?;
    rope(&mut k_rot, &k3, &positions, 10000.0)?;

    // Causal attention over the in-batch cache.
    let v3 = v.view(&[seq, heads, head_dim])?;
    let mut attn = zeros(&[seq, heads, head_dim])?;
    self_attention(&mut attn, &q_rot, &k_rot, &v3, 1.0 / (head_dim as f32).sqrt())?;

    // SwiGLU MLP on the attention output.
    let attn2 = attn.view(&[seq, hidden])?;
    let mut gate = zeros(&[seq, ff])?;
    let mut up = zeros(&[seq, ff])?;
    linear(&mut gate, &attn2, &w_gate, None)?;
    linear(&mut up, &attn2, &w_up, None)?;
    let mut activated = zeros(&[seq, ff])?;
    swiglu(&mut activated, &gate, &up)?;
    let mut block_out = zeros(&[seq, hidden])?;
    linear(&mut block_out, &activated, &w_down, None)?;

    // Greedy next-token pick from the last position.
    let last = block_out.slice(0, seq - 1, seq)?;
    let mut logits = zeros(&[1, vocab])?;
    linear(&mut logits, &last, &lm_head, None)?;

    let flat = logits.view(&[vocab])?;
    let mut next = Tensor::create(&[1], DType::I64, DeviceKind::Cpu, 0)?;
    let mut best = zeros(&[1])?;
    argmax(&mut next, &mut best, &flat)?;

    println!("logits:");
    flat.debug()?;
    println!(
        "next token: {} (logit {:.4})",
        next.as_slice::<i64>()?[0],
        best.as_slice::<f32>()?[0]
    );
    Ok(())
}
