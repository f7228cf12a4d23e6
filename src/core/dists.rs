//! Categorical distribution primitives.
//!
//! The latent state and discrete policies both use factorized categorical
//! distributions. Everything here operates on 2D `[rows, classes]` tensors;
//! callers with `[batch, groups, classes]` shapes reshape down to rows first.
//!
//! Sampling happens on the CPU via cumulative sums over the probability rows
//! (cheap at these sizes, and keeps the draw under an explicit `fastrand::Rng`
//! so rollouts can be replayed deterministically).

use burn::prelude::*;
use burn::tensor::activation::softmax;

const EPS: f32 = 1e-8;

/// Blend categorical probabilities with the uniform distribution.
///
/// `(1 - ratio) * softmax(logits) + ratio / classes`. A small uniform floor
/// keeps log-probs finite and KL terms bounded. `ratio = 0` is plain softmax.
pub fn unimix_probs<B: Backend>(logits: Tensor<B, 2>, ratio: f32) -> Tensor<B, 2> {
    let classes = logits.dims()[1];
    let probs = softmax(logits, 1);
    if ratio == 0.0 {
        return probs;
    }
    probs.mul_scalar(1.0 - ratio).add_scalar(ratio / classes as f32)
}

/// Draw one category per row, returned as a one-hot `[rows, classes]` tensor.
///
/// The result carries no gradient; wrap it with [`straight_through`] when the
/// sample must pass gradients back to the probabilities.
pub fn sample_onehot<B: Backend>(
    probs: Tensor<B, 2>,
    rng: &mut fastrand::Rng,
    device: &B::Device,
) -> Tensor<B, 2> {
    let [rows, classes] = probs.dims();
    let data = probs.to_data();
    let p = data.as_slice::<f32>().expect("contiguous f32 probability data");

    let mut out = vec![0.0f32; rows * classes];
    for r in 0..rows {
        let u = rng.f32();
        let mut cumsum = 0.0;
        let mut selected = classes - 1;
        for c in 0..classes {
            cumsum += p[r * classes + c];
            // Last class catches float error when rows don't sum exactly to 1.
            if u < cumsum || c == classes - 1 {
                selected = c;
                break;
            }
        }
        out[r * classes + selected] = 1.0;
    }

    Tensor::<B, 1>::from_floats(out.as_slice(), device).reshape([rows, classes])
}

/// Most likely category per row as a one-hot `[rows, classes]` tensor.
pub fn mode_onehot<B: Backend>(probs: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
    let [rows, classes] = probs.dims();
    let data = probs.to_data();
    let p = data.as_slice::<f32>().expect("contiguous f32 probability data");

    let mut out = vec![0.0f32; rows * classes];
    for r in 0..rows {
        let mut best = 0;
        for c in 1..classes {
            if p[r * classes + c] > p[r * classes + best] {
                best = c;
            }
        }
        out[r * classes + best] = 1.0;
    }

    Tensor::<B, 1>::from_floats(out.as_slice(), device).reshape([rows, classes])
}

/// Straight-through estimator: forward value is the one-hot sample, gradient
/// flows through the probabilities.
pub fn straight_through<B: Backend>(onehot: Tensor<B, 2>, probs: Tensor<B, 2>) -> Tensor<B, 2> {
    onehot - probs.clone().detach() + probs
}

/// Log-probability of one-hot selections under `probs`: `[rows]`.
pub fn log_prob<B: Backend>(probs: Tensor<B, 2>, onehot: Tensor<B, 2>) -> Tensor<B, 1> {
    let rows = probs.dims()[0];
    ((probs + EPS).log() * onehot).sum_dim(1).reshape([rows])
}

/// Entropy per row: `[rows]`.
pub fn entropy<B: Backend>(probs: Tensor<B, 2>) -> Tensor<B, 1> {
    let rows = probs.dims()[0];
    let log_probs = (probs.clone() + EPS).log();
    (probs * log_probs).sum_dim(1).reshape([rows]).neg()
}

/// KL divergence `KL(p || q)` per row: `[rows]`.
pub fn kl_divergence<B: Backend>(p: Tensor<B, 2>, q: Tensor<B, 2>) -> Tensor<B, 1> {
    let rows = p.dims()[0];
    let log_ratio = (p.clone() + EPS).log() - (q + EPS).log();
    (p * log_ratio).sum_dim(1).reshape([rows])
}
