//! Lambda-return targets over imagined rollouts.
//!
//! Computed as a backward recursion over the horizon:
//!
//! ```text
//! target[t] = reward[t] + discount[t] * ((1 - λ) * value[t+1] + λ * target[t+1])
//! target[H] = value[H]
//! ```
//!
//! λ = 0 reduces to one-step bootstrapping, λ = 1 to discounted Monte Carlo
//! with a terminal value. All tensors are per-slot `[N]` vectors; the caller
//! keeps one tensor per horizon step.

use burn::prelude::*;

/// Backward lambda-return recursion.
///
/// `rewards` and `discounts` have `H` entries, `values` has `H + 1` (the
/// extra entry is the bootstrap value past the horizon). Returns `H` targets,
/// one per reward.
pub fn lambda_return<B: Backend>(
    rewards: &[Tensor<B, 1>],
    values: &[Tensor<B, 1>],
    discounts: &[Tensor<B, 1>],
    lambda: f32,
) -> Vec<Tensor<B, 1>> {
    let horizon = rewards.len();
    assert_eq!(
        values.len(),
        horizon + 1,
        "values must have one bootstrap entry past the horizon"
    );
    assert_eq!(discounts.len(), horizon, "one discount per reward");
    assert!(horizon > 0, "empty horizon");

    let mut targets = vec![values[horizon].clone(); horizon];
    let mut last = values[horizon].clone();

    for t in (0..horizon).rev() {
        let bootstrap =
            values[t + 1].clone().mul_scalar(1.0 - lambda) + last.clone().mul_scalar(lambda);
        last = rewards[t].clone() + discounts[t].clone() * bootstrap;
        targets[t] = last.clone();
    }

    targets
}

/// Cumulative discount weights for loss weighting.
///
/// `weights[0] = 1` and `weights[t] = weights[t-1] * discounts[t-1]`, so
/// steps after a predicted termination stop contributing. Same length as
/// `discounts`.
pub fn cumulative_weights<B: Backend>(discounts: &[Tensor<B, 1>]) -> Vec<Tensor<B, 1>> {
    assert!(!discounts.is_empty(), "empty discount sequence");
    let mut weights = Vec::with_capacity(discounts.len());
    weights.push(Tensor::ones_like(&discounts[0]));
    for t in 1..discounts.len() {
        let prev: &Tensor<B, 1> = &weights[t - 1];
        weights.push(prev.clone() * discounts[t - 1].clone());
    }
    weights
}
