//! Policy network and its output distribution.
//!
//! One network covers both action spaces. Discrete actions use a categorical
//! with a unimix floor and straight-through one-hot samples, so the sampled
//! action can feed the latent dynamics while gradients reach the logits.
//! Continuous actions use a diagonal Gaussian with reparameterized samples,
//! so gradients flow through the sample itself.

use burn::prelude::*;
use burn::tensor::activation::softplus;

use crate::config::ActionSpace;
use crate::core::dists;

use super::mlp::{Mlp, MlpConfig};

const MIN_STD: f32 = 0.1;
const LN_SQRT_2PI: f32 = 0.918_938_5;

#[derive(Debug, Clone)]
pub struct ActorNetConfig {
    pub feat_dim: usize,
    pub hidden_dim: usize,
    pub action_space: ActionSpace,
    pub unimix_ratio: f32,
}

impl ActorNetConfig {
    pub fn new(feat_dim: usize, hidden_dim: usize, action_space: ActionSpace) -> Self {
        Self {
            feat_dim,
            hidden_dim,
            action_space,
            unimix_ratio: 0.01,
        }
    }

    pub fn with_unimix_ratio(mut self, ratio: f32) -> Self {
        self.unimix_ratio = ratio;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorNet<B> {
        let out_dim = match self.action_space {
            ActionSpace::Discrete(n) => n,
            // Mean and raw std per dimension.
            ActionSpace::Continuous(d) => 2 * d,
        };
        ActorNet {
            net: MlpConfig::new(self.feat_dim, self.hidden_dim, out_dim).init(device),
            discrete: self.action_space.is_discrete(),
            action_dim: self.action_space.action_dim(),
            unimix_ratio: self.unimix_ratio,
        }
    }
}

#[derive(Module, Debug)]
pub struct ActorNet<B: Backend> {
    net: Mlp<B>,
    #[module(skip)]
    discrete: bool,
    #[module(skip)]
    action_dim: usize,
    #[module(skip)]
    unimix_ratio: f32,
}

impl<B: Backend> ActorNet<B> {
    /// `[batch, feat_dim]` to the policy distribution for each row.
    pub fn forward(&self, feat: Tensor<B, 2>) -> PolicyDist<B> {
        let out = self.net.forward(feat);
        if self.discrete {
            let probs = dists::unimix_probs(out.clone(), self.unimix_ratio);
            PolicyDist::Categorical { probs }
        } else {
            let n = out.dims()[0];
            let d = self.action_dim;
            let mean = out.clone().slice([0..n, 0..d]);
            let raw_std = out.slice([0..n, d..2 * d]);
            let std = softplus(raw_std, 1.0).add_scalar(MIN_STD);
            PolicyDist::Gaussian { mean, std }
        }
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn is_discrete(&self) -> bool {
        self.discrete
    }
}

/// Policy output: one sampling/log-prob/entropy surface over both spaces.
#[derive(Debug, Clone)]
pub enum PolicyDist<B: Backend> {
    /// Unimix-blended categorical probabilities: `[batch, n_actions]`.
    Categorical { probs: Tensor<B, 2> },
    /// Diagonal Gaussian: `[batch, action_dim]` each.
    Gaussian { mean: Tensor<B, 2>, std: Tensor<B, 2> },
}

impl<B: Backend> PolicyDist<B> {
    /// Draw one action per row: `[batch, action_dim]`.
    ///
    /// Discrete actions are straight-through one-hots; continuous actions are
    /// reparameterized (`mean + std * eps`), so both keep a gradient path.
    pub fn sample(&self, rng: &mut fastrand::Rng, device: &B::Device) -> Tensor<B, 2> {
        match self {
            Self::Categorical { probs } => {
                let onehot = dists::sample_onehot(probs.clone(), rng, device);
                dists::straight_through(onehot, probs.clone())
            }
            Self::Gaussian { mean, std } => {
                let [n, d] = mean.dims();
                let eps = standard_normal::<B>(n, d, rng, device);
                mean.clone() + std.clone() * eps
            }
        }
    }

    /// Most likely action per row (evaluation): `[batch, action_dim]`.
    pub fn mode(&self, device: &B::Device) -> Tensor<B, 2> {
        match self {
            Self::Categorical { probs } => dists::mode_onehot(probs.clone(), device),
            Self::Gaussian { mean, .. } => mean.clone(),
        }
    }

    /// Log-probability of actions: `[batch]`.
    pub fn log_prob(&self, action: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Self::Categorical { probs } => dists::log_prob(probs.clone(), action),
            Self::Gaussian { mean, std } => {
                let n = mean.dims()[0];
                let z = (action - mean.clone()) / std.clone();
                let quad = (z.clone() * z).mul_scalar(0.5);
                (quad + std.clone().log().add_scalar(LN_SQRT_2PI))
                    .sum_dim(1)
                    .reshape([n])
                    .neg()
            }
        }
    }

    /// Entropy per row: `[batch]`.
    pub fn entropy(&self) -> Tensor<B, 1> {
        match self {
            Self::Categorical { probs } => dists::entropy(probs.clone()),
            Self::Gaussian { std, .. } => {
                let n = std.dims()[0];
                std.clone()
                    .log()
                    .add_scalar(0.5 + LN_SQRT_2PI)
                    .sum_dim(1)
                    .reshape([n])
            }
        }
    }
}

/// Uniformly random actions for the exploration warmup: `[batch, action_dim]`.
pub fn random_action<B: Backend>(
    batch: usize,
    space: ActionSpace,
    rng: &mut fastrand::Rng,
    device: &B::Device,
) -> Tensor<B, 2> {
    match space {
        ActionSpace::Discrete(n) => {
            let mut out = vec![0.0f32; batch * n];
            for row in 0..batch {
                out[row * n + rng.usize(0..n)] = 1.0;
            }
            Tensor::<B, 1>::from_floats(out.as_slice(), device).reshape([batch, n])
        }
        ActionSpace::Continuous(d) => {
            let out: Vec<f32> = (0..batch * d).map(|_| rng.f32() * 2.0 - 1.0).collect();
            Tensor::<B, 1>::from_floats(out.as_slice(), device).reshape([batch, d])
        }
    }
}

/// Standard normal draws via Box-Muller, under the caller's RNG.
fn standard_normal<B: Backend>(
    rows: usize,
    cols: usize,
    rng: &mut fastrand::Rng,
    device: &B::Device,
) -> Tensor<B, 2> {
    let mut out = Vec::with_capacity(rows * cols);
    while out.len() < rows * cols {
        let u1 = rng.f32().max(1e-7);
        let u2 = rng.f32();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;
        out.push(r * theta.cos());
        if out.len() < rows * cols {
            out.push(r * theta.sin());
        }
    }
    Tensor::<B, 1>::from_floats(out.as_slice(), device).reshape([rows, cols])
}
