//! Recurrent state-space model.
//!
//! The latent state has two parts: a deterministic recurrent vector `deter`
//! carried by a GRU, and a stochastic sample `stoch` drawn from a factorized
//! categorical distribution (`groups` independent categoricals of `classes`
//! each). The prior predicts the next latent from the previous latent and
//! action alone; the posterior additionally conditions on the encoded
//! observation. Training pulls the two together through a balanced KL.
//!
//! Stochastic samples use the straight-through estimator: the forward value
//! is a one-hot draw, the gradient flows through the (unimix-blended)
//! probabilities.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};

use crate::core::dists;

// ============================================================================
// Latent state containers
// ============================================================================

/// Latent state for a flat batch of `N` environments or sequence slots.
#[derive(Debug, Clone)]
pub struct LatentState<B: Backend> {
    /// Stochastic one-hot sample: `[N, groups, classes]`.
    pub stoch: Tensor<B, 3>,
    /// Categorical logits that produced `stoch`: `[N, groups, classes]`.
    pub logits: Tensor<B, 3>,
    /// Deterministic recurrent vector: `[N, deter_dim]`.
    pub deter: Tensor<B, 2>,
}

impl<B: Backend> LatentState<B> {
    /// Feature vector for heads and policies: `[N, groups*classes + deter]`.
    pub fn feat(&self) -> Tensor<B, 2> {
        let [n, g, c] = self.stoch.dims();
        Tensor::cat(vec![self.stoch.clone().reshape([n, g * c]), self.deter.clone()], 1)
    }

    /// Detach every tensor from the autodiff graph.
    pub fn detach(&self) -> Self {
        Self {
            stoch: self.stoch.clone().detach(),
            logits: self.logits.clone().detach(),
            deter: self.deter.clone().detach(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.deter.dims()[0]
    }
}

/// Latent states over a `[batch, time]` grid, stacked along dim 1.
#[derive(Debug, Clone)]
pub struct LatentSeq<B: Backend> {
    /// `[B, T, groups, classes]`.
    pub stoch: Tensor<B, 4>,
    /// `[B, T, groups, classes]`.
    pub logits: Tensor<B, 4>,
    /// `[B, T, deter_dim]`.
    pub deter: Tensor<B, 3>,
}

impl<B: Backend> LatentSeq<B> {
    /// Stack per-timestep states into a sequence.
    pub fn from_steps(steps: Vec<LatentState<B>>) -> Self {
        assert!(!steps.is_empty(), "cannot stack an empty state sequence");
        let stoch = Tensor::stack(steps.iter().map(|s| s.stoch.clone()).collect(), 1);
        let logits = Tensor::stack(steps.iter().map(|s| s.logits.clone()).collect(), 1);
        let deter = Tensor::stack(steps.iter().map(|s| s.deter.clone()).collect(), 1);
        Self {
            stoch,
            logits,
            deter,
        }
    }

    /// Feature sequence: `[B, T, groups*classes + deter]`.
    pub fn feat(&self) -> Tensor<B, 3> {
        let [b, t, g, c] = self.stoch.dims();
        Tensor::cat(
            vec![self.stoch.clone().reshape([b, t, g * c]), self.deter.clone()],
            2,
        )
    }

    /// Collapse `[B, T]` into a flat batch of `B*T` seed states.
    pub fn flatten(&self) -> LatentState<B> {
        let [b, t, g, c] = self.stoch.dims();
        let d = self.deter.dims()[2];
        LatentState {
            stoch: self.stoch.clone().reshape([b * t, g, c]),
            logits: self.logits.clone().reshape([b * t, g, c]),
            deter: self.deter.clone().reshape([b * t, d]),
        }
    }

    /// Detach every tensor from the autodiff graph.
    pub fn detach(&self) -> Self {
        Self {
            stoch: self.stoch.clone().detach(),
            logits: self.logits.clone().detach(),
            deter: self.deter.clone().detach(),
        }
    }

    /// Extract the state at time index `step`.
    pub fn step(&self, step: usize) -> LatentState<B> {
        let [b, t, g, c] = self.stoch.dims();
        let d = self.deter.dims()[2];
        assert!(step < t, "step {step} out of range for sequence length {t}");
        LatentState {
            stoch: self
                .stoch
                .clone()
                .slice([0..b, step..step + 1, 0..g, 0..c])
                .reshape([b, g, c]),
            logits: self
                .logits
                .clone()
                .slice([0..b, step..step + 1, 0..g, 0..c])
                .reshape([b, g, c]),
            deter: self
                .deter
                .clone()
                .slice([0..b, step..step + 1, 0..d])
                .reshape([b, d]),
        }
    }

    /// `(B, T)` leading shape.
    pub fn dims(&self) -> (usize, usize) {
        let [b, t, _, _] = self.stoch.dims();
        (b, t)
    }
}

/// KL loss between posterior and prior sequences.
pub struct KlLoss<B: Backend> {
    /// Scaled, balanced, free-bits-clamped loss (scalar tensor).
    pub loss: Tensor<B, 1>,
    /// Unclamped dynamics KL mean, for metrics.
    pub dyn_value: f32,
    /// Unclamped representation KL mean, for metrics.
    pub rep_value: f32,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct RssmConfig {
    pub action_dim: usize,
    pub embed_dim: usize,
    pub deter_dim: usize,
    pub hidden_dim: usize,
    pub stoch_groups: usize,
    pub stoch_classes: usize,
    pub unimix_ratio: f32,
    pub kl_free: f32,
    pub kl_balance: f32,
    pub kl_scale: f32,
}

impl RssmConfig {
    pub fn new(action_dim: usize, embed_dim: usize) -> Self {
        Self {
            action_dim,
            embed_dim,
            deter_dim: 512,
            hidden_dim: 512,
            stoch_groups: 32,
            stoch_classes: 32,
            unimix_ratio: 0.01,
            kl_free: 1.0,
            kl_balance: 0.8,
            kl_scale: 1.0,
        }
    }

    pub fn with_deter_dim(mut self, deter_dim: usize) -> Self {
        self.deter_dim = deter_dim;
        self
    }

    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn with_stoch(mut self, groups: usize, classes: usize) -> Self {
        self.stoch_groups = groups;
        self.stoch_classes = classes;
        self
    }

    pub fn with_unimix_ratio(mut self, ratio: f32) -> Self {
        self.unimix_ratio = ratio;
        self
    }

    pub fn with_kl(mut self, free: f32, balance: f32, scale: f32) -> Self {
        self.kl_free = free;
        self.kl_balance = balance;
        self.kl_scale = scale;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Rssm<B> {
        let stoch_flat = self.stoch_groups * self.stoch_classes;
        Rssm {
            img_in: LinearConfig::new(stoch_flat + self.action_dim, self.hidden_dim).init(device),
            reset_input: LinearConfig::new(self.hidden_dim, self.deter_dim).init(device),
            reset_hidden: LinearConfig::new(self.deter_dim, self.deter_dim)
                .with_bias(false)
                .init(device),
            update_input: LinearConfig::new(self.hidden_dim, self.deter_dim).init(device),
            update_hidden: LinearConfig::new(self.deter_dim, self.deter_dim)
                .with_bias(false)
                .init(device),
            candidate_input: LinearConfig::new(self.hidden_dim, self.deter_dim).init(device),
            candidate_hidden: LinearConfig::new(self.deter_dim, self.deter_dim)
                .with_bias(false)
                .init(device),
            img_out: LinearConfig::new(self.deter_dim, self.hidden_dim).init(device),
            img_logits: LinearConfig::new(self.hidden_dim, stoch_flat).init(device),
            obs_out: LinearConfig::new(self.deter_dim + self.embed_dim, self.hidden_dim)
                .init(device),
            obs_logits: LinearConfig::new(self.hidden_dim, stoch_flat).init(device),
            action_dim: self.action_dim,
            deter_dim: self.deter_dim,
            stoch_groups: self.stoch_groups,
            stoch_classes: self.stoch_classes,
            unimix_ratio: self.unimix_ratio,
            kl_free: self.kl_free,
            kl_balance: self.kl_balance,
            kl_scale: self.kl_scale,
        }
    }
}

// ============================================================================
// Module
// ============================================================================

#[derive(Module, Debug)]
pub struct Rssm<B: Backend> {
    img_in: Linear<B>,
    // GRU gates over the deterministic vector:
    //   r = σ(W_ir x + W_hr h), z = σ(W_iz x + W_hz h)
    //   n = tanh(W_in x + r ⊙ (W_hn h)), h' = (1 - z) ⊙ n + z ⊙ h
    reset_input: Linear<B>,
    reset_hidden: Linear<B>,
    update_input: Linear<B>,
    update_hidden: Linear<B>,
    candidate_input: Linear<B>,
    candidate_hidden: Linear<B>,
    img_out: Linear<B>,
    img_logits: Linear<B>,
    obs_out: Linear<B>,
    obs_logits: Linear<B>,
    #[module(skip)]
    action_dim: usize,
    #[module(skip)]
    deter_dim: usize,
    #[module(skip)]
    stoch_groups: usize,
    #[module(skip)]
    stoch_classes: usize,
    #[module(skip)]
    unimix_ratio: f32,
    #[module(skip)]
    kl_free: f32,
    #[module(skip)]
    kl_balance: f32,
    #[module(skip)]
    kl_scale: f32,
}

impl<B: Backend> Rssm<B> {
    pub fn feat_dim(&self) -> usize {
        self.deter_dim + self.stoch_groups * self.stoch_classes
    }

    pub fn deter_dim(&self) -> usize {
        self.deter_dim
    }

    pub fn stoch_shape(&self) -> (usize, usize) {
        (self.stoch_groups, self.stoch_classes)
    }

    /// Initial state: zero deterministic vector, uniform categorical sample
    /// placeholder (each class carries `1 / classes` mass), zero logits.
    pub fn initial(&self, batch: usize, device: &B::Device) -> LatentState<B> {
        let (g, c) = (self.stoch_groups, self.stoch_classes);
        LatentState {
            stoch: Tensor::ones([batch, g, c], device).div_scalar(c as f32),
            logits: Tensor::zeros([batch, g, c], device),
            deter: Tensor::zeros([batch, self.deter_dim], device),
        }
    }

    /// Unimix-blended probabilities for `[N, groups, classes]` logits.
    pub fn stoch_probs(&self, logits: Tensor<B, 3>) -> Tensor<B, 3> {
        let [n, g, c] = logits.dims();
        dists::unimix_probs(logits.reshape([n * g, c]), self.unimix_ratio).reshape([n, g, c])
    }

    /// Straight-through one-hot sample from `[N, groups, classes]` logits.
    fn sample_stoch(
        &self,
        logits: Tensor<B, 3>,
        rng: &mut fastrand::Rng,
        device: &B::Device,
    ) -> Tensor<B, 3> {
        let [n, g, c] = logits.dims();
        let probs = dists::unimix_probs(logits.reshape([n * g, c]), self.unimix_ratio);
        let onehot = dists::sample_onehot(probs.clone(), rng, device);
        dists::straight_through(onehot, probs).reshape([n, g, c])
    }

    /// Mode (argmax one-hot) from `[N, groups, classes]` logits.
    fn mode_stoch(&self, logits: Tensor<B, 3>, device: &B::Device) -> Tensor<B, 3> {
        let [n, g, c] = logits.dims();
        let probs = dists::unimix_probs(logits.reshape([n * g, c]), self.unimix_ratio);
        let onehot = dists::mode_onehot(probs.clone(), device);
        dists::straight_through(onehot, probs).reshape([n, g, c])
    }

    fn deter_step(&self, x: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let r = sigmoid(self.reset_input.forward(x.clone()) + self.reset_hidden.forward(h.clone()));
        let z = sigmoid(self.update_input.forward(x.clone()) + self.update_hidden.forward(h.clone()));
        let n = (self.candidate_input.forward(x) + r * self.candidate_hidden.forward(h.clone())).tanh();
        let ones = Tensor::ones_like(&z);
        (ones - z.clone()) * n + z * h
    }

    /// One prior step: predict the next latent from state and action alone.
    pub fn img_step(
        &self,
        prev: &LatentState<B>,
        action: Tensor<B, 2>,
        rng: &mut fastrand::Rng,
    ) -> LatentState<B> {
        let device = action.device();
        let [n, g, c] = prev.stoch.dims();
        assert_eq!(
            action.dims(),
            [n, self.action_dim],
            "action shape mismatch in prior step"
        );

        let x = Tensor::cat(vec![prev.stoch.clone().reshape([n, g * c]), action], 1);
        let x = relu(self.img_in.forward(x));
        let deter = self.deter_step(x, prev.deter.clone());

        let stats = relu(self.img_out.forward(deter.clone()));
        let logits = self
            .img_logits
            .forward(stats)
            .reshape([n, self.stoch_groups, self.stoch_classes]);
        let stoch = self.sample_stoch(logits.clone(), rng, &device);

        LatentState {
            stoch,
            logits,
            deter,
        }
    }

    /// One posterior step. Wherever `is_first` is set, the previous state and
    /// action are masked back to the initial state before stepping.
    ///
    /// Returns `(posterior, prior)` for the timestep.
    pub fn obs_step(
        &self,
        prev: &LatentState<B>,
        prev_action: Tensor<B, 2>,
        embed: Tensor<B, 2>,
        is_first: Tensor<B, 1>,
        rng: &mut fastrand::Rng,
    ) -> (LatentState<B>, LatentState<B>) {
        let device = embed.device();
        let n = prev.batch_size();
        assert_eq!(is_first.dims(), [n], "is_first shape mismatch");

        let keep2 = is_first.clone().neg().add_scalar(1.0).reshape([n, 1]);
        let keep3 = keep2.clone().reshape([n, 1, 1]);
        let reset3 = is_first.reshape([n, 1, 1]);

        let init = self.initial(n, &device);
        let prev = LatentState {
            stoch: prev.stoch.clone() * keep3.clone() + init.stoch * reset3,
            logits: prev.logits.clone() * keep3,
            deter: prev.deter.clone() * keep2.clone(),
        };
        let prev_action = prev_action * keep2;

        let prior = self.img_step(&prev, prev_action, rng);

        let x = Tensor::cat(vec![prior.deter.clone(), embed], 1);
        let stats = relu(self.obs_out.forward(x));
        let logits = self
            .obs_logits
            .forward(stats)
            .reshape([n, self.stoch_groups, self.stoch_classes]);
        let stoch = self.sample_stoch(logits.clone(), rng, &device);

        let post = LatentState {
            stoch,
            logits,
            deter: prior.deter.clone(),
        };
        (post, prior)
    }

    /// Filter a whole sequence: fold [`Self::obs_step`] over the time axis.
    ///
    /// `embed` is `[B, T, embed_dim]`, `action` is `[B, T, action_dim]`
    /// (the action that *led into* each timestep), `is_first` is `[B, T]`.
    /// Returns posterior and prior sequences of shape `[B, T, ...]`.
    pub fn observe(
        &self,
        embed: Tensor<B, 3>,
        action: Tensor<B, 3>,
        is_first: Tensor<B, 2>,
        start: &LatentState<B>,
        rng: &mut fastrand::Rng,
    ) -> (LatentSeq<B>, LatentSeq<B>) {
        let [b, t, e] = embed.dims();
        assert_eq!(&action.dims()[..2], &[b, t], "action leading shape mismatch");
        assert_eq!(is_first.dims(), [b, t], "is_first shape mismatch");
        assert_eq!(start.batch_size(), b, "start state batch mismatch");

        let mut posts = Vec::with_capacity(t);
        let mut priors = Vec::with_capacity(t);
        let mut state = start.clone();

        for step in 0..t {
            let embed_t = embed
                .clone()
                .slice([0..b, step..step + 1, 0..e])
                .reshape([b, e]);
            let action_t = action
                .clone()
                .slice([0..b, step..step + 1, 0..self.action_dim])
                .reshape([b, self.action_dim]);
            let is_first_t = is_first
                .clone()
                .slice([0..b, step..step + 1])
                .reshape([b]);

            let (post, prior) = self.obs_step(&state, action_t, embed_t, is_first_t, rng);
            state = post.clone();
            posts.push(post);
            priors.push(prior);
        }

        (LatentSeq::from_steps(posts), LatentSeq::from_steps(priors))
    }

    /// Single-step posterior for environment interaction (no prior returned).
    ///
    /// `sample` selects between drawing the stochastic state and taking its
    /// mode (evaluation).
    pub fn infer_step(
        &self,
        prev: &LatentState<B>,
        prev_action: Tensor<B, 2>,
        embed: Tensor<B, 2>,
        is_first: Tensor<B, 1>,
        sample: bool,
        rng: &mut fastrand::Rng,
    ) -> LatentState<B> {
        let device = embed.device();
        let (post, _) = self.obs_step(prev, prev_action, embed, is_first, rng);
        if sample {
            post
        } else {
            LatentState {
                stoch: self.mode_stoch(post.logits.clone(), &device),
                logits: post.logits,
                deter: post.deter,
            }
        }
    }

    /// Balanced KL between posterior and prior sequences.
    ///
    /// The representation term pulls the posterior toward a frozen prior, the
    /// dynamics term pulls the prior toward a frozen posterior. Each per-slot
    /// KL (summed over groups) is clamped below at `kl_free` before averaging.
    pub fn kl_loss(&self, post: &LatentSeq<B>, prior: &LatentSeq<B>) -> KlLoss<B> {
        let [b, t, g, c] = post.logits.dims();
        let rows = b * t * g;

        let post_probs =
            dists::unimix_probs(post.logits.clone().reshape([rows, c]), self.unimix_ratio);
        let prior_probs =
            dists::unimix_probs(prior.logits.clone().reshape([rows, c]), self.unimix_ratio);

        // Sum per-group KLs into one value per (batch, time) slot.
        let rep = dists::kl_divergence(post_probs.clone(), prior_probs.clone().detach())
            .reshape([b * t, g])
            .sum_dim(1)
            .reshape([b * t]);
        let dynamics = dists::kl_divergence(post_probs.detach(), prior_probs)
            .reshape([b * t, g])
            .sum_dim(1)
            .reshape([b * t]);

        let dyn_value = scalar_mean(&dynamics);
        let rep_value = scalar_mean(&rep);

        let dyn_loss = dynamics.clamp_min(self.kl_free).mean();
        let rep_loss = rep.clamp_min(self.kl_free).mean();

        let loss = (dyn_loss.mul_scalar(self.kl_balance)
            + rep_loss.mul_scalar(1.0 - self.kl_balance))
        .mul_scalar(self.kl_scale);

        KlLoss {
            loss,
            dyn_value,
            rep_value,
        }
    }

    /// Mean categorical entropy over a logits sequence, for metrics.
    pub fn entropy_mean(&self, logits: &Tensor<B, 4>) -> f32 {
        let [b, t, g, c] = logits.dims();
        let probs = dists::unimix_probs(logits.clone().reshape([b * t * g, c]), self.unimix_ratio);
        scalar_mean(&dists::entropy(probs))
    }
}

fn scalar_mean<B: Backend>(values: &Tensor<B, 1>) -> f32 {
    values
        .clone()
        .detach()
        .mean()
        .into_data()
        .as_slice::<f32>()
        .expect("contiguous f32 scalar data")[0]
}
