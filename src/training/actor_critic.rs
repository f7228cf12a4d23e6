//! Actor-critic training on imagined rollouts.
//!
//! Returns are lambda-return targets over the imagined horizon, discounted
//! through the world model's predicted continuation. Advantages are
//! normalized by a percentile EMA of the return batch. The critic regresses
//! two-hot targets and is regularized toward a slow copy of itself; the slow
//! copy is refreshed on a fixed call cadence.
//!
//! The policy gradient depends on the action space: discrete actors use
//! REINFORCE on the sampled-action log-probability with a detached advantage,
//! continuous actors use the reparameterized pathwise gradient, letting the
//! advantage itself carry gradients back through the dynamics into the actor.

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::config::DreamerConfig;
use crate::core::reward_ema::RewardEma;
use crate::core::target_network::mix_parameters;
use crate::models::actor::{ActorNet, ActorNetConfig};
use crate::models::heads::{TwoHotHead, TwoHotHeadConfig};

use super::imagination::ImaginedRollout;
use super::returns::{cumulative_weights, lambda_return};
use super::world_model::WorldModel;

/// Per-update actor-critic losses and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ActorCriticMetrics {
    pub actor_loss: f32,
    pub value_loss: f32,
    pub actor_entropy: f32,
    pub ema_offset: f32,
    pub ema_scale: f32,
    pub target_mean: f32,
    pub value_mean: f32,
    pub imag_reward_mean: f32,
}

/// Actor and critic with their optimizers, normalization state, and the slow
/// target value network.
pub struct ActorCritic<B: AutodiffBackend> {
    pub(crate) actor: ActorNet<B>,
    pub(crate) value: TwoHotHead<B>,
    pub(crate) slow_value: TwoHotHead<B>,
    actor_optim: OptimizerAdaptor<Adam, ActorNet<B>, B>,
    value_optim: OptimizerAdaptor<Adam, TwoHotHead<B>, B>,
    reward_ema: RewardEma,
    updates: usize,
    discrete: bool,
    discount: f32,
    return_lambda: f32,
    entropy_coef: f32,
    actor_lr: f64,
    value_lr: f64,
    slow_value_update: usize,
    slow_value_fraction: f32,
}

impl<B: AutodiffBackend> ActorCritic<B> {
    pub fn new(config: &DreamerConfig, feat_dim: usize, device: &B::Device) -> Self {
        let actor = ActorNetConfig::new(feat_dim, config.hidden_dim, config.action_space)
            .with_unimix_ratio(config.unimix_ratio)
            .init(device);
        let value_config = TwoHotHeadConfig::new(feat_dim, config.hidden_dim, config.bins);
        let value = value_config.init(device);
        // Slow copy starts equal to the online critic.
        let slow_value = mix_parameters(&value, value_config.init(device), 1.0);

        let clip = Some(burn::grad_clipping::GradientClippingConfig::Norm(
            config.grad_clip,
        ));
        Self {
            actor,
            value,
            slow_value,
            actor_optim: AdamConfig::new()
                .with_epsilon(1e-5)
                .with_grad_clipping(clip.clone())
                .init(),
            value_optim: AdamConfig::new()
                .with_epsilon(1e-5)
                .with_grad_clipping(clip)
                .init(),
            reward_ema: RewardEma::new(config.ema_decay, config.ema_percentiles),
            updates: 0,
            discrete: config.action_space.is_discrete(),
            discount: config.discount,
            return_lambda: config.return_lambda,
            entropy_coef: config.actor_entropy,
            actor_lr: config.actor_lr,
            value_lr: config.value_lr,
            slow_value_update: config.slow_value_update,
            slow_value_fraction: config.slow_value_fraction,
        }
    }

    pub fn actor(&self) -> &ActorNet<B> {
        &self.actor
    }

    pub fn reward_ema(&self) -> &RewardEma {
        &self.reward_ema
    }

    /// One actor step and one critic step from an imagined rollout.
    ///
    /// The rollout must have at least 2 entries (one transition). Rewards and
    /// continuations are read from the world model's heads.
    pub fn train(
        &mut self,
        world: &WorldModel<B>,
        rollout: &ImaginedRollout<B>,
    ) -> ActorCriticMetrics {
        let horizon = rollout.horizon();
        assert!(horizon >= 2, "rollout too short for a return target");
        let n = rollout.feats[0].dims()[0];

        // Predicted rewards for each imagined transition (entries 1..H).
        let rewards: Vec<Tensor<B, 1>> = (1..horizon)
            .map(|t| world.reward.decode(rollout.feats[t].clone()))
            .collect();

        // Slow-network values bootstrap the return targets; discounts come
        // through the predicted continuation.
        let values: Vec<Tensor<B, 1>> = rollout
            .feats
            .iter()
            .map(|f| self.slow_value.decode(f.clone()))
            .collect();
        let discounts: Vec<Tensor<B, 1>> = rollout
            .feats
            .iter()
            .map(|f| world.cont.prob(f.clone()).mul_scalar(self.discount))
            .collect();

        let targets = lambda_return(
            &rewards,
            &values,
            &discounts[1..],
            self.return_lambda,
        );
        let weights: Vec<Tensor<B, 1>> = cumulative_weights(&discounts)
            .into_iter()
            .map(|w| w.detach())
            .collect();

        // Percentile normalization of the flattened return batch.
        let mut flat = Vec::with_capacity((horizon - 1) * n);
        for target in &targets {
            let data = target.clone().detach().into_data();
            flat.extend_from_slice(
                data.as_slice::<f32>().expect("contiguous f32 target data"),
            );
        }
        let (offset, scale) = self.reward_ema.update(&flat);

        // Advantage base is the online critic's estimate, not the slow
        // network's; the slow network only supplies bootstrap values and the
        // regularizer target.
        let base: Vec<Tensor<B, 1>> = rollout.feats[..horizon - 1]
            .iter()
            .map(|f| self.value.decode(f.clone()).detach())
            .collect();

        // Advantage per transition: normalized target minus normalized base.
        let advantages: Vec<Tensor<B, 1>> = targets
            .iter()
            .zip(base.iter())
            .map(|(target, value)| {
                (target.clone().sub_scalar(offset) - value.clone().sub_scalar(offset))
                    .div_scalar(scale)
            })
            .collect();

        // One forward over all transitions at once.
        let m = (horizon - 1) * n;
        let feats_in = Tensor::cat(rollout.feats[..horizon - 1].to_vec(), 0);
        let actions_in = Tensor::cat(rollout.actions[..horizon - 1].to_vec(), 0);
        let adv_in: Tensor<B, 1> = Tensor::cat(advantages, 0);
        let weights_in: Tensor<B, 1> = Tensor::cat(weights[..horizon - 1].to_vec(), 0);
        let targets_in: Tensor<B, 1> = Tensor::cat(targets.clone(), 0).detach();
        assert_eq!(feats_in.dims()[0], m, "flattened rollout size mismatch");

        // ====================================================================
        // Actor update
        // ====================================================================
        let dist = self.actor.forward(feats_in.clone().detach());
        let entropy = dist.entropy();
        let objective = if self.discrete {
            dist.log_prob(actions_in.detach()) * adv_in.clone().detach()
        } else {
            adv_in.clone()
        };
        let actor_loss = ((objective + entropy.clone().mul_scalar(self.entropy_coef))
            * weights_in.clone())
        .mean()
        .neg();

        let grads = actor_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.actor);
        self.actor = self
            .actor_optim
            .step(self.actor_lr, self.actor.clone(), grads);

        // ====================================================================
        // Critic update
        // ====================================================================
        let value_logits = self.value.logits(feats_in.clone().detach());
        let nll_target =
            TwoHotHead::nll_logits_per_row(value_logits.clone(), targets_in.clone());
        let slow_pred = self.slow_value.decode(feats_in.detach()).detach();
        let nll_slow = TwoHotHead::nll_logits_per_row(value_logits, slow_pred);
        let value_loss = ((nll_target + nll_slow) * weights_in).mean();

        let grads = value_loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.value);
        self.value = self
            .value_optim
            .step(self.value_lr, self.value.clone(), grads);

        self.updates += 1;
        if self.updates % self.slow_value_update == 0 {
            self.slow_value = mix_parameters(
                &self.value,
                self.slow_value.clone(),
                self.slow_value_fraction,
            );
        }

        ActorCriticMetrics {
            actor_loss: scalar(&actor_loss),
            value_loss: scalar(&value_loss),
            actor_entropy: scalar(&entropy.mean()),
            ema_offset: offset,
            ema_scale: scale,
            target_mean: scalar(&targets_in.mean()),
            value_mean: mean_of(&base),
            imag_reward_mean: mean_of(&rewards),
        }
    }

    pub fn updates(&self) -> usize {
        self.updates
    }
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone()
        .detach()
        .into_data()
        .as_slice::<f32>()
        .expect("contiguous f32 scalar data")[0]
}

fn mean_of<B: Backend>(tensors: &[Tensor<B, 1>]) -> f32 {
    let sum: f32 = tensors.iter().map(|t| scalar(&t.clone().mean())).sum();
    sum / tensors.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::config::ActionSpace;
    use crate::training::imagination::Imagination;

    type AB = Autodiff<NdArray<f32>>;

    fn run_updates(action_space: ActionSpace, updates: usize) -> Vec<ActorCriticMetrics> {
        let config = DreamerConfig::tiny(6, action_space);
        let device = Default::default();

        let world = WorldModel::<AB>::init(&config, &device);
        let mut ac = ActorCritic::<AB>::new(&config, config.feat_dim(), &device);
        let mut imagination = Imagination::new(config.seed);

        let mut out = Vec::new();
        for _ in 0..updates {
            let start = world.rssm.initial(8, &device);
            let actor = ac.actor.clone();
            let rollout = imagination.rollout(
                &world.rssm,
                |f| actor.forward(f),
                start,
                config.imag_horizon,
                &device,
            );
            out.push(ac.train(&world, &rollout));
            imagination.reset();
        }
        out
    }

    #[test]
    fn test_discrete_updates_produce_finite_losses() {
        for metrics in run_updates(ActionSpace::Discrete(3), 3) {
            assert!(metrics.actor_loss.is_finite());
            assert!(metrics.value_loss.is_finite());
            assert!(metrics.actor_entropy > 0.0);
            assert!(metrics.ema_scale >= 1.0);
        }
    }

    #[test]
    fn test_continuous_updates_produce_finite_losses() {
        for metrics in run_updates(ActionSpace::Continuous(2), 3) {
            assert!(metrics.actor_loss.is_finite());
            assert!(metrics.value_loss.is_finite());
            assert!(metrics.ema_scale >= 1.0);
        }
    }

    #[test]
    fn test_advantage_base_comes_from_online_critic() {
        let config = DreamerConfig::tiny(6, ActionSpace::Discrete(3));
        let device = Default::default();
        let world = WorldModel::<AB>::init(&config, &device);

        // Two trainers sharing actor and slow network but with independently
        // initialized online critics. Identical rollouts must still produce
        // different actor losses, because the advantage baseline is read from
        // the online critic.
        let a = ActorCritic::<AB>::new(&config, config.feat_dim(), &device);
        let mut b = ActorCritic::<AB>::new(&config, config.feat_dim(), &device);
        b.actor = a.actor.clone();
        b.slow_value = a.slow_value.clone();

        let start = world.rssm.initial(8, &device);
        let rollout_with = |seed: u64, actor: &crate::models::actor::ActorNet<AB>| {
            let mut imagination = Imagination::new(seed);
            let rollout = imagination.rollout(
                &world.rssm,
                |f| actor.forward(f),
                start.clone(),
                config.imag_horizon,
                &device,
            );
            imagination.reset();
            rollout
        };

        let rollout_a = rollout_with(5, &a.actor);
        let rollout_b = rollout_with(5, &b.actor);

        let mut a = a;
        let ma = a.train(&world, &rollout_a);
        let mb = b.train(&world, &rollout_b);

        // Targets and EMA state match (both read the shared slow network),
        // so any difference can only come through the baseline.
        assert!((ma.target_mean - mb.target_mean).abs() < 1e-5);
        assert!(
            (ma.actor_loss - mb.actor_loss).abs() > 1e-6,
            "actor loss must depend on the online critic's baseline"
        );
        assert!(
            (ma.value_mean - mb.value_mean).abs() > 1e-6,
            "reported value mean must come from the online critic"
        );
    }

    #[test]
    fn test_slow_network_cadence() {
        let mut config = DreamerConfig::tiny(6, ActionSpace::Discrete(3));
        config.slow_value_update = 2;
        config.slow_value_fraction = 1.0;
        let device = Default::default();

        let world = WorldModel::<AB>::init(&config, &device);
        let mut ac = ActorCritic::<AB>::new(&config, config.feat_dim(), &device);
        let mut imagination = Imagination::new(0);

        for step in 1..=4 {
            let start = world.rssm.initial(4, &device);
            let actor = ac.actor.clone();
            let rollout = imagination.rollout(
                &world.rssm,
                |f| actor.forward(f),
                start,
                config.imag_horizon,
                &device,
            );
            ac.train(&world, &rollout);
            imagination.reset();
            assert_eq!(ac.updates(), step);
        }
    }
}
