//! The Dreamer agent.
//!
//! Couples the three training surfaces behind one object: world model
//! regression on replayed batches, imagined rollouts seeded from the
//! posterior, and actor-critic updates on those rollouts. The same object
//! serves the environment-facing policy, running the shared encoder and a
//! single posterior filter step per call.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::batch::{BatchSource, TrajectoryBatch};
use crate::checkpoint::{CheckpointError, Checkpointer};
use crate::config::{ConfigError, DreamerConfig};
use crate::metrics::{MetricsBuffer, MetricsLogger};
use crate::models::actor::{random_action, ActorNet};
use crate::models::heads::TwoHotHead;
use crate::models::rssm::LatentState;
use crate::training::actor_critic::{ActorCritic, ActorCriticMetrics};
use crate::training::imagination::Imagination;
use crate::training::world_model::{
    RolloutDiagnostics, WorldModel, WorldModelMetrics, WorldModelTrainer,
};

/// How the policy turns a distribution into an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    /// Uniform random actions, ignoring the actor.
    Explore,
    /// Sample from the actor's distribution.
    Train,
    /// Take the distribution's mode.
    Eval,
}

/// Recurrent policy state carried between environment steps.
#[derive(Debug, Clone)]
pub struct PolicyState<B: Backend> {
    /// Filtered latent after the last observation.
    pub latent: LatentState<B>,
    /// The action that was returned, fed back into the next filter step.
    pub action: Tensor<B, 2>,
}

/// Everything with learned parameters, bundled into one record for
/// checkpointing.
#[derive(Module, Debug)]
pub struct AgentModules<B: Backend> {
    pub world: WorldModel<B>,
    pub actor: ActorNet<B>,
    pub value: TwoHotHead<B>,
    pub slow_value: TwoHotHead<B>,
}

/// Metrics of the last update in a [`Dreamer::train_step`] call.
#[derive(Debug, Clone, Copy)]
pub struct TrainStepReport {
    pub updates_run: usize,
    pub world: WorldModelMetrics,
    pub actor_critic: ActorCriticMetrics,
}

/// Model-based agent: world model, imagination, actor-critic.
pub struct Dreamer<B: AutodiffBackend> {
    config: DreamerConfig,
    world: WorldModelTrainer<B>,
    actor_critic: ActorCritic<B>,
    imagination: Imagination,
    metrics: MetricsBuffer,
    updates: usize,
    pretrained: bool,
    rng: fastrand::Rng,
    device: B::Device,
}

impl<B: AutodiffBackend> Dreamer<B> {
    /// Validates the configuration before allocating any network.
    pub fn new(config: DreamerConfig, device: &B::Device) -> Result<Self, ConfigError> {
        config.validate()?;
        let world = WorldModelTrainer::new(&config, device);
        let actor_critic = ActorCritic::new(&config, config.feat_dim(), device);
        Ok(Self {
            imagination: Imagination::new(config.seed.wrapping_add(1)),
            rng: fastrand::Rng::with_seed(config.seed.wrapping_add(2)),
            world,
            actor_critic,
            metrics: MetricsBuffer::new(),
            updates: 0,
            pretrained: false,
            config,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &DreamerConfig {
        &self.config
    }

    /// Gradient updates performed so far.
    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn world_model(&self) -> &WorldModel<B> {
        self.world.model()
    }

    // ========================================================================
    // Training
    // ========================================================================

    /// Run the updates owed for one batch of collected experience.
    ///
    /// Normally that is `num_train_steps` updates (batch volume over train
    /// ratio); the very first call additionally runs `pretrain` updates,
    /// unless the agent was restored from a checkpoint.
    pub fn train_step<S: BatchSource<B>>(&mut self, source: &mut S) -> TrainStepReport {
        let mut updates_to_run = self.config.num_train_steps();
        if !self.pretrained {
            updates_to_run += self.config.pretrain;
            self.pretrained = true;
        }

        // Config validation guarantees at least one update per call.
        let (mut world, mut actor_critic) = self.update(source.next_batch());
        for _ in 1..updates_to_run {
            (world, actor_critic) = self.update(source.next_batch());
        }

        TrainStepReport {
            updates_run: updates_to_run,
            world,
            actor_critic,
        }
    }

    /// One joint update: world model step, imagined rollout, actor-critic
    /// step.
    fn update(&mut self, batch: TrajectoryBatch<B>) -> (WorldModelMetrics, ActorCriticMetrics) {
        let (post, wm) = self.world.train(batch);

        // Every posterior slot seeds one imagined trajectory.
        let start = post.detach().flatten();
        let actor = self.actor_critic.actor().clone();
        let rollout = self.imagination.rollout(
            &self.world.model.rssm,
            |feat| actor.forward(feat),
            start,
            self.config.imag_horizon,
            &self.device,
        );
        let ac = self.actor_critic.train(&self.world.model, &rollout);
        self.imagination.reset();

        self.updates += 1;
        self.record(&wm, &ac);
        (wm, ac)
    }

    fn record(&mut self, wm: &WorldModelMetrics, ac: &ActorCriticMetrics) {
        let m = &mut self.metrics;
        m.add("model/total_loss", wm.total_loss);
        m.add("model/recon_loss", wm.recon_loss);
        m.add("model/reward_loss", wm.reward_loss);
        m.add("model/cont_loss", wm.cont_loss);
        m.add("model/kl_loss", wm.kl_loss);
        m.add("model/dyn_kl", wm.dyn_kl);
        m.add("model/rep_kl", wm.rep_kl);
        m.add("model/prior_entropy", wm.prior_entropy);
        m.add("model/post_entropy", wm.post_entropy);
        m.add("actor/loss", ac.actor_loss);
        m.add("actor/entropy", ac.actor_entropy);
        m.add("critic/loss", ac.value_loss);
        m.add("critic/value_mean", ac.value_mean);
        m.add("return/ema_offset", ac.ema_offset);
        m.add("return/ema_scale", ac.ema_scale);
        m.add("return/target_mean", ac.target_mean);
        m.add("imag/reward_mean", ac.imag_reward_mean);
    }

    /// Whether the metric window is due for a flush.
    pub fn should_log(&self) -> bool {
        self.updates > 0 && self.updates % self.config.log_every == 0
    }

    /// Flush accumulated metric means (and pending videos) to a logger.
    pub fn flush_metrics(&mut self, logger: &mut dyn MetricsLogger) {
        self.metrics.flush_to(logger, self.updates);
    }

    /// Queue open-loop prediction videos for the next metric flush.
    pub fn log_openloop(&mut self, batch: TrajectoryBatch<B>, context: usize) {
        let RolloutDiagnostics {
            truth,
            model,
            error,
        } = self.world.rollout_diagnostics(batch, context);
        self.metrics.add_video("openloop/truth", truth);
        self.metrics.add_video("openloop/model", model);
        self.metrics.add_video("openloop/error", error);
    }

    // ========================================================================
    // Acting
    // ========================================================================

    /// One policy step: filter the observation into the latent, pick an
    /// action, and return it with the recurrent state for the next call.
    ///
    /// `obs` is `[N, obs_dim]`, `is_first` is `[N]` with 1.0 marking episode
    /// starts. `state` is `None` on the very first call. Below `expl_until`
    /// updates, train-mode actions are uniform random regardless of the actor.
    ///
    /// This method never trains; the driver owns the collect/train cadence by
    /// calling [`Dreamer::train_step`] once per collected batch of
    /// experience. The exploration window is therefore measured in gradient
    /// updates, not environment steps.
    pub fn policy(
        &mut self,
        obs: Tensor<B, 2>,
        is_first: Tensor<B, 1>,
        state: Option<PolicyState<B>>,
        mode: PolicyMode,
    ) -> (Tensor<B, 2>, PolicyState<B>) {
        let n = obs.dims()[0];
        let space = self.config.action_space;

        let (prev_latent, prev_action) = match state {
            Some(s) => (s.latent, s.action),
            None => (
                self.world.model.rssm.initial(n, &self.device),
                Tensor::zeros([n, space.action_dim()], &self.device),
            ),
        };

        let obs = if self.config.pixel_obs {
            obs.div_scalar(255.0)
        } else {
            obs
        };
        let embed = self.world.model.encoder.forward(obs);
        let sample_stoch = mode != PolicyMode::Eval;
        let latent = self
            .world
            .model
            .rssm
            .infer_step(
                &prev_latent,
                prev_action,
                embed,
                is_first,
                sample_stoch,
                &mut self.rng,
            )
            .detach();

        let explore = mode == PolicyMode::Explore
            || (mode == PolicyMode::Train && self.updates < self.config.expl_until);
        let action = if explore {
            random_action::<B>(n, space, &mut self.rng, &self.device)
        } else {
            let dist = self.actor_critic.actor().forward(latent.feat());
            match mode {
                PolicyMode::Eval => dist.mode(&self.device),
                _ => dist.sample(&mut self.rng, &self.device),
            }
        }
        .detach();

        let state = PolicyState {
            latent,
            action: action.clone(),
        };
        (action, state)
    }

    // ========================================================================
    // Checkpointing
    // ========================================================================

    /// The learned parameters as one record.
    pub fn modules(&self) -> AgentModules<B> {
        AgentModules {
            world: self.world.model.clone(),
            actor: self.actor_critic.actor.clone(),
            value: self.actor_critic.value.clone(),
            slow_value: self.actor_critic.slow_value.clone(),
        }
    }

    /// Save the agent's modules through a checkpointer.
    pub fn save_checkpoint(
        &self,
        checkpointer: &mut Checkpointer,
        step: usize,
        metric: Option<f32>,
    ) -> Result<std::path::PathBuf, CheckpointError> {
        checkpointer.save(&self.modules(), step, metric)
    }

    /// Restore modules from the latest checkpoint and skip pretraining.
    ///
    /// Optimizer moments and normalization state restart fresh.
    pub fn load_latest_checkpoint(
        &mut self,
        checkpointer: &Checkpointer,
    ) -> Result<usize, CheckpointError> {
        let (modules, step) = checkpointer.load_latest(self.modules(), &self.device)?;
        self.install(modules);
        Ok(step)
    }

    /// Restore modules from the best-return checkpoint and skip pretraining.
    pub fn load_best_checkpoint(
        &mut self,
        checkpointer: &Checkpointer,
    ) -> Result<(), CheckpointError> {
        let modules = checkpointer.load_best(self.modules(), &self.device)?;
        self.install(modules);
        Ok(())
    }

    fn install(&mut self, modules: AgentModules<B>) {
        self.world.model = modules.world;
        self.actor_critic.actor = modules.actor;
        self.actor_critic.value = modules.value;
        self.actor_critic.slow_value = modules.slow_value;
        self.pretrained = true;
    }
}
