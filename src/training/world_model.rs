//! World model training.
//!
//! The world model bundles the encoder, the latent dynamics, and the
//! prediction heads, and is trained jointly: one Adam step per batch on the
//! sum of reconstruction, reward, continuation, and KL losses.

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::batch::TrajectoryBatch;
use crate::config::DreamerConfig;
use crate::metrics::logger::VideoFrames;
use crate::models::encoder::{Encoder, EncoderConfig};
use crate::models::heads::{ContHead, ContHeadConfig, Decoder, DecoderConfig, TwoHotHead, TwoHotHeadConfig};
use crate::models::rssm::{LatentSeq, Rssm, RssmConfig};

// ============================================================================
// Model
// ============================================================================

/// Encoder, dynamics, and heads as one jointly trained module.
#[derive(Module, Debug)]
pub struct WorldModel<B: Backend> {
    pub encoder: Encoder<B>,
    pub rssm: Rssm<B>,
    pub decoder: Decoder<B>,
    pub reward: TwoHotHead<B>,
    pub cont: ContHead<B>,
}

impl<B: Backend> WorldModel<B> {
    pub fn init(config: &DreamerConfig, device: &B::Device) -> Self {
        let rssm = RssmConfig::new(config.action_space.action_dim(), config.embed_dim)
            .with_deter_dim(config.deter_dim)
            .with_hidden_dim(config.hidden_dim)
            .with_stoch(config.stoch_groups, config.stoch_classes)
            .with_unimix_ratio(config.unimix_ratio)
            .with_kl(config.kl_free, config.kl_balance, config.kl_scale)
            .init(device);
        let feat_dim = rssm.feat_dim();
        Self {
            encoder: EncoderConfig::new(config.obs_dim, config.hidden_dim, config.embed_dim)
                .init(device),
            rssm,
            decoder: DecoderConfig::new(feat_dim, config.hidden_dim, config.obs_dim).init(device),
            reward: TwoHotHeadConfig::new(feat_dim, config.hidden_dim, config.bins).init(device),
            cont: ContHeadConfig::new(feat_dim, config.hidden_dim).init(device),
        }
    }
}

/// Per-update world model losses and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct WorldModelMetrics {
    pub total_loss: f32,
    pub recon_loss: f32,
    pub reward_loss: f32,
    pub cont_loss: f32,
    pub kl_loss: f32,
    pub dyn_kl: f32,
    pub rep_kl: f32,
    pub prior_entropy: f32,
    pub post_entropy: f32,
}

/// Open-loop prediction arrays for the metrics video channel.
pub struct RolloutDiagnostics {
    pub truth: VideoFrames,
    pub model: VideoFrames,
    pub error: VideoFrames,
}

// ============================================================================
// Trainer
// ============================================================================

/// Owns the world model and its optimizer; one atomic gradient step per call.
pub struct WorldModelTrainer<B: AutodiffBackend> {
    pub(crate) model: WorldModel<B>,
    optim: OptimizerAdaptor<Adam, WorldModel<B>, B>,
    lr: f64,
    rng: fastrand::Rng,
    pixel_obs: bool,
    device: B::Device,
}

impl<B: AutodiffBackend> WorldModelTrainer<B> {
    pub fn new(config: &DreamerConfig, device: &B::Device) -> Self {
        let model = WorldModel::init(config, device);
        let optim = AdamConfig::new()
            .with_epsilon(1e-5)
            .with_grad_clipping(Some(burn::grad_clipping::GradientClippingConfig::Norm(
                config.grad_clip,
            )))
            .init();
        Self {
            model,
            optim,
            lr: config.model_lr,
            rng: fastrand::Rng::with_seed(config.seed),
            pixel_obs: config.pixel_obs,
            device: device.clone(),
        }
    }

    pub fn model(&self) -> &WorldModel<B> {
        &self.model
    }

    /// Shape-preserving input normalization. Pixel observations are scaled to
    /// `[0, 1]`; boundary flags are clamped to `{0, 1}`. Idempotent: a batch
    /// that already went through preprocessing passes through unchanged.
    pub fn preprocess(&self, batch: TrajectoryBatch<B>) -> TrajectoryBatch<B> {
        if batch.prepared {
            return batch;
        }
        let obs = if self.pixel_obs {
            batch.obs.div_scalar(255.0)
        } else {
            batch.obs
        };
        TrajectoryBatch {
            obs,
            action: batch.action,
            reward: batch.reward,
            is_first: batch.is_first.clamp(0.0, 1.0),
            is_terminal: batch.is_terminal.clamp(0.0, 1.0),
            prepared: true,
        }
    }

    /// One joint gradient step. Returns the posterior sequence (still
    /// attached to the graph; callers detach before reusing it) and metrics.
    pub fn train(&mut self, batch: TrajectoryBatch<B>) -> (LatentSeq<B>, WorldModelMetrics) {
        let batch = self.preprocess(batch);
        let (b, t) = batch.dims();
        let obs_dim = batch.obs.dims()[2];

        let embed = self.model.encoder.forward_seq(batch.obs.clone());
        let start = self.model.rssm.initial(b, &self.device);
        let (post, prior) = self.model.rssm.observe(
            embed,
            batch.action.clone(),
            batch.is_first.clone(),
            &start,
            &mut self.rng,
        );

        let feat = post.feat().reshape([b * t, self.model.rssm.feat_dim()]);
        let obs_flat = batch.obs.reshape([b * t, obs_dim]);
        let reward_flat = batch.reward.reshape([b * t]);
        // Continuation target: 1 where the episode goes on.
        let cont_flat = batch.is_terminal.neg().add_scalar(1.0).reshape([b * t]);

        let recon_loss = self.model.decoder.nll(feat.clone(), obs_flat);
        let reward_loss = self.model.reward.nll(feat.clone(), reward_flat);
        let cont_loss = self.model.cont.nll(feat, cont_flat);
        let kl = self.model.rssm.kl_loss(&post, &prior);

        let total = recon_loss.clone() + reward_loss.clone() + cont_loss.clone() + kl.loss.clone();

        let grads = total.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.lr, self.model.clone(), grads);

        let metrics = WorldModelMetrics {
            total_loss: scalar(&total),
            recon_loss: scalar(&recon_loss),
            reward_loss: scalar(&reward_loss),
            cont_loss: scalar(&cont_loss),
            kl_loss: scalar(&kl.loss),
            dyn_kl: kl.dyn_value,
            rep_kl: kl.rep_value,
            prior_entropy: self.model.rssm.entropy_mean(&prior.logits),
            post_entropy: self.model.rssm.entropy_mean(&post.logits),
        };

        (post, metrics)
    }

    /// Qualitative open-loop prediction: filter the first `context` steps
    /// with the posterior, then predict the remaining steps from the prior
    /// using only the recorded actions. Returns truth, model output, and
    /// their difference as `[B, T, obs_dim]` arrays.
    pub fn rollout_diagnostics(
        &mut self,
        batch: TrajectoryBatch<B>,
        context: usize,
    ) -> RolloutDiagnostics {
        let batch = self.preprocess(batch);
        let (b, t) = batch.dims();
        let obs_dim = batch.obs.dims()[2];
        assert!(
            context >= 1 && context < t,
            "context must leave at least one step to predict"
        );
        let feat_dim = self.model.rssm.feat_dim();
        let action_dim = batch.action.dims()[2];

        let embed = self.model.encoder.forward_seq(batch.obs.clone());
        let embed_ctx = embed.slice([0..b, 0..context]);
        let action_ctx = batch.action.clone().slice([0..b, 0..context]);
        let is_first_ctx = batch.is_first.clone().slice([0..b, 0..context]);

        let start = self.model.rssm.initial(b, &self.device);
        let (post, _) =
            self.model
                .rssm
                .observe(embed_ctx, action_ctx, is_first_ctx, &start, &mut self.rng);

        let recon_post = self
            .model
            .decoder
            .decode(post.feat().reshape([b * context, feat_dim]))
            .reshape([b, context, obs_dim]);

        // Open loop from the last filtered state.
        let mut state = post.step(context - 1);
        let mut open_loop = Vec::with_capacity(t - context);
        for step in context..t {
            let action_t = batch
                .action
                .clone()
                .slice([0..b, step..step + 1, 0..action_dim])
                .reshape([b, action_dim]);
            state = self.model.rssm.img_step(&state, action_t, &mut self.rng);
            open_loop.push(
                self.model
                    .decoder
                    .decode(state.feat())
                    .reshape([b, 1, obs_dim]),
            );
        }
        let recon_prior = Tensor::cat(open_loop, 1);

        let model_out = Tensor::cat(vec![recon_post, recon_prior], 1);
        let error = model_out.clone() - batch.obs.clone();

        RolloutDiagnostics {
            truth: VideoFrames::from_tensor(batch.obs),
            model: VideoFrames::from_tensor(model_out),
            error: VideoFrames::from_tensor(error),
        }
    }
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone()
        .detach()
        .into_data()
        .as_slice::<f32>()
        .expect("contiguous f32 scalar data")[0]
}
