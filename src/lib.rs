//! # Dreamer-RL: Model-Based RL with an Imagination-Trained Actor-Critic
//!
//! Training core for a Dreamer-style agent: a recurrent latent world model
//! (categorical stochastic state + GRU deterministic state) learned from
//! replayed trajectories, and an actor-critic trained entirely on rollouts
//! imagined inside that model.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Dreamer agent                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  TrajectoryBatch (B, T)                                          │
//! │        │                                                         │
//! │        ▼                                                         │
//! │  ┌─────────────┐   posterior seq   ┌────────────────────┐        │
//! │  │ WorldModel  │──────────────────▶│ Imagination (H)    │        │
//! │  │ enc + RSSM  │                   │ actor samples,     │        │
//! │  │ + heads     │                   │ prior dynamics     │        │
//! │  └──────┬──────┘                   └─────────┬──────────┘        │
//! │         │ recon/reward/cont/KL losses        │ imagined feats    │
//! │         ▼                                    ▼                   │
//! │   Adam step                         ┌────────────────────┐       │
//! │                                     │ ActorCritic        │       │
//! │                                     │ λ-returns, RewardEma│      │
//! │                                     │ slow value network │       │
//! │                                     └────────────────────┘       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dreamer_rl::{Dreamer, DreamerConfig, ActionSpace, PolicyMode};
//!
//! let config = DreamerConfig::new(obs_dim, ActionSpace::Discrete(n_actions))
//!     .with_batch(16, 64)
//!     .with_imag_horizon(15);
//!
//! let mut agent: Dreamer<B> = Dreamer::new(config, &device)?;
//! let metrics = agent.train_step(&mut batch_source);
//! let (action, state) = agent.policy(obs, is_first, state, PolicyMode::Train);
//! ```

pub mod agent;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod metrics;
pub mod models;
pub mod training;

pub use agent::{AgentModules, Dreamer, PolicyMode, PolicyState, TrainStepReport};
pub use batch::{BatchSource, TrajectoryBatch};
pub use checkpoint::{CheckpointError, CheckpointInfo, Checkpointer, CheckpointerConfig};
pub use config::{ActionSpace, ConfigError, DreamerConfig};
pub use crate::core::reward_ema::RewardEma;
pub use crate::core::symlog::{symexp, symlog};
pub use metrics::buffer::{MetricsBuffer, SharedMetricsBuffer, shared_metrics};
pub use metrics::logger::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, VideoFrames};
pub use models::actor::{ActorNet, PolicyDist};
pub use models::rssm::{LatentSeq, LatentState, Rssm, RssmConfig};
pub use training::actor_critic::ActorCritic;
pub use training::imagination::{ImaginedRollout, Imagination};
pub use training::returns::{cumulative_weights, lambda_return};
pub use training::world_model::{WorldModel, WorldModelTrainer};
