//! Training: world model regression, imagined rollouts, and actor-critic
//! updates on imagined returns.

pub mod actor_critic;
pub mod imagination;
pub mod returns;
pub mod world_model;

pub use actor_critic::{ActorCritic, ActorCriticMetrics};
pub use imagination::{ImaginedRollout, Imagination};
pub use returns::{cumulative_weights, lambda_return};
pub use world_model::{
    RolloutDiagnostics, WorldModel, WorldModelMetrics, WorldModelTrainer,
};
