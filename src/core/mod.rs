//! Core numeric primitives shared across the world model and actor-critic.

pub mod dists;
pub mod reward_ema;
pub mod symlog;
pub mod target_network;

pub use reward_ema::RewardEma;
pub use symlog::{symexp, symexp_scalar, symlog, symlog_scalar, two_hot_decode, two_hot_encode};
pub use target_network::mix_parameters;
