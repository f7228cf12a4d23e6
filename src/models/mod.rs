//! Networks: encoder, latent dynamics, prediction heads, and the policy.

pub mod actor;
pub mod encoder;
pub mod heads;
pub mod mlp;
pub mod rssm;

pub use actor::{random_action, ActorNet, ActorNetConfig, PolicyDist};
pub use encoder::{Encoder, EncoderConfig};
pub use heads::{ContHead, ContHeadConfig, Decoder, DecoderConfig, TwoHotHead, TwoHotHeadConfig};
pub use mlp::{Mlp, MlpConfig};
pub use rssm::{KlLoss, LatentSeq, LatentState, Rssm, RssmConfig};
