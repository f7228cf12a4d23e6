//! Observation encoder.
//!
//! Observations arrive as flattened float vectors (pixel inputs are scaled
//! and flattened by preprocessing before they get here). The encoder maps
//! each timestep to the embedding the posterior conditions on.

use burn::prelude::*;

use super::mlp::{Mlp, MlpConfig};

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub obs_dim: usize,
    pub hidden_dim: usize,
    pub embed_dim: usize,
}

impl EncoderConfig {
    pub fn new(obs_dim: usize, hidden_dim: usize, embed_dim: usize) -> Self {
        Self {
            obs_dim,
            hidden_dim,
            embed_dim,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        Encoder {
            net: MlpConfig::new(self.obs_dim, self.hidden_dim, self.embed_dim).init(device),
            embed_dim: self.embed_dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    net: Mlp<B>,
    #[module(skip)]
    embed_dim: usize,
}

impl<B: Backend> Encoder<B> {
    /// `[batch, obs_dim]` to `[batch, embed_dim]`.
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(obs)
    }

    /// `[batch, time, obs_dim]` to `[batch, time, embed_dim]`.
    pub fn forward_seq(&self, obs: Tensor<B, 3>) -> Tensor<B, 3> {
        let [b, t, d] = obs.dims();
        self.forward(obs.reshape([b * t, d]))
            .reshape([b, t, self.embed_dim])
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_encoder_seq_shape() {
        let device = Default::default();
        let encoder = EncoderConfig::new(10, 16, 8).init::<B>(&device);
        let obs = Tensor::<B, 3>::zeros([3, 5, 10], &device);
        assert_eq!(encoder.forward_seq(obs).dims(), [3, 5, 8]);
    }
}
