//! Prediction heads over latent features.
//!
//! All heads consume the feature vector `[stoch_flat, deter]` and predict one
//! target each: observation reconstruction (Gaussian in symlog space), scalar
//! reward and value (two-hot discrete regression over symlog bins), and
//! episode continuation (Bernoulli).

use burn::prelude::*;
use burn::tensor::activation::{log_softmax, sigmoid, softmax, softplus};

use crate::core::symlog::{bin_centers, symexp, symlog, two_hot_encode};

use super::mlp::{Mlp, MlpConfig};

// ============================================================================
// Observation decoder
// ============================================================================

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub feat_dim: usize,
    pub hidden_dim: usize,
    pub obs_dim: usize,
}

impl DecoderConfig {
    pub fn new(feat_dim: usize, hidden_dim: usize, obs_dim: usize) -> Self {
        Self {
            feat_dim,
            hidden_dim,
            obs_dim,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        Decoder {
            net: MlpConfig::new(self.feat_dim, self.hidden_dim, self.obs_dim).init(device),
        }
    }
}

/// Reconstructs observations in symlog space.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> Decoder<B> {
    /// Symlog-space reconstruction: `[batch, obs_dim]`.
    pub fn forward(&self, feat: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(feat)
    }

    /// Reconstruction in observation space (for diagnostics).
    pub fn decode(&self, feat: Tensor<B, 2>) -> Tensor<B, 2> {
        symexp(self.forward(feat))
    }

    /// Unit-variance Gaussian NLL in symlog space, summed over the
    /// observation dimension, averaged over the batch: scalar tensor.
    pub fn nll(&self, feat: Tensor<B, 2>, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        let pred = self.forward(feat);
        let err = pred - symlog(obs);
        (err.clone() * err).mul_scalar(0.5).sum_dim(1).mean()
    }
}

// ============================================================================
// Two-hot scalar head (reward, value)
// ============================================================================

#[derive(Debug, Clone)]
pub struct TwoHotHeadConfig {
    pub feat_dim: usize,
    pub hidden_dim: usize,
    pub bins: usize,
}

impl TwoHotHeadConfig {
    pub fn new(feat_dim: usize, hidden_dim: usize, bins: usize) -> Self {
        Self {
            feat_dim,
            hidden_dim,
            bins,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TwoHotHead<B> {
        TwoHotHead {
            net: MlpConfig::new(self.feat_dim, self.hidden_dim, self.bins).init(device),
            bins: self.bins,
        }
    }
}

/// Scalar regression as a categorical over symlog-space bins.
#[derive(Module, Debug)]
pub struct TwoHotHead<B: Backend> {
    net: Mlp<B>,
    #[module(skip)]
    bins: usize,
}

impl<B: Backend> TwoHotHead<B> {
    /// Bin logits: `[batch, bins]`.
    pub fn logits(&self, feat: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(feat)
    }

    /// Expected scalar prediction: `[batch]`.
    pub fn decode(&self, feat: Tensor<B, 2>) -> Tensor<B, 1> {
        let logits = self.logits(feat);
        Self::decode_logits(logits)
    }

    /// Expected scalar from precomputed logits: `[batch]`.
    pub fn decode_logits(logits: Tensor<B, 2>) -> Tensor<B, 1> {
        let [n, bins] = logits.dims();
        let device = logits.device();
        let centers = Tensor::<B, 1>::from_floats(bin_centers(bins).as_slice(), &device)
            .reshape([1, bins])
            .repeat_dim(0, n);
        symexp((softmax(logits, 1) * centers).sum_dim(1).reshape([n]))
    }

    /// Categorical NLL against two-hot-encoded scalar targets, averaged over
    /// the batch: scalar tensor. Targets must be detached by the caller when
    /// they come from the graph.
    pub fn nll(&self, feat: Tensor<B, 2>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
        let logits = self.logits(feat);
        Self::nll_logits(logits, targets)
    }

    /// NLL from precomputed logits: per-row losses `[batch]`.
    pub fn nll_logits_per_row(logits: Tensor<B, 2>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
        let [n, bins] = logits.dims();
        let device = logits.device();
        let target_probs = two_hot_encode(targets, bins, &device);
        (log_softmax(logits, 1) * target_probs)
            .sum_dim(1)
            .reshape([n])
            .neg()
    }

    /// NLL from precomputed logits, averaged over the batch: scalar tensor.
    pub fn nll_logits(logits: Tensor<B, 2>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
        Self::nll_logits_per_row(logits, targets).mean()
    }

    pub fn bins(&self) -> usize {
        self.bins
    }
}

// ============================================================================
// Continuation head
// ============================================================================

#[derive(Debug, Clone)]
pub struct ContHeadConfig {
    pub feat_dim: usize,
    pub hidden_dim: usize,
}

impl ContHeadConfig {
    pub fn new(feat_dim: usize, hidden_dim: usize) -> Self {
        Self {
            feat_dim,
            hidden_dim,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ContHead<B> {
        ContHead {
            net: MlpConfig::new(self.feat_dim, self.hidden_dim, 1).init(device),
        }
    }
}

/// Bernoulli head predicting the probability the episode continues.
#[derive(Module, Debug)]
pub struct ContHead<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> ContHead<B> {
    /// Bernoulli logit per row: `[batch]`.
    pub fn logits(&self, feat: Tensor<B, 2>) -> Tensor<B, 1> {
        let n = feat.dims()[0];
        self.net.forward(feat).reshape([n])
    }

    /// Continuation probability per row: `[batch]`.
    pub fn prob(&self, feat: Tensor<B, 2>) -> Tensor<B, 1> {
        sigmoid(self.logits(feat))
    }

    /// Bernoulli NLL via the softplus form, averaged over the batch:
    /// `t * softplus(-x) + (1 - t) * softplus(x)`.
    pub fn nll(&self, feat: Tensor<B, 2>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
        let x = self.logits(feat);
        let pos = softplus(x.clone().neg(), 1.0) * targets.clone();
        let neg = softplus(x, 1.0) * (targets.neg().add_scalar(1.0));
        (pos + neg).mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_decoder_nll_zero_at_perfect_fit() {
        let device = Default::default();
        // NLL of a prediction equal to the symlog target is exactly zero;
        // verify via the residual formula rather than a trained net.
        let obs = Tensor::<B, 2>::from_floats([[2.0, -3.0]], &device);
        let pred = symlog(obs.clone());
        let err = pred - symlog(obs);
        let loss = (err.clone() * err).mul_scalar(0.5).sum_dim(1).mean();
        assert!(loss.into_data().as_slice::<f32>().unwrap()[0].abs() < 1e-6);
    }

    #[test]
    fn test_decoder_shapes() {
        let device = Default::default();
        let decoder = DecoderConfig::new(12, 16, 5).init::<B>(&device);
        let feat = Tensor::<B, 2>::zeros([3, 12], &device);
        assert_eq!(decoder.forward(feat.clone()).dims(), [3, 5]);
        let obs = Tensor::<B, 2>::zeros([3, 5], &device);
        assert_eq!(decoder.nll(feat, obs).dims(), [1]);
    }

    #[test]
    fn test_two_hot_head_decode_shape_and_finite() {
        let device = Default::default();
        let head = TwoHotHeadConfig::new(8, 16, 31).init::<B>(&device);
        let feat = Tensor::<B, 2>::zeros([4, 8], &device);
        let pred = head.decode(feat).into_data();
        let vals = pred.as_slice::<f32>().unwrap();
        assert_eq!(vals.len(), 4);
        assert!(vals.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_two_hot_nll_lower_for_matching_logits() {
        let device = Default::default();
        let bins = 31;
        let targets = Tensor::<B, 1>::from_floats([0.0], &device);
        // Logits peaked on the correct bin versus a wrong bin.
        let target_probs = two_hot_encode(targets.clone(), bins, &device);
        let good = target_probs.clone().mul_scalar(10.0);
        let mut wrong = vec![0.0f32; bins];
        wrong[0] = 10.0;
        let bad = Tensor::<B, 1>::from_floats(wrong.as_slice(), &device).reshape([1, bins]);

        let nll_good = TwoHotHead::<B>::nll_logits(good, targets.clone());
        let nll_bad = TwoHotHead::<B>::nll_logits(bad, targets);
        let g = nll_good.into_data().as_slice::<f32>().unwrap()[0];
        let b = nll_bad.into_data().as_slice::<f32>().unwrap()[0];
        assert!(g < b);
    }

    #[test]
    fn test_cont_head_prob_in_unit_interval() {
        let device = Default::default();
        let head = ContHeadConfig::new(8, 16).init::<B>(&device);
        let feat = Tensor::<B, 2>::random(
            [6, 8],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let probs = head.prob(feat).into_data();
        for p in probs.as_slice::<f32>().unwrap() {
            assert!(*p >= 0.0 && *p <= 1.0);
        }
    }

    #[test]
    fn test_cont_nll_finite() {
        let device = Default::default();
        let head = ContHeadConfig::new(4, 8).init::<B>(&device);
        let feat = Tensor::<B, 2>::zeros([3, 4], &device);
        let targets = Tensor::<B, 1>::from_floats([1.0, 0.0, 1.0], &device);
        let loss = head.nll(feat, targets).into_data().as_slice::<f32>().unwrap()[0];
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }
}
