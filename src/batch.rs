//! Trajectory batches pulled from the external dataset iterator.
//!
//! A batch bundles `B` independent sequences of length `T`. Every
//! per-timestep field shares the same `(B, T)` leading shape; violating that
//! invariant is a fatal precondition error, not a recoverable condition.

use burn::prelude::*;

/// Fixed-shape bundle of `B` sequences of length `T`.
///
/// Observations arrive flattened to `obs_dim` floats per timestep and actions
/// as `action_dim` floats (one-hot for discrete spaces). `is_first` marks
/// episode boundaries inside a sequence; `is_terminal` marks true environment
/// termination (as opposed to time limits). Datasets that store a per-step
/// discount column collapse it into `is_terminal` here: training derives the
/// continuation signal as `1 - is_terminal`, so a separate discount field
/// would be redundant.
#[derive(Debug, Clone)]
pub struct TrajectoryBatch<B: Backend> {
    /// Observations: `[B, T, obs_dim]`.
    pub obs: Tensor<B, 3>,
    /// Actions taken: `[B, T, action_dim]`.
    pub action: Tensor<B, 3>,
    /// Rewards received: `[B, T]`.
    pub reward: Tensor<B, 2>,
    /// Episode-start flags: `[B, T]`, values in {0, 1}.
    pub is_first: Tensor<B, 2>,
    /// True-termination flags: `[B, T]`, values in {0, 1}.
    pub is_terminal: Tensor<B, 2>,
    /// Whether [`crate::training::WorldModelTrainer`] preprocessing has
    /// already run on this batch (preprocessing is idempotent through this).
    pub prepared: bool,
}

impl<B: Backend> TrajectoryBatch<B> {
    /// Assemble a batch, asserting the shared `(B, T)` leading shape.
    pub fn new(
        obs: Tensor<B, 3>,
        action: Tensor<B, 3>,
        reward: Tensor<B, 2>,
        is_first: Tensor<B, 2>,
        is_terminal: Tensor<B, 2>,
    ) -> Self {
        let [b, t, _] = obs.dims();
        assert_eq!(&action.dims()[..2], &[b, t], "action leading shape mismatch");
        assert_eq!(reward.dims(), [b, t], "reward shape mismatch");
        assert_eq!(is_first.dims(), [b, t], "is_first shape mismatch");
        assert_eq!(is_terminal.dims(), [b, t], "is_terminal shape mismatch");
        Self {
            obs,
            action,
            reward,
            is_first,
            is_terminal,
            prepared: false,
        }
    }

    /// Build a batch from row-major float slices (dataset adapters, tests).
    #[allow(clippy::too_many_arguments)]
    pub fn from_floats(
        batch_size: usize,
        length: usize,
        obs_dim: usize,
        action_dim: usize,
        obs: &[f32],
        action: &[f32],
        reward: &[f32],
        is_first: &[f32],
        is_terminal: &[f32],
        device: &B::Device,
    ) -> Self {
        assert_eq!(obs.len(), batch_size * length * obs_dim, "obs buffer size");
        assert_eq!(
            action.len(),
            batch_size * length * action_dim,
            "action buffer size"
        );
        assert_eq!(reward.len(), batch_size * length, "reward buffer size");
        assert_eq!(is_first.len(), batch_size * length, "is_first buffer size");
        assert_eq!(
            is_terminal.len(),
            batch_size * length,
            "is_terminal buffer size"
        );

        Self::new(
            Tensor::<B, 1>::from_floats(obs, device).reshape([batch_size, length, obs_dim]),
            Tensor::<B, 1>::from_floats(action, device).reshape([batch_size, length, action_dim]),
            Tensor::<B, 1>::from_floats(reward, device).reshape([batch_size, length]),
            Tensor::<B, 1>::from_floats(is_first, device).reshape([batch_size, length]),
            Tensor::<B, 1>::from_floats(is_terminal, device).reshape([batch_size, length]),
        )
    }

    /// `(B, T)` leading shape.
    pub fn dims(&self) -> (usize, usize) {
        let [b, t, _] = self.obs.dims();
        (b, t)
    }
}

/// Infinite source of trajectory batches.
///
/// The dataset iterator itself (episode files, replay sampling, shuffling)
/// lives outside this crate; the agent only requires that every pull yields a
/// batch of the configured shape.
pub trait BatchSource<B: Backend> {
    /// Produce the next batch. Must never be exhausted.
    fn next_batch(&mut self) -> TrajectoryBatch<B>;
}

impl<B: Backend, F> BatchSource<B> for F
where
    F: FnMut() -> TrajectoryBatch<B>,
{
    fn next_batch(&mut self) -> TrajectoryBatch<B> {
        self()
    }
}
