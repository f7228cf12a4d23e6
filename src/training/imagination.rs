//! Imagined rollouts inside the learned dynamics.
//!
//! Starting from posterior states flattened to a `[B*T]` seed batch, the
//! policy and the prior alternate for `horizon` steps. Entry 0 of the rollout
//! is the seed itself, so a horizon-`H` rollout has exactly `H` entries of
//! features, states, and actions.
//!
//! The module owns its RNG so rollouts are reproducible: the same seed and
//! rollout index always draw the same latents and actions. After every
//! rollout the caller must call [`Imagination::reset`], which advances the
//! rollout index and reseeds; forgetting the reset is a bug and trips an
//! assertion on the next rollout.

use burn::prelude::*;

use crate::models::actor::PolicyDist;
use crate::models::rssm::{LatentState, Rssm};

/// One imagined trajectory: `horizon` aligned entries per field.
pub struct ImaginedRollout<B: Backend> {
    /// Features of the state each action was chosen from: `[N, feat_dim]`.
    pub feats: Vec<Tensor<B, 2>>,
    /// The latent states themselves (entry 0 is the seed).
    pub states: Vec<LatentState<B>>,
    /// Actions sampled from each state: `[N, action_dim]`.
    pub actions: Vec<Tensor<B, 2>>,
}

impl<B: Backend> ImaginedRollout<B> {
    pub fn horizon(&self) -> usize {
        self.feats.len()
    }
}

/// Rollout driver with an explicitly seeded, resettable RNG.
pub struct Imagination {
    rng: fastrand::Rng,
    base_seed: u64,
    rollouts: u64,
    in_flight: bool,
}

impl Imagination {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            base_seed: seed,
            rollouts: 0,
            in_flight: false,
        }
    }

    /// Unroll the policy inside the prior for `horizon` steps.
    ///
    /// `policy` maps detached features to a distribution; the sampled action
    /// keeps its gradient path (straight-through or reparameterized) into the
    /// dynamics. Call [`Self::reset`] once the rollout has been consumed.
    pub fn rollout<B: Backend>(
        &mut self,
        rssm: &Rssm<B>,
        policy: impl Fn(Tensor<B, 2>) -> PolicyDist<B>,
        start: LatentState<B>,
        horizon: usize,
        device: &B::Device,
    ) -> ImaginedRollout<B> {
        assert!(
            !self.in_flight,
            "previous imagined rollout was not reset; call reset() after consuming it"
        );
        assert!(horizon >= 1, "imagination horizon must be at least 1");
        self.in_flight = true;

        let mut feats = Vec::with_capacity(horizon);
        let mut states = Vec::with_capacity(horizon);
        let mut actions = Vec::with_capacity(horizon);

        let mut state = start;
        for _ in 0..horizon {
            let feat = state.feat();
            let dist = policy(feat.clone().detach());
            let action = dist.sample(&mut self.rng, device);

            feats.push(feat);
            states.push(state.clone());
            actions.push(action.clone());

            state = rssm.img_step(&state, action, &mut self.rng);
        }

        ImaginedRollout {
            feats,
            states,
            actions,
        }
    }

    /// Mandatory post-rollout cleanup: advance the rollout index and reseed
    /// the RNG so successive rollouts are decorrelated but replayable.
    pub fn reset(&mut self) {
        self.rollouts += 1;
        self.rng = fastrand::Rng::with_seed(self.base_seed.wrapping_add(self.rollouts));
        self.in_flight = false;
    }

    pub fn rollouts(&self) -> u64 {
        self.rollouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::config::ActionSpace;
    use crate::models::actor::ActorNetConfig;
    use crate::models::rssm::RssmConfig;

    type B = NdArray<f32>;

    fn setup(device: &<B as Backend>::Device) -> (Rssm<B>, crate::models::actor::ActorNet<B>) {
        let rssm = RssmConfig::new(3, 8)
            .with_deter_dim(16)
            .with_hidden_dim(16)
            .with_stoch(4, 4)
            .init(device);
        let actor = ActorNetConfig::new(rssm.feat_dim(), 16, ActionSpace::Discrete(3)).init(device);
        (rssm, actor)
    }

    #[test]
    fn test_rollout_has_exactly_horizon_entries() {
        let device = Default::default();
        let (rssm, actor) = setup(&device);
        let mut imagination = Imagination::new(0);

        let start = rssm.initial(6, &device);
        let rollout = imagination.rollout(&rssm, |f| actor.forward(f), start, 5, &device);

        assert_eq!(rollout.horizon(), 5);
        assert_eq!(rollout.feats.len(), 5);
        assert_eq!(rollout.states.len(), 5);
        assert_eq!(rollout.actions.len(), 5);
        assert_eq!(rollout.feats[0].dims(), [6, rssm.feat_dim()]);
        assert_eq!(rollout.actions[0].dims(), [6, 3]);
        imagination.reset();
    }

    #[test]
    fn test_same_seed_same_rollout() {
        let device = Default::default();
        let (rssm, actor) = setup(&device);

        let mut a = Imagination::new(42);
        let mut b = Imagination::new(42);
        let start = rssm.initial(2, &device);

        let ra = a.rollout(&rssm, |f| actor.forward(f), start.clone(), 4, &device);
        let rb = b.rollout(&rssm, |f| actor.forward(f), start, 4, &device);
        a.reset();
        b.reset();

        for (x, y) in ra.actions.iter().zip(rb.actions.iter()) {
            let x = x.clone().into_data();
            let y = y.clone().into_data();
            assert_eq!(x.as_slice::<f32>().unwrap(), y.as_slice::<f32>().unwrap());
        }
    }

    #[test]
    fn test_reset_decorrelates_successive_rollouts() {
        let device = Default::default();
        let (rssm, actor) = setup(&device);
        let mut imagination = Imagination::new(7);
        let start = rssm.initial(8, &device);

        let first = imagination.rollout(&rssm, |f| actor.forward(f), start.clone(), 6, &device);
        imagination.reset();
        let second = imagination.rollout(&rssm, |f| actor.forward(f), start, 6, &device);
        imagination.reset();

        // With 8 slots and 6 steps of categorical draws, identical action
        // sequences across differently seeded rollouts are vanishingly rare.
        let mut any_diff = false;
        for (x, y) in first.actions.iter().zip(second.actions.iter()) {
            let x = x.clone().into_data();
            let y = y.clone().into_data();
            if x.as_slice::<f32>().unwrap() != y.as_slice::<f32>().unwrap() {
                any_diff = true;
            }
        }
        assert!(any_diff);
        assert_eq!(imagination.rollouts(), 2);
    }

    #[test]
    #[should_panic(expected = "not reset")]
    fn test_missing_reset_panics() {
        let device = Default::default();
        let (rssm, actor) = setup(&device);
        let mut imagination = Imagination::new(0);
        let start = rssm.initial(1, &device);

        let _ = imagination.rollout(&rssm, |f| actor.forward(f), start.clone(), 2, &device);
        // No reset between rollouts.
        let _ = imagination.rollout(&rssm, |f| actor.forward(f), start, 2, &device);
    }
}
