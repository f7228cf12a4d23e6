//! Agent configuration with fail-fast validation.
//!
//! All hyperparameters for the world model, the imagination rollout and the
//! actor-critic live in one [`DreamerConfig`] so that a single `validate()`
//! call at agent construction can reject inconsistent settings before any
//! network is allocated.

use std::fmt;

/// Description of the environment's action space.
///
/// Selected once at construction; it decides the policy distribution and the
/// gradient estimator used by the actor (categorical + straight-through for
/// discrete, diagonal Gaussian + reparameterization for continuous).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSpace {
    /// Discrete space with `n` actions (actions travel as one-hot vectors).
    Discrete(usize),
    /// Continuous space with `dim` independent dimensions.
    Continuous(usize),
}

impl ActionSpace {
    /// Width of the action tensors flowing through dynamics and buffers.
    pub fn action_dim(&self) -> usize {
        match *self {
            ActionSpace::Discrete(n) => n,
            ActionSpace::Continuous(dim) => dim,
        }
    }

    /// Whether actions are one-hot encoded discrete choices.
    pub fn is_discrete(&self) -> bool {
        matches!(self, ActionSpace::Discrete(_))
    }
}

/// Error produced by construction-time configuration validation.
#[derive(Debug)]
pub enum ConfigError {
    /// `train_ratio` is too large relative to `batch_size * batch_length`,
    /// so the derived number of updates per environment step would be zero.
    ZeroTrainSteps {
        batch_size: usize,
        batch_length: usize,
        train_ratio: usize,
    },
    /// A structural dimension (latent sizes, horizon, bins, ...) is zero.
    ZeroDimension(&'static str),
    /// A probability-like parameter is outside `[0, 1]`.
    OutOfRange { name: &'static str, value: f32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTrainSteps {
                batch_size,
                batch_length,
                train_ratio,
            } => write!(
                f,
                "train ratio {} must be at most batch_size {} * batch_length {}",
                train_ratio, batch_size, batch_length
            ),
            ConfigError::ZeroDimension(name) => write!(f, "{} must be non-zero", name),
            ConfigError::OutOfRange { name, value } => {
                write!(f, "{} = {} is outside [0, 1]", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Full agent configuration.
///
/// Defaults follow the reference hyperparameters for low-dimensional
/// observations; use the `with_*` builders to override individual fields.
#[derive(Debug, Clone)]
pub struct DreamerConfig {
    // ========================================================================
    // Spaces
    // ========================================================================
    /// Flattened observation width.
    pub obs_dim: usize,
    /// Action space description.
    pub action_space: ActionSpace,
    /// Whether observations are raw pixel intensities in `[0, 255]`
    /// (preprocessing then rescales them to `[0, 1]`).
    pub pixel_obs: bool,

    // ========================================================================
    // Latent dynamics
    // ========================================================================
    /// Size of the deterministic recurrent vector.
    pub deter_dim: usize,
    /// Hidden width of the dynamics MLPs.
    pub hidden_dim: usize,
    /// Width of the observation embedding fed to the posterior.
    pub embed_dim: usize,
    /// Number of independent categorical groups in the stochastic state.
    pub stoch_groups: usize,
    /// Number of classes per categorical group.
    pub stoch_classes: usize,
    /// Fraction of uniform probability mixed into every categorical
    /// distribution before sampling (keeps log-probs bounded).
    pub unimix_ratio: f32,
    /// Free-bits floor applied to each KL term.
    pub kl_free: f32,
    /// Mixing weight between the dynamics term (toward stop-gradient
    /// posterior) and the representation term (toward stop-gradient prior).
    pub kl_balance: f32,
    /// Overall scale of the KL loss.
    pub kl_scale: f32,

    // ========================================================================
    // Heads
    // ========================================================================
    /// Number of bins for two-hot discrete regression (reward and value).
    pub bins: usize,

    // ========================================================================
    // World model training
    // ========================================================================
    /// Sequences per batch.
    pub batch_size: usize,
    /// Timesteps per sequence.
    pub batch_length: usize,
    /// Environment steps per gradient update; together with the batch volume
    /// this derives the number of updates per policy call.
    pub train_ratio: usize,
    /// Updates run on the very first training call (unless a checkpoint was
    /// loaded).
    pub pretrain: usize,
    /// World model learning rate.
    pub model_lr: f64,
    /// Gradient norm clip applied to every optimizer.
    pub grad_clip: f32,

    // ========================================================================
    // Imagination / actor-critic
    // ========================================================================
    /// Imagination horizon H.
    pub imag_horizon: usize,
    /// Discount factor applied through the predicted continuation.
    pub discount: f32,
    /// Lambda of the lambda-return target recursion.
    pub return_lambda: f32,
    /// Entropy bonus coefficient for the actor.
    pub actor_entropy: f32,
    /// Actor learning rate.
    pub actor_lr: f64,
    /// Value learning rate.
    pub value_lr: f64,
    /// Decay of the percentile EMA used to normalize advantages.
    pub ema_decay: f64,
    /// Low/high percentiles tracked by the EMA (fractions in `[0, 1]`).
    pub ema_percentiles: (f64, f64),
    /// Calls between slow value network updates.
    pub slow_value_update: usize,
    /// Mixing fraction for the slow value update (1.0 = hard copy).
    pub slow_value_fraction: f32,

    // ========================================================================
    // Orchestration
    // ========================================================================
    /// Update step below which the policy explores with uniform actions.
    pub expl_until: usize,
    /// Update steps between metric flushes.
    pub log_every: usize,
    /// Base seed for all sampling state.
    pub seed: u64,
}

impl Default for DreamerConfig {
    fn default() -> Self {
        Self {
            obs_dim: 64,
            action_space: ActionSpace::Discrete(4),
            pixel_obs: false,

            deter_dim: 512,
            hidden_dim: 512,
            embed_dim: 512,
            stoch_groups: 32,
            stoch_classes: 32,
            unimix_ratio: 0.01,
            kl_free: 1.0,
            kl_balance: 0.8,
            kl_scale: 1.0,

            bins: 255,

            batch_size: 16,
            batch_length: 64,
            train_ratio: 64,
            pretrain: 100,
            model_lr: 1e-4,
            grad_clip: 100.0,

            imag_horizon: 15,
            discount: 0.997,
            return_lambda: 0.95,
            actor_entropy: 3e-4,
            actor_lr: 3e-5,
            value_lr: 3e-5,
            ema_decay: 0.99,
            ema_percentiles: (0.05, 0.95),
            slow_value_update: 1,
            slow_value_fraction: 0.02,

            expl_until: 0,
            log_every: 100,
            seed: 0,
        }
    }
}

impl DreamerConfig {
    /// Create a config for the given spaces with default hyperparameters.
    pub fn new(obs_dim: usize, action_space: ActionSpace) -> Self {
        Self {
            obs_dim,
            action_space,
            ..Default::default()
        }
    }

    /// Shrunk preset for unit tests and smoke runs.
    pub fn tiny(obs_dim: usize, action_space: ActionSpace) -> Self {
        Self {
            obs_dim,
            action_space,
            deter_dim: 16,
            hidden_dim: 16,
            embed_dim: 16,
            stoch_groups: 4,
            stoch_classes: 4,
            bins: 31,
            batch_size: 4,
            batch_length: 2,
            train_ratio: 4,
            pretrain: 1,
            imag_horizon: 5,
            log_every: 1,
            ..Self::new(obs_dim, action_space)
        }
    }

    /// Set the batch shape.
    pub fn with_batch(mut self, batch_size: usize, batch_length: usize) -> Self {
        self.batch_size = batch_size;
        self.batch_length = batch_length;
        self
    }

    /// Set the train ratio (environment steps per gradient update).
    pub fn with_train_ratio(mut self, train_ratio: usize) -> Self {
        self.train_ratio = train_ratio;
        self
    }

    /// Set the imagination horizon.
    pub fn with_imag_horizon(mut self, horizon: usize) -> Self {
        self.imag_horizon = horizon;
        self
    }

    /// Set the base RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Flattened stochastic width (`groups * classes`).
    pub fn stoch_dim(&self) -> usize {
        self.stoch_groups * self.stoch_classes
    }

    /// Feature width consumed by the heads and the policy.
    pub fn feat_dim(&self) -> usize {
        self.deter_dim + self.stoch_dim()
    }

    /// Gradient updates per policy call, derived from the train ratio.
    pub fn num_train_steps(&self) -> usize {
        (self.batch_size * self.batch_length) / self.train_ratio.max(1)
    }

    /// Validate the configuration, failing fast on anything that would only
    /// surface as a silent no-op or a shape panic deep inside training.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_train_steps() == 0 {
            return Err(ConfigError::ZeroTrainSteps {
                batch_size: self.batch_size,
                batch_length: self.batch_length,
                train_ratio: self.train_ratio,
            });
        }
        for (name, value) in [
            ("obs_dim", self.obs_dim),
            ("action_dim", self.action_space.action_dim()),
            ("deter_dim", self.deter_dim),
            ("hidden_dim", self.hidden_dim),
            ("embed_dim", self.embed_dim),
            ("stoch_groups", self.stoch_groups),
            ("stoch_classes", self.stoch_classes),
            ("bins", self.bins),
            ("batch_size", self.batch_size),
            ("batch_length", self.batch_length),
            ("imag_horizon", self.imag_horizon),
            ("slow_value_update", self.slow_value_update),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension(name));
            }
        }
        // Horizon 1 leaves no transition to compute a return over.
        if self.imag_horizon < 2 {
            return Err(ConfigError::ZeroDimension("imag_horizon (must be >= 2)"));
        }
        for (name, value) in [
            ("unimix_ratio", self.unimix_ratio),
            ("kl_balance", self.kl_balance),
            ("discount", self.discount),
            ("return_lambda", self.return_lambda),
            ("slow_value_fraction", self.slow_value_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DreamerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_train_steps_rejected() {
        // 4 * 2 = 8 batch steps, ratio 100 -> 0 updates per call.
        let config = DreamerConfig::tiny(8, ActionSpace::Discrete(3)).with_train_ratio(100);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTrainSteps { .. }));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = DreamerConfig::tiny(8, ActionSpace::Discrete(3));
        config.stoch_groups = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDimension("stoch_groups"))
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut config = DreamerConfig::tiny(8, ActionSpace::Discrete(3));
        config.kl_balance = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "kl_balance", .. })
        ));
    }

    #[test]
    fn test_derived_sizes() {
        let config = DreamerConfig::tiny(8, ActionSpace::Discrete(3));
        assert_eq!(config.stoch_dim(), 16);
        assert_eq!(config.feat_dim(), 32);
        assert_eq!(config.num_train_steps(), 2);
    }

    #[test]
    fn test_action_space() {
        assert_eq!(ActionSpace::Discrete(6).action_dim(), 6);
        assert_eq!(ActionSpace::Continuous(3).action_dim(), 3);
        assert!(ActionSpace::Discrete(6).is_discrete());
        assert!(!ActionSpace::Continuous(3).is_discrete());
    }
}
