//! Running percentile statistics for return normalization.
//!
//! Imagined return magnitudes drift as the world model and policy improve.
//! Instead of normalizing by a running standard deviation, the actor-critic
//! tracks exponential moving averages of a low and high percentile of the
//! return batch and rescales advantages by their spread. This ignores
//! outliers and leaves small-return regimes untouched (scale is floored at 1).

use serde::{Deserialize, Serialize};

/// Exponential moving average of two return percentiles.
///
/// Called once per actor-critic update with the flattened return targets.
/// Serializable so training can resume with its normalization state intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardEma {
    /// EMA of the low percentile.
    low: f64,
    /// EMA of the high percentile.
    high: f64,
    /// Decay factor: 1.0 freezes the state, 0.0 tracks each batch exactly.
    decay: f64,
    /// Percentile pair in `[0, 1]`, low then high.
    percentiles: (f64, f64),
    /// Update count, 0 until the first batch arrives.
    count: usize,
}

impl RewardEma {
    pub fn new(decay: f64, percentiles: (f64, f64)) -> Self {
        assert!(
            (0.0..=1.0).contains(&decay),
            "decay must lie in [0, 1], got {decay}"
        );
        assert!(
            percentiles.0 < percentiles.1,
            "low percentile must be below high"
        );
        Self {
            low: 0.0,
            high: 0.0,
            decay,
            percentiles,
            count: 0,
        }
    }

    /// Fold one batch of values into the EMAs and return `(offset, scale)`.
    ///
    /// `offset` is the low-percentile EMA; `scale` is the EMA spread floored
    /// at 1. The EMAs start at zero and warm up over the first batches.
    pub fn update(&mut self, values: &[f32]) -> (f32, f32) {
        assert!(!values.is_empty(), "percentile update needs values");

        let mut sorted: Vec<f32> = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let lo = percentile(&sorted, self.percentiles.0);
        let hi = percentile(&sorted, self.percentiles.1);

        self.low = self.decay * self.low + (1.0 - self.decay) * lo;
        self.high = self.decay * self.high + (1.0 - self.decay) * hi;
        self.count += 1;

        (self.offset(), self.scale())
    }

    /// Low-percentile EMA, the value subtracted from return targets.
    pub fn offset(&self) -> f32 {
        self.low as f32
    }

    /// EMA spread floored at 1, the value return targets are divided by.
    pub fn scale(&self) -> f32 {
        (self.high - self.low).max(1.0) as f32
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.low = 0.0;
        self.high = 0.0;
        self.count = 0;
    }
}

/// Linear-interpolated percentile of an ascending-sorted slice.
fn percentile(sorted: &[f32], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0] as f64;
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 0.0) - 0.0).abs() < 1e-9);
        assert!((percentile(&sorted, 1.0) - 4.0).abs() < 1e-9);
        assert!((percentile(&sorted, 0.5) - 2.0).abs() < 1e-9);
        assert!((percentile(&sorted, 0.125) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_decay_one_is_idempotent() {
        let mut ema = RewardEma::new(1.0, (0.05, 0.95));
        let offset = ema.offset();
        let scale = ema.scale();

        // Batches must not move the state at decay 1.
        let (o1, s1) = ema.update(&[1000.0, 2000.0, 3000.0]);
        let (o2, s2) = ema.update(&[-50.0, 0.0, 50.0]);
        assert_eq!(offset, o1);
        assert_eq!(scale, s1);
        assert_eq!(o1, o2);
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_decay_zero_tracks_batch_exactly() {
        let mut ema = RewardEma::new(0.0, (0.05, 0.95));
        ema.update(&[0.0; 4]);

        let values: Vec<f32> = (0..101).map(|i| i as f32).collect();
        let (offset, scale) = ema.update(&values);
        assert!((offset - 5.0).abs() < 1e-4);
        assert!((scale - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_scale_floored_at_one() {
        let mut ema = RewardEma::new(0.0, (0.05, 0.95));
        let (_, scale) = ema.update(&[0.1, 0.11, 0.12, 0.13]);
        assert_eq!(scale, 1.0);
    }

    #[test]
    fn test_ema_converges_toward_percentiles() {
        let mut ema = RewardEma::new(0.9, (0.05, 0.95));
        let values: Vec<f32> = (0..101).map(|i| i as f32).collect();
        for _ in 0..200 {
            ema.update(&values);
        }
        assert!((ema.offset() - 5.0).abs() < 1e-2);
        assert!((ema.scale() - 90.0).abs() < 1e-1);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut ema = RewardEma::new(0.99, (0.05, 0.95));
        ema.update(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ema.count(), 1);
        ema.reset();
        assert_eq!(ema.count(), 0);
        assert_eq!(ema.offset(), 0.0);
        assert_eq!(ema.scale(), 1.0);
    }
}
