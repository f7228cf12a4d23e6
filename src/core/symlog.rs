//! Symlog transforms and two-hot discrete regression.
//!
//! Rewards and values can span many orders of magnitude across tasks. The
//! symlog transform `sign(x) * ln(1 + |x|)` compresses large magnitudes while
//! staying identity-like near zero, and `symexp` inverts it. Scalar regression
//! targets are additionally spread over a fixed grid of bins as a "two-hot"
//! vector: all probability mass sits on the two bins bracketing the target,
//! split so the expectation recovers the target exactly.

use burn::prelude::*;

/// Lower edge of the two-hot bin grid, in symlog space.
pub const BIN_LOW: f32 = -20.0;
/// Upper edge of the two-hot bin grid, in symlog space.
pub const BIN_HIGH: f32 = 20.0;

/// `sign(x) * ln(1 + |x|)` elementwise.
pub fn symlog<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().sign() * (x.abs() + 1.0).log()
}

/// Inverse of [`symlog`]: `sign(x) * (exp(|x|) - 1)` elementwise.
pub fn symexp<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().sign() * (x.abs().exp() - 1.0)
}

/// Scalar [`symlog`].
pub fn symlog_scalar(x: f32) -> f32 {
    x.signum() * (x.abs() + 1.0).ln()
}

/// Scalar [`symexp`].
pub fn symexp_scalar(x: f32) -> f32 {
    x.signum() * (x.abs().exp() - 1.0)
}

/// Evenly spaced bin centers over `[BIN_LOW, BIN_HIGH]` in symlog space.
pub fn bin_centers(bins: usize) -> Vec<f32> {
    assert!(bins >= 2, "two-hot regression needs at least 2 bins");
    let step = (BIN_HIGH - BIN_LOW) / (bins - 1) as f32;
    (0..bins).map(|i| BIN_LOW + step * i as f32).collect()
}

/// Encode scalar targets `[N]` as two-hot vectors `[N, bins]`.
///
/// Targets are mapped to symlog space first, then clamped to the grid. The
/// returned rows sum to 1 and their expectation under `bin_centers` equals the
/// clamped symlog target.
pub fn two_hot_encode<B: Backend>(
    values: Tensor<B, 1>,
    bins: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let n = values.dims()[0];
    let step = (BIN_HIGH - BIN_LOW) / (bins - 1) as f32;

    let data = symlog(values).into_data();
    let vals = data.as_slice::<f32>().expect("contiguous f32 target data");

    let mut out = vec![0.0f32; n * bins];
    for (i, &v) in vals.iter().enumerate() {
        let v = v.clamp(BIN_LOW, BIN_HIGH);
        let pos = (v - BIN_LOW) / step;
        let lo = (pos.floor() as usize).min(bins - 1);
        let hi = (lo + 1).min(bins - 1);
        let frac = pos - lo as f32;
        out[i * bins + lo] += 1.0 - frac;
        out[i * bins + hi] += frac;
    }

    Tensor::<B, 1>::from_floats(out.as_slice(), device).reshape([n, bins])
}

/// Decode bin probabilities `[N, bins]` back to scalar predictions `[N]`.
///
/// Expectation over the symlog-space bin centers, then `symexp`.
pub fn two_hot_decode<B: Backend>(probs: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 1> {
    let [n, bins] = probs.dims();
    let centers = Tensor::<B, 1>::from_floats(bin_centers(bins).as_slice(), device)
        .reshape([1, bins])
        .repeat_dim(0, n);
    symexp((probs * centers).sum_dim(1).reshape([n]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_symlog_symexp_inverse() {
        let device = Default::default();
        let x = Tensor::<B, 1>::from_floats([-100.0, -1.5, 0.0, 0.3, 42.0], &device);
        let back = symexp(symlog(x.clone()));
        let orig = x.into_data();
        let round = back.into_data();
        let a = orig.as_slice::<f32>().unwrap();
        let b = round.as_slice::<f32>().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-3 * x.abs().max(1.0), "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_symlog_scalar() {
        assert!((symlog_scalar(7.5) - (8.5f32).ln()).abs() < 1e-6);
        assert!((symexp_scalar(symlog_scalar(-3.0)) + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_two_hot_rows_sum_to_one() {
        let device = Default::default();
        let values = Tensor::<B, 1>::from_floats([0.0, 1.0, -5.0, 1000.0], &device);
        let encoded = two_hot_encode(values, 31, &device);
        let sums = encoded.sum_dim(1).into_data();
        for s in sums.as_slice::<f32>().unwrap() {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_two_hot_round_trip() {
        let device = Default::default();
        let values = Tensor::<B, 1>::from_floats([0.0, 2.5, -7.0, 100.0], &device);
        let encoded = two_hot_encode(values.clone(), 255, &device);
        let decoded = two_hot_decode(encoded, &device).into_data();
        let orig = values.into_data();
        let a = orig.as_slice::<f32>().unwrap();
        let b = decoded.as_slice::<f32>().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            // Piecewise-linear in symlog space, so tolerance scales with magnitude.
            assert!((x - y).abs() < 0.05 * x.abs().max(1.0), "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_two_hot_exact_on_bin_center() {
        let device = Default::default();
        let centers = bin_centers(31);
        let target = symexp_scalar(centers[10]);
        let values = Tensor::<B, 1>::from_floats([target], &device);
        let encoded = two_hot_encode(values, 31, &device).into_data();
        let row = encoded.as_slice::<f32>().unwrap();
        assert!((row[10] - 1.0).abs() < 1e-4);
    }
}
