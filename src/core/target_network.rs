//! Slow-network parameter updates.
//!
//! The critic regresses toward targets bootstrapped from a slow copy of
//! itself. The copy is refreshed by mixing online parameters into it:
//!
//! ```text
//! θ_slow = fraction * θ_online + (1 - fraction) * θ_slow
//! ```
//!
//! `fraction = 1` is a hard copy. Parameters are matched by module traversal
//! order, so the online and slow networks only need the same architecture,
//! not shared `ParamId`s.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;
use std::cell::RefCell;

/// A parameter flattened to 1D so tensors of mixed rank share one collection.
struct FlattenedParam<B: Backend> {
    tensor: Tensor<B, 1>,
}

/// Collects every float parameter of a module in traversal order.
struct ParamExtractor<B: Backend> {
    params: Vec<FlattenedParam<B>>,
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let total_size: usize = val.dims().iter().product();
        self.params.push(FlattenedParam {
            tensor: val.clone().reshape([total_size]),
        });
        param
    }
}

/// Mixes collected online parameters into the visited (slow) module.
struct MixMapper<B: Backend> {
    online_params: Vec<FlattenedParam<B>>,
    fraction: f32,
    index: RefCell<usize>,
}

impl<B: Backend> ModuleMapper<B> for MixMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let slow_val = param.val();
        let shape = slow_val.dims();
        let total_size: usize = shape.iter().product();

        let idx = *self.index.borrow();
        *self.index.borrow_mut() = idx + 1;

        if let Some(online) = self.online_params.get(idx) {
            let mixed = online.tensor.clone().mul_scalar(self.fraction)
                + slow_val.reshape([total_size]).mul_scalar(1.0 - self.fraction);
            Param::initialized(param.id.clone(), mixed.reshape(shape))
        } else {
            // Architectures diverged; leave the slow parameter as-is.
            param
        }
    }
}

/// Mix online parameters into `slow` and return the updated module.
///
/// `fraction = 1` short-cuts to a clone of `online`; `fraction = 0` returns
/// `slow` unchanged.
pub fn mix_parameters<B, M>(online: &M, slow: M, fraction: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if (fraction - 1.0).abs() < 1e-6 {
        return online.clone();
    }
    if fraction.abs() < 1e-6 {
        return slow;
    }

    let mut extractor = ParamExtractor { params: Vec::new() };
    let _ = online.clone().map(&mut extractor);

    let mut mixer = MixMapper {
        online_params: extractor.params,
        fraction,
        index: RefCell::new(0),
    };
    slow.map(&mut mixer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::LinearConfig;

    type TestBackend = NdArray<f32>;

    fn weights(linear: &burn::nn::Linear<TestBackend>) -> Vec<f32> {
        linear
            .weight
            .val()
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_fraction_zero_keeps_slow() {
        let device = Default::default();
        let online = LinearConfig::new(4, 4).init::<TestBackend>(&device);
        let slow = LinearConfig::new(4, 4).init::<TestBackend>(&device);
        let before = weights(&slow);

        let updated = mix_parameters::<TestBackend, _>(&online, slow, 0.0);
        assert_eq!(weights(&updated), before);
    }

    #[test]
    fn test_fraction_one_copies_online() {
        let device = Default::default();
        let online = LinearConfig::new(4, 4).init::<TestBackend>(&device);
        let slow = LinearConfig::new(4, 4).init::<TestBackend>(&device);

        let updated = mix_parameters::<TestBackend, _>(&online, slow, 1.0);
        assert_eq!(weights(&updated), weights(&online));
    }

    #[test]
    fn test_interpolation() {
        let device = Default::default();
        let online = LinearConfig::new(4, 4).init::<TestBackend>(&device);
        let slow = LinearConfig::new(4, 4).init::<TestBackend>(&device);

        let o = weights(&online);
        let s = weights(&slow);
        let fraction = 0.25f32;
        let updated = mix_parameters::<TestBackend, _>(&online, slow, fraction);

        for (i, u) in weights(&updated).iter().enumerate() {
            let expected = fraction * o[i] + (1.0 - fraction) * s[i];
            assert!((u - expected).abs() < 1e-5, "index {i}");
        }
    }

    #[test]
    fn test_bias_also_mixed() {
        let device = Default::default();
        let online = LinearConfig::new(4, 4)
            .with_bias(true)
            .init::<TestBackend>(&device);
        let slow = LinearConfig::new(4, 4)
            .with_bias(true)
            .init::<TestBackend>(&device);

        let o = online.bias.as_ref().unwrap().val().into_data();
        let s = slow.bias.as_ref().unwrap().val().into_data();
        let o = o.as_slice::<f32>().unwrap();
        let s = s.as_slice::<f32>().unwrap();

        let updated = mix_parameters::<TestBackend, _>(&online, slow, 0.5);
        let u = updated.bias.as_ref().unwrap().val().into_data();
        for (i, u) in u.as_slice::<f32>().unwrap().iter().enumerate() {
            let expected = 0.5 * o[i] + 0.5 * s[i];
            assert!((u - expected).abs() < 1e-5, "bias index {i}");
        }
    }
}
