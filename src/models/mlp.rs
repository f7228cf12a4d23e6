//! Plain fully-connected stack used by the encoder, heads, and actor.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration for [`Mlp`].
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    pub d_output: usize,
    pub hidden_layers: usize,
}

impl MlpConfig {
    pub fn new(d_input: usize, d_hidden: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_hidden,
            d_output,
            hidden_layers: 2,
        }
    }

    pub fn with_hidden_layers(mut self, hidden_layers: usize) -> Self {
        self.hidden_layers = hidden_layers;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        assert!(self.hidden_layers >= 1, "need at least one hidden layer");
        let mut hidden = Vec::with_capacity(self.hidden_layers);
        let mut d_in = self.d_input;
        for _ in 0..self.hidden_layers {
            hidden.push(LinearConfig::new(d_in, self.d_hidden).init(device));
            d_in = self.d_hidden;
        }
        let output = LinearConfig::new(d_in, self.d_output).init(device);
        Mlp { hidden, output }
    }
}

/// ReLU MLP: `hidden_layers` hidden layers followed by a linear output.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    /// `[batch, d_input]` to `[batch, d_output]`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.hidden {
            x = relu(layer.forward(x));
        }
        self.output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_mlp_output_shape() {
        let device = Default::default();
        let mlp = MlpConfig::new(6, 16, 3).init::<B>(&device);
        let x = Tensor::<B, 2>::zeros([5, 6], &device);
        assert_eq!(mlp.forward(x).dims(), [5, 3]);
    }

    #[test]
    fn test_mlp_extra_layers() {
        let device = Default::default();
        let mlp = MlpConfig::new(4, 8, 2).with_hidden_layers(3).init::<B>(&device);
        let x = Tensor::<B, 2>::zeros([1, 4], &device);
        assert_eq!(mlp.forward(x).dims(), [1, 2]);
    }
}
