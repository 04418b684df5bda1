//! # Layer Utilities
//!
//! Shared initializers, norm defaults, and resolution arithmetic.
use burn::nn::conv::Conv2d;
use burn::nn::{BatchNormConfig, Initializer, Linear};
use burn::prelude::Backend;

/// ``he_normal``: Kaiming normal init for convolutions feeding a ReLU.
///
/// ``std = sqrt(2 / fan_in)``
pub const CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: false,
};

/// ``glorot_uniform``: Xavier uniform init for classifier heads.
pub const CLASSIFIER_INITIALIZER: Initializer = Initializer::XavierUniform { gain: 1.0 };

/// Batch norm epsilon used by the pre-activation and simple models.
pub const BATCH_NORM_EPSILON: f64 = 1e-3;

/// Batch norm running-stat momentum.
///
/// burn blends ``running = (1 - m) * running + m * batch``;
/// this matches a running-average decay of ``0.99``.
pub const BATCH_NORM_MOMENTUM: f64 = 0.01;

/// Build the default [`BatchNormConfig`] for `num_features` channels.
pub fn batch_norm_config(num_features: usize) -> BatchNormConfig {
    BatchNormConfig::new(num_features)
        .with_epsilon(BATCH_NORM_EPSILON)
        .with_momentum(BATCH_NORM_MOMENTUM)
}

/// Reset a [`Linear`] bias to zeros.
///
/// burn draws biases from the weight initializer; the classifier heads
/// start with zero bias.
pub fn zero_linear_bias<B: Backend>(mut linear: Linear<B>) -> Linear<B> {
    linear.bias = linear.bias.map(|bias| bias.map(|t| t.zeros_like()));
    linear
}

/// Reset a [`Conv2d`] bias to zeros.
pub fn zero_conv_bias<B: Backend>(mut conv: Conv2d<B>) -> Conv2d<B> {
    conv.bias = conv.bias.map(|bias| bias.map(|t| t.zeros_like()));
    conv
}

/// Output resolution of a ``same``-padded op with the given stride.
///
/// ``out = ceil(in / stride)``
#[inline(always)]
pub fn same_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    assert!(stride > 0, "stride must be positive");
    [
        input_resolution[0].div_ceil(stride),
        input_resolution[1].div_ceil(stride),
    ]
}

/// Output resolution of an explicitly padded conv or pool.
///
/// ``out = (in + 2 * padding - kernel) / stride + 1``
///
/// # Panics
///
/// If the padded input is smaller than the kernel.
pub fn padded_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
) -> [usize; 2] {
    let dim = |i: usize| {
        let padded = input_resolution[i] + 2 * padding[i];
        assert!(
            padded >= kernel_size[i],
            "input {:?} too small for kernel {:?}",
            input_resolution,
            kernel_size
        );
        (padded - kernel_size[i]) / stride[i] + 1
    };
    [dim(0), dim(1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::LinearConfig;
    use burn::nn::conv::Conv2dConfig;
    use hamcrest::prelude::*;

    #[test]
    fn test_same_output_resolution() {
        assert_eq!(same_output_resolution([32, 32], 1), [32, 32]);
        assert_eq!(same_output_resolution([32, 32], 2), [16, 16]);
        assert_eq!(same_output_resolution([7, 9], 2), [4, 5]);
    }

    #[test]
    fn test_padded_output_resolution() {
        assert_eq!(
            padded_output_resolution([75, 75], [3, 3], [2, 2], [0, 0]),
            [37, 37]
        );
        assert_eq!(
            padded_output_resolution([17, 17], [1, 7], [1, 1], [0, 3]),
            [17, 17]
        );
    }

    #[test]
    #[should_panic(expected = "too small for kernel")]
    fn test_padded_output_resolution_too_small() {
        padded_output_resolution([2, 2], [3, 3], [1, 1], [0, 0]);
    }

    #[test]
    fn test_zero_bias() {
        type B = NdArray<f32>;
        let device = Default::default();

        let linear: Linear<B> = LinearConfig::new(4, 3)
            .with_initializer(CLASSIFIER_INITIALIZER)
            .init(&device);
        let linear = zero_linear_bias(linear);
        let bias = linear.bias.unwrap().val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(bias, vec![0.0; 3]);

        let conv: Conv2d<B> = Conv2dConfig::new([2, 5], [3, 3])
            .with_initializer(CONV_INTO_RELU_INITIALIZER)
            .init(&device);
        let conv = zero_conv_bias(conv);
        let bias = conv.bias.unwrap().val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(bias, vec![0.0; 5]);

        let linear: Linear<B> = LinearConfig::new(4, 3).with_bias(false).init(&device);
        assert!(zero_linear_bias(linear).bias.is_none());
    }

    #[test]
    fn test_batch_norm_config() {
        let config = batch_norm_config(16);
        assert_eq!(config.num_features, 16);
        assert_that!(config.epsilon, is(close_to(1e-3, 1e-12)));
        assert_that!(config.momentum, is(close_to(0.01, 1e-12)));
    }
}
