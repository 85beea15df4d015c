use burn::module::Param;
use burn::nn::Linear;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Rounds of resampling before the remaining outliers are clamped.
const RESAMPLE_ROUNDS: usize = 8;

/// Samples a zero-mean normal distribution, truncated at two standard deviations.
///
/// Values falling outside of `[-2 * std, 2 * std]` are redrawn. After a few rounds the
/// (vanishingly rare) survivors are clamped into range.
pub fn truncated_normal<B: Backend, const D: usize>(
    shape: [usize; D],
    std: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    let bound = 2. * std;
    let mut x: Tensor<B, D> = Tensor::random(shape, Distribution::Normal(0., std), device);
    for _ in 0..RESAMPLE_ROUNDS {
        let out_of_range = x.clone().abs().greater_elem(bound);
        let redraw = Tensor::random(shape, Distribution::Normal(0., std), device);
        x = x.mask_where(out_of_range, redraw);
    }
    x.clamp(-bound, bound)
}

/// A tensor of the given shape with every value set to `value`.
pub fn constant<B: Backend, const D: usize>(
    shape: [usize; D],
    value: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::full(shape, value, device)
}

/// A fully connected layer with truncated normal weights and constant biases.
///
/// # Shapes
/// - weight: [d_input, d_output]
/// - bias: [d_output]
pub fn truncated_linear<B: Backend>(
    d_input: usize,
    d_output: usize,
    std: f64,
    bias: f64,
    device: &B::Device,
) -> Linear<B> {
    Linear {
        weight: Param::from_tensor(truncated_normal([d_input, d_output], std, device)),
        bias: Some(Param::from_tensor(constant([d_output], bias, device))),
    }
}

/// A 2d convolution with truncated normal kernels and constant biases.
///
/// All the other settings (padding, stride, ...) are taken from `config`.
pub fn truncated_conv2d<B: Backend>(
    config: &Conv2dConfig,
    std: f64,
    bias: f64,
    device: &B::Device,
) -> Conv2d<B> {
    let [channels_in, channels_out] = config.channels;
    let [kernel_h, kernel_w] = config.kernel_size;
    let mut conv = config.init(device);
    conv.weight = Param::from_tensor(truncated_normal(
        [channels_out, channels_in / config.groups, kernel_h, kernel_w],
        std,
        device,
    ));
    conv.bias = config
        .bias
        .then(|| Param::from_tensor(constant([channels_out], bias, device)));
    conv
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    type B = NdArray<f32>;

    #[test]
    fn truncated_normal_stays_within_two_stddev() {
        let device = Default::default();
        let x = truncated_normal::<B, 2>([64, 64], 0.1, &device);
        assert_eq!([64, 64], x.dims());

        let max: f32 = x.clone().abs().max().into_scalar().elem();
        assert!(max <= 0.2 + 1e-6, "max abs {max}");

        // not collapsed into a constant
        let std: f32 = x.var(0).mean().sqrt().into_scalar().elem();
        assert!(std > 0.05 && std < 0.1, "std {std}");
    }

    #[test]
    fn truncated_layers_have_the_expected_shapes() {
        let device = Default::default();
        let linear = truncated_linear::<B>(784, 500, 0.1, 0., &device);
        assert_eq!([784, 500], linear.weight.dims());
        assert_eq!([500], linear.bias.unwrap().dims());

        let config = Conv2dConfig::new([6, 16], [5, 5]);
        let conv = truncated_conv2d::<B>(&config, 0.1, 0.1, &device);
        assert_eq!([16, 6, 5, 5], conv.weight.dims());
        let bias = conv.bias.unwrap().val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(bias.len(), 16);
        assert!(bias.iter().all(|b| (b - 0.1).abs() < 1e-7));
    }

    #[test]
    fn constant_fills_every_value() {
        let device = Default::default();
        let x = constant::<B, 1>([6], 0.1, &device);
        let values = x.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 0.1).abs() < 1e-7));
    }
}
