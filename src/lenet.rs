//! LeNet-style convolutional MNIST classifier:
//! conv → relu → pool → conv → relu → pool → fully connected → relu → fully connected.

use crate::model::ModelConfigExt;
use crate::utils::init::{truncated_conv2d, truncated_linear};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Linear, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::train::ClassificationOutput;

#[derive(Config, Debug)]
pub struct LeNetConfig {
    /// Side of the (square) input image.
    #[config(default = 28)]
    pub input_size: usize,
    #[config(default = 1)]
    pub input_channels: usize,
    /// Side of the (square) convolution kernels.
    #[config(default = 5)]
    pub conv_size: usize,
    /// Depth of the first convolution.
    #[config(default = 6)]
    pub layer1_channels: usize,
    /// Depth of the second convolution.
    #[config(default = 16)]
    pub layer2_channels: usize,
    #[config(default = 2)]
    pub pool_size: usize,
    #[config(default = 2)]
    pub pool_stride: usize,
    /// Nodes of the hidden fully connected layer.
    #[config(default = 512)]
    pub fc_nodes: usize,
    #[config(default = 10)]
    pub output_nodes: usize,
    /// Standard deviation of the truncated normal weight initialization.
    #[config(default = 0.1)]
    pub init_stddev: f64,
    /// Initial value of every bias.
    #[config(default = 0.1)]
    pub init_bias: f64,
}

impl LeNetConfig {
    /// Side of the feature maps after one pooling.
    ///
    /// Pooling windows never overhang the feature map (VALID pooling), so odd sides lose
    /// their last row and column. With the default 28x28 images and 2x2 windows this is the
    /// same as zero-padded (SAME) pooling: 28 → 14 → 7.
    fn pooled(&self, size: usize) -> Option<usize> {
        let reach = size.checked_sub(self.pool_size)?;
        Some(reach / self.pool_stride + 1)
    }

    /// Number of features fed into the first fully connected layer, or `None` when the
    /// input is too small for both poolings.
    pub fn flat_features(&self) -> Option<usize> {
        let side = self.pooled(self.pooled(self.input_size)?)?;
        Some(side * side * self.layer2_channels)
    }

    /// Returns the initialized model.
    ///
    /// # Panics
    /// If `input_size` can't go through both poolings.
    pub fn init<B: Backend>(&self, device: &B::Device) -> LeNet<B> {
        let flat_features = self.flat_features().unwrap_or_else(|| {
            panic!(
                "input_size {} is too small for two {}x{} poolings",
                self.input_size, self.pool_size, self.pool_size
            )
        });
        let conv = |channels_in: usize, channels_out: usize| {
            let config = Conv2dConfig::new(
                [channels_in, channels_out],
                [self.conv_size, self.conv_size],
            )
            .with_padding(PaddingConfig2d::Same);
            truncated_conv2d(&config, self.init_stddev, self.init_bias, device)
        };
        let pool = || {
            MaxPool2dConfig::new([self.pool_size, self.pool_size])
                .with_strides([self.pool_stride, self.pool_stride])
                .init()
        };

        LeNet {
            conv1: conv(self.input_channels, self.layer1_channels),
            pool1: pool(),
            conv2: conv(self.layer1_channels, self.layer2_channels),
            pool2: pool(),
            fc1: truncated_linear(
                flat_features,
                self.fc_nodes,
                self.init_stddev,
                self.init_bias,
                device,
            ),
            fc2: truncated_linear(
                self.fc_nodes,
                self.output_nodes,
                self.init_stddev,
                self.init_bias,
                device,
            ),
        }
    }
}

impl<B: Backend> ModelConfigExt<B> for LeNetConfig {
    type Model = LeNet<B>;
    fn init(&self, device: &B::Device) -> Self::Model {
        LeNetConfig::init(self, device)
    }
}

#[derive(Module, Debug)]
pub struct LeNet<B: Backend> {
    /// Input channel: input_channels.
    /// Output channel: layer1_channels.
    pub conv1: Conv2d<B>,
    pub pool1: MaxPool2d,
    /// Input channel: layer1_channels.
    /// Output channel: layer2_channels.
    pub conv2: Conv2d<B>,
    pub pool2: MaxPool2d,
    /// Input channel: flattened layer2 feature maps.
    /// Output channel: fc_nodes.
    pub fc1: Linear<B>,
    /// Input channel: fc_nodes.
    /// Output channel: output_nodes.
    pub fc2: Linear<B>,
}

impl<B: Backend> LeNet<B> {
    /// # Shapes
    ///   - Input [batch, input_channels, input_size, input_size]
    ///   - Output [batch, output_nodes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _channels, _height, _width] = images.dims();

        let x = self.pool1.forward(relu(self.conv1.forward(images)));
        let x = self.pool2.forward(relu(self.conv2.forward(x)));
        let [_batch_size, channels, height, width] = x.dims();

        let x = x.reshape([batch_size, channels * height * width]);
        let x = relu(self.fc1.forward(x));
        self.fc2.forward(x)
    }

    /// Mean cross entropy.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let [batch_size, _channels, _height, _width] = images.dims();
        assert_eq!([batch_size], targets.dims());

        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn feature_maps_halve_twice() {
        let config = LeNetConfig::new();
        assert_eq!(config.pooled(28), Some(14));
        assert_eq!(config.pooled(14), Some(7));
        assert_eq!(config.flat_features(), Some(7 * 7 * 16));
    }

    #[test]
    fn odd_sides_drop_the_last_row() {
        let config = LeNetConfig::new().with_input_size(15);
        assert_eq!(config.pooled(15), Some(7));
        assert_eq!(config.pooled(7), Some(3));
        assert_eq!(config.flat_features(), Some(3 * 3 * 16));
    }

    #[test]
    fn too_small_inputs_have_no_features() {
        let config = LeNetConfig::new().with_input_size(2);
        assert_eq!(config.pooled(1), None);
        assert_eq!(config.flat_features(), None);
        assert_eq!(LeNetConfig::new().with_input_size(0).flat_features(), None);
    }

    #[test]
    #[should_panic(expected = "too small")]
    fn init_rejects_too_small_inputs() {
        let device = Default::default();
        let _model: LeNet<B> = LeNetConfig::new().with_input_size(3).init(&device);
    }

    #[test]
    fn same_padding_keeps_the_image_size() {
        let device = Default::default();
        let model: LeNet<B> = LeNetConfig::new().init(&device);
        let images = Tensor::<B, 4>::zeros([2, 1, 28, 28], &device);

        let x = relu(model.conv1.forward(images));
        assert_eq!([2, 6, 28, 28], x.dims());
        let x = model.pool1.forward(x);
        assert_eq!([2, 6, 14, 14], x.dims());
        let x = model.pool2.forward(model.conv2.forward(x));
        assert_eq!([2, 16, 7, 7], x.dims());
    }

    #[test]
    fn logits_per_class() {
        let device = Default::default();
        let model: LeNet<B> = LeNetConfig::new().init(&device);
        let images = Tensor::<B, 4>::ones([3, 1, 28, 28], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1, 2, 3], &device);

        let output = model.forward_classification(images, targets);
        assert_eq!([3, 10], output.output.dims());
        assert_eq!([1], output.loss.dims());
    }
}
