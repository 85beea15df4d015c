//! Fully connected MNIST classifier: one ReLU hidden layer between the flattened image and
//! the class logits.

use crate::model::ModelConfigExt;
use crate::schedule::LrSchedule;
use crate::train::{on_interval, sgd_step};
use crate::utils::ema::ExponentialMovingAverage;
use crate::utils::init::truncated_linear;
use burn::module::AutodiffModule;
use burn::nn::Linear;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::backend::AutodiffBackend;
use burn::train::ClassificationOutput;

#[derive(Config, Debug)]
pub struct MlpConfig {
    #[config(default = 784)]
    pub input_nodes: usize,
    #[config(default = 500)]
    pub layer1_nodes: usize,
    #[config(default = 10)]
    pub output_nodes: usize,
    /// Standard deviation of the truncated normal weight initialization.
    /// Biases start at zero.
    #[config(default = 0.1)]
    pub init_stddev: f64,
}

#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    /// Input channel: input_nodes.
    /// Output channel: layer1_nodes.
    pub layer1: Linear<B>,
    /// Input channel: layer1_nodes.
    /// Output channel: output_nodes.
    pub layer2: Linear<B>,
}

impl MlpConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        Mlp {
            layer1: truncated_linear(
                self.input_nodes,
                self.layer1_nodes,
                self.init_stddev,
                0.,
                device,
            ),
            layer2: truncated_linear(
                self.layer1_nodes,
                self.output_nodes,
                self.init_stddev,
                0.,
                device,
            ),
        }
    }
}

impl<B: Backend> ModelConfigExt<B> for MlpConfig {
    type Model = Mlp<B>;
    fn init(&self, device: &B::Device) -> Self::Model {
        MlpConfig::init(self, device)
    }
}

impl<B: Backend> Mlp<B> {
    /// # Shapes
    ///   - Input [batch, input_nodes]
    ///   - Output [batch, output_nodes]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.layer1.forward(x));
        self.layer2.forward(x)
    }

    /// L2 regularization over the weight matrices (biases excluded):
    /// `rate * sum(w²) / 2`.
    pub fn l2_penalty(&self, rate: f64) -> Tensor<B, 1> {
        let layer1 = self.layer1.weight.val().powi_scalar(2).sum();
        let layer2 = self.layer2.weight.val().powi_scalar(2).sum();
        (layer1 + layer2) * (rate / 2.)
    }

    /// Mean cross entropy plus the L2 penalty.
    ///
    /// # Shapes
    ///   - images [batch, input_nodes]
    ///   - targets [batch]
    pub fn forward_classification(
        &self,
        images: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
        regularization_rate: f64,
    ) -> ClassificationOutput<B> {
        let [batch_size, _input_nodes] = images.dims();
        assert_eq!([batch_size], targets.dims());

        let output = self.forward(images);
        let cross_entropy = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());
        let loss = cross_entropy + self.l2_penalty(regularization_rate);

        ClassificationOutput::new(loss, output, targets)
    }
}

/// What a checkpoint holds: the trained parameters and their moving average.
///
/// Without a moving average, both hold the trained parameters.
#[derive(Module, Debug)]
pub struct MlpCheckpoint<B: Backend> {
    pub model: Mlp<B>,
    pub average: Mlp<B>,
}

impl<B: Backend> MlpCheckpoint<B> {
    /// Freshly initialized checkpoint, to load a saved one into.
    pub fn init(config: &MlpConfig, device: &B::Device) -> Self {
        Self {
            model: config.init(device),
            average: config.init(device),
        }
    }
}

/// Result of [`MlpTrainer::step`].
pub struct MlpStep<B: AutodiffBackend> {
    /// One-based number of the step just taken.
    pub step: usize,
    pub output: ClassificationOutput<B>,
    /// Set every `log_interval` steps, starting with the first one.
    pub checkpoint: Option<MlpCheckpoint<B::InnerBackend>>,
}

type Shadow<B> = ExponentialMovingAverage<
    <B as AutodiffBackend>::InnerBackend,
    Mlp<<B as AutodiffBackend>::InnerBackend>,
>;

/// Gradient steps over the regularized loss, with a decaying learning rate and an
/// optional moving average of the parameters.
pub struct MlpTrainer<B: AutodiffBackend, O> {
    model: Mlp<B>,
    optim: O,
    average: Option<Shadow<B>>,
    lr: LrSchedule,
    regularization_rate: f64,
    log_interval: usize,
    steps_done: usize,
}

impl<B: AutodiffBackend, O: Optimizer<Mlp<B>, B>> MlpTrainer<B, O> {
    pub fn new(
        model: Mlp<B>,
        optim: O,
        moving_average_decay: Option<f64>,
        lr: LrSchedule,
        regularization_rate: f64,
        log_interval: usize,
    ) -> Self {
        let average = moving_average_decay
            .map(|decay| ExponentialMovingAverage::new(decay, model.valid()));
        Self {
            model,
            optim,
            average,
            lr,
            regularization_rate,
            log_interval,
            steps_done: 0,
        }
    }

    pub fn model(&self) -> &Mlp<B> {
        &self.model
    }

    pub fn steps_done(&self) -> usize {
        self.steps_done
    }

    /// Learning rate of the next step.
    pub fn lr(&self) -> f64 {
        self.lr.lr(self.steps_done)
    }

    pub fn checkpoint(&self) -> MlpCheckpoint<B::InnerBackend> {
        let model = self.model.valid();
        let average = match &self.average {
            Some(average) => average.shadow().clone(),
            None => model.clone(),
        };
        MlpCheckpoint { model, average }
    }

    /// One gradient step on a batch, followed by the moving average update.
    ///
    /// # Shapes
    ///   - images [batch, input_nodes]
    ///   - targets [batch]
    pub fn step(&mut self, images: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> MlpStep<B> {
        let lr = self.lr();
        let output = self
            .model
            .forward_classification(images, targets, self.regularization_rate);
        self.model = sgd_step(
            self.model.clone(),
            output.loss.clone(),
            &mut self.optim,
            lr,
            None,
        );
        if let Some(average) = &mut self.average {
            // decay warm-up counts the updates done before this one
            average.update(self.steps_done, &self.model.valid());
        }

        let index = self.steps_done;
        self.steps_done += 1;
        let checkpoint = on_interval(index, self.log_interval).then(|| self.checkpoint());
        MlpStep {
            step: self.steps_done,
            output,
            checkpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpointer;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::SgdConfig;
    use burn::tensor::ElementConversion;

    type B = NdArray<f32>;
    type AutoB = Autodiff<B>;

    fn weights<Bk: Backend>(model: &Mlp<Bk>) -> Vec<f32> {
        model.layer1.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    fn tiny_config() -> MlpConfig {
        MlpConfig::new()
            .with_input_nodes(4)
            .with_layer1_nodes(3)
            .with_output_nodes(2)
    }

    fn trainer(
        decay: Option<f64>,
        log_interval: usize,
    ) -> MlpTrainer<AutoB, impl Optimizer<Mlp<AutoB>, AutoB>> {
        let device = Default::default();
        let model: Mlp<AutoB> = tiny_config().init(&device);
        let optim = SgdConfig::new().init::<AutoB, Mlp<AutoB>>();
        MlpTrainer::new(
            model,
            optim,
            decay,
            LrSchedule::Constant { lr: 0.5 },
            1e-4,
            log_interval,
        )
    }

    fn batch() -> (Tensor<AutoB, 2>, Tensor<AutoB, 1, Int>) {
        let device = Default::default();
        let images = Tensor::from_floats([[1., 0., 0., 1.], [0., 1., 1., 0.]], &device);
        let targets = Tensor::from_ints([0, 1], &device);
        (images, targets)
    }

    #[test]
    fn shapes() {
        let device = Default::default();
        let model: Mlp<B> = MlpConfig::new().init(&device);
        assert_eq!([784, 500], model.layer1.weight.dims());
        assert_eq!([500, 10], model.layer2.weight.dims());

        let logits = model.forward(Tensor::zeros([3, 784], &device));
        assert_eq!([3, 10], logits.dims());
    }

    #[test]
    fn biases_start_at_zero() {
        let device = Default::default();
        let model: Mlp<B> = MlpConfig::new().init(&device);
        let bias = model.layer1.bias.unwrap().val().into_data().to_vec::<f32>().unwrap();
        assert!(bias.iter().all(|b| *b == 0.));
    }

    #[test]
    fn l2_penalty_covers_weights_only() {
        let device = Default::default();
        let model: Mlp<B> = MlpConfig::new()
            .with_input_nodes(2)
            .with_layer1_nodes(2)
            .with_output_nodes(1)
            .init(&device);
        let model = Mlp {
            layer1: Linear {
                weight: model.layer1.weight.map(|w| w.ones_like()),
                bias: model.layer1.bias.map(|b| b.map(|b| b.ones_like() * 100.)),
            },
            layer2: Linear {
                weight: model.layer2.weight.map(|w| w.ones_like() * 2.),
                bias: model.layer2.bias,
            },
        };
        // (4 * 1² + 2 * 2²) * 0.5 / 2
        let penalty: f32 = model.l2_penalty(0.5).into_scalar().elem();
        assert!((penalty - 3.).abs() < 1e-6, "penalty {penalty}");
    }

    #[test]
    fn checkpoints_at_the_first_step_of_each_interval() {
        let mut trainer = trainer(Some(0.99), 3);
        let mut saved = vec![];
        for _ in 0..7 {
            let (images, targets) = batch();
            let step = trainer.step(images, targets);
            if step.checkpoint.is_some() {
                saved.push(step.step);
            }
        }
        assert_eq!(saved, vec![1, 4, 7]);
        assert_eq!(trainer.steps_done(), 7);
    }

    #[test]
    fn checkpoint_keeps_the_average_next_to_the_model() {
        let dir = temp_dir::TempDir::new().unwrap();
        let device = Default::default();
        let mut checkpointer = Checkpointer::with_defaults(dir.path()).unwrap();

        let mut trainer = trainer(Some(0.99), 1000);
        let initial = weights(trainer.model());
        let (images, targets) = batch();
        let step = trainer.step(images, targets);
        let checkpoint = step.checkpoint.unwrap();
        let path = checkpointer.save(&checkpoint, step.step).unwrap();
        assert_eq!(
            path.file_stem().and_then(|stem| stem.to_str()),
            Some("model-1")
        );

        let (loaded_step, loaded) = checkpointer
            .load_latest(MlpCheckpoint::<B>::init(&tiny_config(), &device), &device)
            .unwrap()
            .unwrap();
        assert_eq!(loaded_step, 1);
        let model = weights(&loaded.model);
        let average = weights(&loaded.average);
        assert_eq!(model, weights(&checkpoint.model));
        assert_eq!(average, weights(&checkpoint.average));
        assert_ne!(model, initial);
        assert_ne!(average, model);
        // first update uses decay 1/10, so the average moved 90% of the way
        for ((avg, init), trained) in average.iter().zip(&initial).zip(&model) {
            let expected = 0.1 * init + 0.9 * trained;
            assert!((avg - expected).abs() < 1e-5, "{avg} != {expected}");
        }
    }

    #[test]
    fn without_average_the_checkpoint_repeats_the_model() {
        let mut trainer = trainer(None, 1);
        let (images, targets) = batch();
        let checkpoint = trainer.step(images, targets).checkpoint.unwrap();
        assert_eq!(weights(&checkpoint.average), weights(&checkpoint.model));
    }

    #[test]
    fn regularized_loss_is_larger() {
        let device = Default::default();
        let model: Mlp<B> = MlpConfig::new().init(&device);
        let images = Tensor::<B, 2>::ones([4, 784], &device) * 0.5;
        let targets = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 3], &device);

        let plain: f32 = model
            .forward_classification(images.clone(), targets.clone(), 0.)
            .loss
            .into_scalar()
            .elem();
        let regularized: f32 = model
            .forward_classification(images, targets, 1e-4)
            .loss
            .into_scalar()
            .elem();
        assert!(plain > 0.);
        assert!(regularized > plain);
    }
}
