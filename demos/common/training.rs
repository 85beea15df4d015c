use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::optim::SgdConfig;
use burn::prelude::*;
use burn_lenet_ptb::mnist::{MnistBatch, MnistBatcher, MnistDataset};
use burn_lenet_ptb::schedule::LrSchedule;
use burn_lenet_ptb::utils::metrics::Accuracy;
use std::sync::Arc;

/// Step-based training of the MNIST classifiers.
#[derive(Config, Debug)]
pub struct MnistTrainingConfig {
    /// Indexed by the global step.
    pub lr: LrSchedule,
    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 10000)]
    pub num_steps: usize,
    /// L2 penalty over the weights, zero to disable.
    #[config(default = 0.0)]
    pub regularization_rate: f64,
    /// Decay of the exponential moving average of the parameters, if one is kept.
    #[config(default = "None")]
    pub moving_average_decay: Option<f64>,
    /// Steps between two progress reports.
    #[config(default = 1000)]
    pub log_interval: usize,
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 0)]
    pub seed: u64,
}

/// Plain gradient descent, as used by every demo.
pub fn optimizer_config() -> SgdConfig {
    SgdConfig::new()
}

pub type MnistLoader<B> = Arc<dyn DataLoader<B, MnistBatch<B>> + 'static>;

pub fn mnist_loader<B: Backend>(
    dataset: MnistDataset,
    batch_size: usize,
    num_workers: usize,
    shuffle: Option<u64>,
) -> MnistLoader<B> {
    let builder = DataLoaderBuilder::new(MnistBatcher::default())
        .batch_size(batch_size)
        .num_workers(num_workers);
    match shuffle {
        Some(seed) => builder.shuffle(seed).build(dataset),
        None => builder.build(dataset),
    }
}

/// Accuracy of `logits` over a whole split.
pub fn evaluate<B: Backend>(
    dataloader: &dyn DataLoader<B, MnistBatch<B>>,
    logits: impl Fn(&MnistBatch<B>) -> Tensor<B, 2>,
) -> f64 {
    let mut accuracy = Accuracy::default();
    for batch in dataloader.iter() {
        accuracy.update(logits(&batch), batch.targets);
    }
    accuracy.value()
}
