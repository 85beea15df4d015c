pub use crate::common::{
    cli::AppArgs,
    training::{MnistTrainingConfig, evaluate, mnist_loader},
};
use burn::prelude::*;
use burn::{
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
    train::metric::{Adaptor, AccuracyMetric, LossMetric, Metric, MetricMetadata, Numeric},
};
use burn_lenet_ptb::lenet::{LeNet, LeNetConfig};
use burn_lenet_ptb::mnist::{MnistDataset, MnistSplit};
use burn_lenet_ptb::train::{Steps, on_interval, sgd_step};

/// Evaluation batches are large, since there's no backward pass to keep.
const EVAL_BATCH_SIZE: usize = 1000;

pub fn train<AutoB: AutodiffBackend>(
    training_config: &MnistTrainingConfig,
    model_config: &LeNetConfig,
    training_device: AutoB::Device,
    app_args: &AppArgs,
) {
    AutoB::seed(&training_device, training_config.seed);

    let mut model: LeNet<AutoB> = model_config.init(&training_device);
    let mut optim = crate::common::training::optimizer_config().init::<AutoB, LeNet<AutoB>>();

    let dataloader_train = mnist_loader::<AutoB>(
        app_args.mnist(MnistSplit::Train),
        training_config.batch_size,
        training_config.num_workers,
        Some(training_config.seed),
    );
    let dataloader_valid = mnist_loader::<AutoB::InnerBackend>(
        app_args.mnist(MnistSplit::Validation),
        EVAL_BATCH_SIZE,
        training_config.num_workers,
        None,
    );
    let training_num_items = dataloader_train.num_items();

    let mut metric_meta = MetricMetadata {
        progress: burn::data::dataloader::Progress::new(0, training_num_items),
        epoch: 1,
        epoch_total: (training_config.num_steps * training_config.batch_size)
            .div_ceil(training_num_items.max(1)),
        iteration: 0,
        lr: None,
    };
    let mut loss_metric = LossMetric::<AutoB>::new();
    let mut acc_metric = AccuracyMetric::<AutoB>::new();

    println!("Starting training...");
    let mut steps = Steps::new(dataloader_train.as_ref(), training_config.num_steps);
    let mut step = 0;
    while let Some(batch) = steps.next() {
        if steps.epoch() != metric_meta.epoch {
            metric_meta.epoch = steps.epoch();
            metric_meta.progress.items_processed = 0;
        }
        let lr = training_config.lr.lr(step);
        let [batch_size] = batch.targets.dims();
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;
        metric_meta.lr = Some(lr);

        let output = model.forward_classification(batch.images_nchw(), batch.targets);
        loss_metric.update(&output.adapt(), &metric_meta);
        acc_metric.update(&output.adapt(), &metric_meta);

        model = sgd_step(model, output.loss, &mut optim, lr, None);

        if on_interval(step, training_config.log_interval) {
            let valid_model = model.valid();
            let accuracy = evaluate(dataloader_valid.as_ref(), |batch| {
                valid_model.forward(batch.images_nchw())
            });
            println!("After {step} steps, accuracy:{accuracy:.5}");
            println!(
                "Epoch {}/{}, Avg Loss {:.4}, Avg Train Acc {:.2}",
                metric_meta.epoch,
                metric_meta.epoch_total,
                loss_metric.running_value().current(),
                acc_metric.running_value().current(),
            );
        }
        step += 1;
    }
    println!("train finished!");

    let model = model.valid();
    app_args.save_model(&model);

    let accuracy = test_accuracy(&model, app_args.mnist(MnistSplit::Test), training_config);
    println!("Test accuracy:{accuracy:.5}");
}

pub fn test_accuracy<B: Backend>(
    model: &LeNet<B>,
    dataset: MnistDataset,
    training_config: &MnistTrainingConfig,
) -> f64 {
    let dataloader = mnist_loader::<B>(dataset, EVAL_BATCH_SIZE, training_config.num_workers, None);
    evaluate(dataloader.as_ref(), |batch| model.forward(batch.images_nchw()))
}
