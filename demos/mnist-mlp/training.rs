pub use crate::common::{
    cli::AppArgs,
    training::{MnistTrainingConfig, mnist_loader},
};
use burn::prelude::*;
use burn::{
    tensor::backend::AutodiffBackend,
    train::metric::{Adaptor, LossMetric, Metric, MetricMetadata, Numeric},
};
use burn_lenet_ptb::mlp::{Mlp, MlpConfig, MlpTrainer};
use burn_lenet_ptb::mnist::MnistDataset;
use burn_lenet_ptb::train::Steps;

pub fn train<AutoB: AutodiffBackend>(
    training_config: &MnistTrainingConfig,
    model_config: &MlpConfig,
    dataset: MnistDataset,
    training_device: AutoB::Device,
    app_args: &AppArgs,
) {
    AutoB::seed(&training_device, training_config.seed);

    let model: Mlp<AutoB> = model_config.init(&training_device);
    let optim = crate::common::training::optimizer_config().init::<AutoB, Mlp<AutoB>>();
    let mut trainer = MlpTrainer::new(
        model,
        optim,
        training_config.moving_average_decay,
        training_config.lr.clone(),
        training_config.regularization_rate,
        training_config.log_interval,
    );
    let mut checkpointer = app_args.checkpointer();

    let dataloader_train = mnist_loader::<AutoB>(
        dataset,
        training_config.batch_size,
        training_config.num_workers,
        Some(training_config.seed),
    );
    let training_num_items = dataloader_train.num_items();
    let epoch_total = (training_config.num_steps * training_config.batch_size)
        .div_ceil(training_num_items.max(1));

    let mut metric_meta = MetricMetadata {
        progress: burn::data::dataloader::Progress::new(0, training_num_items),
        epoch: 1,
        epoch_total,
        iteration: 0,
        lr: None,
    };
    let mut loss_metric = LossMetric::<AutoB>::new();

    println!("Starting training...");
    let mut steps = Steps::new(dataloader_train.as_ref(), training_config.num_steps);
    while let Some(batch) = steps.next() {
        if steps.epoch() != metric_meta.epoch {
            metric_meta.epoch = steps.epoch();
            metric_meta.progress.items_processed = 0;
        }
        let [batch_size] = batch.targets.dims();
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;
        metric_meta.lr = Some(trainer.lr());

        let step = trainer.step(batch.images_flat(), batch.targets);
        loss_metric.update(&step.output.adapt(), &metric_meta);

        if let Some(checkpoint) = step.checkpoint {
            println!(
                "After {} steps, loss on train batch is {}",
                step.step,
                loss_metric.value().current()
            );
            checkpointer
                .save(&checkpoint, step.step)
                .expect("Failed to save the checkpoint");
        }
    }

    println!(
        "Epoch {}/{}, Avg Loss {:.4}",
        metric_meta.epoch,
        metric_meta.epoch_total,
        loss_metric.running_value().current(),
    );
    println!("Training finished.");
}
