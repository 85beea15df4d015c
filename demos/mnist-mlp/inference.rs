use crate::common::{
    cli::AppArgs,
    training::{evaluate, mnist_loader},
};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn_lenet_ptb::mlp::{MlpCheckpoint, MlpConfig};
use burn_lenet_ptb::mnist::MnistDataset;

/// Validation accuracy of the moving average kept in the latest checkpoint.
pub fn infer<B: Backend>(
    model_config: &MlpConfig,
    dataset: MnistDataset,
    device: B::Device,
    app_args: &AppArgs,
) {
    let checkpointer = app_args.checkpointer();
    let Some((step, checkpoint)) = checkpointer
        .load_latest(MlpCheckpoint::<B>::init(model_config, &device), &device)
        .expect("Failed to load the checkpoint")
    else {
        println!("No checkpoint file found");
        return;
    };
    let model = checkpoint.average;

    // the whole split in one batch
    let batch_size = dataset.len().max(1);
    let dataloader = mnist_loader::<B>(dataset, batch_size, 1, None);
    let accuracy = evaluate(dataloader.as_ref(), |batch| {
        model.forward(batch.images_flat())
    });
    println!("After {step} training step(s), validation accuracy = {accuracy}");
}
