use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_lenet_ptb::mlp::MlpConfig;
use burn_lenet_ptb::mnist::{MnistSplit, VALIDATION_SIZE};
use burn_lenet_ptb::schedule::LrSchedule;
pub use common::{
    backend::{MainAutoBackend, MainBackend, MainDevice},
    cli::AppArgs,
    training::MnistTrainingConfig,
};

pub mod inference;
pub mod training;

#[path = "../common/mod.rs"]
pub mod common;

/// Number of MNIST training items, before the validation split is taken out.
const MNIST_TRAIN_SIZE: usize = 60_000;

pub fn training_config() -> MnistTrainingConfig {
    let batch_size = 100;
    MnistTrainingConfig::new(LrSchedule::ExponentialDecay {
        base: 0.8,
        decay_rate: 0.99,
        // one decay per epoch
        decay_steps: (MNIST_TRAIN_SIZE - VALIDATION_SIZE) / batch_size,
        staircase: false,
    })
    .with_batch_size(batch_size)
    .with_num_steps(10000)
    .with_regularization_rate(1e-4)
    .with_moving_average_decay(Some(0.99))
    .with_log_interval(1000)
}

pub fn launch<B, AutoB>(app_args: &AppArgs)
where
    B: Backend + MainDevice,
    AutoB: AutodiffBackend + MainDevice,
{
    app_args.create_artifact_dir();

    // setup training and model configs
    let training_config = app_args
        .load_training_config()
        .unwrap_or_else(training_config);
    let model_config = app_args
        .load_model_config()
        .unwrap_or_else(MlpConfig::new);
    // save configs
    app_args.save_training_config(&training_config);
    app_args.save_model_config(&model_config);

    if app_args.training {
        let training_device = AutoB::main_device();
        let dataset = app_args.mnist(MnistSplit::Train);
        training::train::<AutoB>(
            &training_config,
            &model_config,
            dataset,
            training_device,
            app_args,
        );
    }

    if app_args.inference {
        let infer_device = B::main_device();
        let dataset = app_args.mnist(MnistSplit::Validation);
        inference::infer::<B>(&model_config, dataset, infer_device, app_args);
    }

    if !app_args.inference && !app_args.training {
        println!("neither training nor inference were enabled");
        println!("{}", common::cli::HELP);
    }
}

fn main() {
    let app_args = AppArgs::parse().expect("Failed to parse the arguments");
    launch::<MainBackend, MainAutoBackend>(&app_args);
}
