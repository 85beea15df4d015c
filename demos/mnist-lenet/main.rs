use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_lenet_ptb::lenet::LeNetConfig;
use burn_lenet_ptb::mnist::MnistSplit;
use burn_lenet_ptb::schedule::LrSchedule;
pub use common::{
    backend::{MainAutoBackend, MainBackend, MainDevice},
    cli::AppArgs,
    training::MnistTrainingConfig,
};

pub mod training;

#[path = "../common/mod.rs"]
pub mod common;

pub fn training_config() -> MnistTrainingConfig {
    MnistTrainingConfig::new(LrSchedule::Constant { lr: 0.01 })
        .with_batch_size(128)
        .with_num_steps(10000)
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
        .unwrap_or_else(LeNetConfig::new);
    // save configs
    app_args.save_training_config(&training_config);
    app_args.save_model_config(&model_config);

    if app_args.training {
        let training_device = AutoB::main_device();
        training::train::<AutoB>(&training_config, &model_config, training_device, app_args);
    }

    if app_args.inference {
        let infer_device = B::main_device();
        let model = app_args
            .load_model::<B, _>(&model_config, &infer_device)
            .expect("Trained model should exist; run training first");
        let dataset = app_args.mnist(MnistSplit::Test);
        let accuracy = training::test_accuracy(&model, dataset, &training_config);
        println!("Test accuracy:{accuracy:.5}");
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
