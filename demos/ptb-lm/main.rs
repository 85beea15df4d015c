use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_lenet_ptb::ptb::{PtbConfig, PtbModelConfig};
pub use common::{
    backend::{MainAutoBackend, MainBackend, MainDevice},
    cli::AppArgs,
};

pub mod training;

#[path = "../common/mod.rs"]
pub mod common;

pub fn launch<B, AutoB>(app_args: &AppArgs)
where
    B: Backend + MainDevice,
    AutoB: AutodiffBackend + MainDevice,
{
    app_args.create_artifact_dir();

    // an explicit preset wins over a config saved in the artifacts directory
    let training_config = match &app_args.model {
        Some(name) if app_args.training_config.is_none() => PtbConfig::preset(name)
            .unwrap_or_else(|err| panic!("{err}")),
        _ => app_args
            .load_training_config()
            .unwrap_or_else(PtbConfig::small),
    };
    // the model file may tune dropout and init, but its shape must match the run
    let model_config = match &app_args.model_config {
        Some(_) => {
            let model_config = app_args
                .load_model_config::<PtbModelConfig>()
                .expect("Failed to load the model config");
            training_config
                .check_model_config(&model_config)
                .unwrap_or_else(|err| panic!("{err}"));
            model_config
        }
        None => training_config.model_config(),
    };
    app_args.save_training_config(&training_config);
    app_args.save_model_config(&model_config);

    if !app_args.inference && !app_args.training {
        println!("neither training nor inference were enabled");
        println!("{}", common::cli::HELP);
        return;
    }

    let corpus = app_args.ptb();
    let vocab_size = corpus.vocab_size();
    println!("Vocabulary size: {vocab_size}");
    assert!(
        vocab_size <= model_config.vocab_size,
        "the corpus has {vocab_size} distinct words, but the model only embeds {}",
        model_config.vocab_size
    );

    if app_args.training {
        let training_device = AutoB::main_device();
        training::train::<AutoB>(
            &training_config,
            &model_config,
            &corpus,
            training_device,
            app_args,
        );
    }

    if app_args.inference {
        let infer_device = B::main_device();
        let model = app_args
            .load_model::<B, _>(&model_config, &infer_device)
            .expect("Trained model should exist; run training first");
        let test_data = training::producer(&corpus.test, &training_config.eval_config());
        let test_perplexity =
            burn_lenet_ptb::ptb::eval_epoch(&model, &model_config, &test_data, &infer_device);
        println!("Test Perplexity: {test_perplexity:.3}");
    }
}

fn main() {
    let app_args = AppArgs::parse().expect("Failed to parse the arguments");
    launch::<MainBackend, MainAutoBackend>(&app_args);
}
