pub use crate::common::cli::AppArgs;
use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn_lenet_ptb::ptb::{
    PtbConfig, PtbCorpus, PtbModel, PtbModelConfig, PtbProducer, eval_epoch, train_epoch,
};

pub fn train<AutoB: AutodiffBackend>(
    training_config: &PtbConfig,
    model_config: &PtbModelConfig,
    corpus: &PtbCorpus,
    training_device: AutoB::Device,
    app_args: &AppArgs,
) {
    AutoB::seed(&training_device, training_config.seed);

    let train_data = producer(&corpus.train, training_config);
    let valid_data = producer(&corpus.valid, training_config);
    let lr_schedule = training_config.lr_schedule();

    let mut model: PtbModel<AutoB> = model_config.init(&training_device);
    let mut optim = crate::common::training::optimizer_config().init::<AutoB, PtbModel<AutoB>>();

    println!("Starting training...");
    for i in 0..training_config.max_max_epoch {
        let lr = lr_schedule.lr(i);
        println!("Epoch: {} Learning rate: {lr:.3}", i + 1);

        let train_perplexity;
        (model, train_perplexity) = train_epoch(
            model,
            model_config,
            &train_data,
            &mut optim,
            lr,
            training_config.max_grad_norm,
            &training_device,
            true,
        );
        println!("Epoch: {} Train Perplexity: {train_perplexity:.3}", i + 1);

        let valid_perplexity =
            eval_epoch(&model.valid(), model_config, &valid_data, &training_device);
        println!("Epoch: {} Valid Perplexity: {valid_perplexity:.3}", i + 1);
    }
    println!("Training finished.");

    let model = model.valid();
    app_args.save_model(&model);

    let test_data = producer(&corpus.test, &training_config.eval_config());
    let test_perplexity = eval_epoch(&model, model_config, &test_data, &training_device);
    println!("Test Perplexity: {test_perplexity:.3}");
}

pub fn producer(data: &[usize], config: &PtbConfig) -> PtbProducer {
    PtbProducer::new(data, config.batch_size, config.num_steps)
        .unwrap_or_else(|err| panic!("Failed to batch the corpus: {err}"))
}
