//! Epoch loops of the language model: truncated backpropagation through time over the
//! windows of a [`PtbProducer`].

use crate::ptb::{PtbModel, PtbModelConfig, PtbProducer};
use crate::train::sgd_step;
use crate::utils::metrics::perplexity;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use std::time::Instant;

/// Number of progress reports per training epoch.
pub const REPORTS_PER_EPOCH: usize = 10;

/// Whether the progress line is printed after window `step`.
///
/// Reports happen every `epoch_size / 10` windows (at least every window), offset by ten
/// windows so the first one has some history.
pub fn reports_at(step: usize, epoch_size: usize) -> bool {
    let interval = (epoch_size / REPORTS_PER_EPOCH).max(1);
    step % interval == 10 % interval
}

/// One pass over `data` with a gradient step per window, returning the trained model and
/// the epoch perplexity.
///
/// The recurrent state flows from one window into the next, but gradients stop at the
/// window boundary. Gradients are clipped to the global norm `max_grad_norm`.
#[allow(clippy::too_many_arguments)]
pub fn train_epoch<AutoB: AutodiffBackend, O: Optimizer<PtbModel<AutoB>, AutoB>>(
    mut model: PtbModel<AutoB>,
    model_config: &PtbModelConfig,
    data: &PtbProducer,
    optim: &mut O,
    lr: f64,
    max_grad_norm: f64,
    device: &AutoB::Device,
    verbose: bool,
) -> (PtbModel<AutoB>, f64) {
    let epoch_size = data.epoch_size();
    let start = Instant::now();

    let mut state = model_config.zero_state::<AutoB>(data.batch_size(), device);
    let mut costs = 0.;
    let mut iters = 0;
    for (step, window) in data.iter().enumerate() {
        let (inputs, targets) = window.to_tensors::<AutoB>(device);
        let (cost, next_state) = model.cost(inputs, targets, state);
        state = next_state.detach();

        costs += cost.clone().into_scalar().elem::<f64>();
        iters += data.num_steps();
        model = sgd_step(model, cost, optim, lr, Some(max_grad_norm));

        if verbose && reports_at(step, epoch_size) {
            let words = iters * data.batch_size();
            println!(
                "{:.3} perplexity: {:.3} speed: {:.0} wps",
                step as f64 / epoch_size as f64,
                perplexity(costs, iters),
                words as f64 / start.elapsed().as_secs_f64().max(f64::EPSILON),
            );
        }
    }

    (model, perplexity(costs, iters))
}

/// Perplexity of `model` over `data`.
///
/// Dropout only runs on autodiff backends, so pass the inner (`valid()`) model.
pub fn eval_epoch<B: Backend>(
    model: &PtbModel<B>,
    model_config: &PtbModelConfig,
    data: &PtbProducer,
    device: &B::Device,
) -> f64 {
    let mut state = model_config.zero_state::<B>(data.batch_size(), device);
    let mut costs = 0.;
    let mut iters = 0;
    for window in data.iter() {
        let (inputs, targets) = window.to_tensors::<B>(device);
        let (cost, next_state) = model.cost(inputs, targets, state);
        state = next_state;

        costs += cost.into_scalar().elem::<f64>();
        iters += data.num_steps();
    }
    perplexity(costs, iters)
}
