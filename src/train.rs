use crate::utils::clip::{clip_scale, global_norm};
use burn::data::dataloader::{DataLoader, DataLoaderIterator};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Backpropagates `loss` and applies one optimizer step.
///
/// With `max_grad_norm`, gradients are rescaled so that their global norm doesn't exceed it.
/// The rescaling is folded into the learning rate, which is equivalent for optimizers
/// without momentum or weight decay (plain SGD).
pub fn sgd_step<AutoB, M, O>(
    model: M,
    loss: Tensor<AutoB, 1>,
    optim: &mut O,
    lr: f64,
    max_grad_norm: Option<f64>,
) -> M
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB>,
    O: Optimizer<M, AutoB>,
{
    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let scale = match max_grad_norm {
        Some(max_norm) => clip_scale(global_norm(&model, &grads), max_norm),
        None => 1.,
    };
    optim.step(lr * scale, model, grads)
}

/// Whether the zero-based `index` falls on a multiple of `interval`, so `0`, `interval`,
/// `2 * interval`, ... A zero interval never fires.
pub fn on_interval(index: usize, interval: usize) -> bool {
    interval > 0 && index % interval == 0
}

/// Yields a fixed number of batches, starting over the data loader (a new epoch) whenever
/// it runs out.
///
/// Stops early only if the data loader yields nothing at all.
pub struct Steps<'a, B: Backend, O> {
    dataloader: &'a dyn DataLoader<B, O>,
    iter: Box<dyn DataLoaderIterator<O> + 'a>,
    remaining: usize,
    epoch: usize,
}

impl<'a, B: Backend, O> Steps<'a, B, O> {
    pub fn new(dataloader: &'a dyn DataLoader<B, O>, num_steps: usize) -> Self {
        Self {
            dataloader,
            iter: dataloader.iter(),
            remaining: num_steps,
            epoch: 1,
        }
    }

    /// One-based epoch of the last yielded batch.
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl<B: Backend, O> Iterator for Steps<'_, B, O> {
    type Item = O;

    fn next(&mut self) -> Option<O> {
        if self.remaining == 0 {
            return None;
        }
        let batch = match self.iter.next() {
            Some(batch) => batch,
            None => {
                self.iter = self.dataloader.iter();
                self.epoch += 1;
                self.iter.next()?
            }
        };
        self.remaining -= 1;
        Some(batch)
    }
}
