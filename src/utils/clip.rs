use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

/// L2 norm over the gradients of every float parameter of `model`, taken as if all
/// gradients were concatenated into a single vector.
///
/// Parameters without a gradient are skipped.
pub fn global_norm<AutoB, M>(model: &M, grads: &GradientsParams) -> f64
where
    AutoB: AutodiffBackend,
    M: AutodiffModule<AutoB>,
{
    let mut visitor = SquaredNorm::<AutoB> {
        grads,
        sum: None,
    };
    model.visit(&mut visitor);
    match visitor.sum {
        Some(sum) => sum.into_scalar().elem::<f64>().sqrt(),
        None => 0.,
    }
}

/// Factor that brings a gradient of norm `norm` down to at most `max_norm`:
/// `max_norm / max(norm, max_norm)`.
pub fn clip_scale(norm: f64, max_norm: f64) -> f64 {
    if norm > max_norm && norm.is_finite() {
        max_norm / norm
    } else {
        1.
    }
}

struct SquaredNorm<'a, AutoB: AutodiffBackend> {
    grads: &'a GradientsParams,
    sum: Option<Tensor<AutoB::InnerBackend, 1>>,
}

impl<AutoB: AutodiffBackend> ModuleVisitor<AutoB> for SquaredNorm<'_, AutoB> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<AutoB, D>) {
        let Some(grad) = self.grads.get::<AutoB::InnerBackend, D>(id) else {
            return;
        };
        let squared = grad.powi_scalar(2).sum();
        self.sum = Some(match self.sum.take() {
            Some(sum) => sum + squared,
            None => squared,
        });
    }
}
