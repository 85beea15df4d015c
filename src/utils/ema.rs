use burn::module::{ModuleMapper, ModuleVisitor, ParamId};
use burn::prelude::*;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Maintains a shadow copy of a module whose parameters are exponential moving
/// averages of the tracked module's parameters.
///
/// The shadow starts as a copy of the tracked module. Parameters are matched by their
/// [`ParamId`], so the tracked module must keep its ids across optimizer steps
/// (which burn optimizers do).
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage<B: Backend, M: Module<B>> {
    decay: f64,
    shadow: M,
    _backend: PhantomData<B>,
}

impl<B: Backend, M: Module<B>> ExponentialMovingAverage<B, M> {
    pub fn new(decay: f64, model: M) -> Self {
        Self {
            decay,
            shadow: model,
            _backend: PhantomData,
        }
    }

    /// Effective decay at `step`.
    ///
    /// Early updates use a smaller decay so the shadow can move away from the initial
    /// values quickly: `min(decay, (1 + step) / (10 + step))`.
    pub fn decay_at(&self, step: usize) -> f64 {
        let warmup = (1 + step) as f64 / (10 + step) as f64;
        self.decay.min(warmup)
    }

    /// Blends the `model` parameters into the shadow:
    /// `shadow = d * shadow + (1 - d) * param`.
    pub fn update(&mut self, step: usize, model: &M) {
        let mut collect = CollectParams::<B>::default();
        model.visit(&mut collect);

        let mut blend = Blend {
            decay: self.decay_at(step),
            params: collect.params,
        };
        self.shadow = self.shadow.clone().map(&mut blend);
    }

    pub fn shadow(&self) -> &M {
        &self.shadow
    }

    pub fn into_shadow(self) -> M {
        self.shadow
    }
}

/// Flattened float parameters, by id.
struct CollectParams<B: Backend> {
    params: HashMap<ParamId, Tensor<B, 1>>,
}

impl<B: Backend> Default for CollectParams<B> {
    fn default() -> Self {
        Self {
            params: HashMap::new(),
        }
    }
}

impl<B: Backend> ModuleVisitor<B> for CollectParams<B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        let n = tensor.shape().num_elements();
        self.params.insert(id, tensor.clone().reshape([n]));
    }
}

struct Blend<B: Backend> {
    decay: f64,
    params: HashMap<ParamId, Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for Blend<B> {
    fn map_float<const D: usize>(&mut self, id: ParamId, shadow: Tensor<B, D>) -> Tensor<B, D> {
        match self.params.remove(&id) {
            Some(param) => {
                let param: Tensor<B, D> = param.reshape(shadow.dims());
                shadow * self.decay + param * (1. - self.decay)
            }
            // not tracked
            None => shadow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type B = NdArray<f32>;

    fn assert_close<const D: usize>(actual: Tensor<B, D>, expected: Tensor<B, D>) {
        let actual = actual.into_data().to_vec::<f32>().unwrap();
        let expected = expected.into_data().to_vec::<f32>().unwrap();
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-5, "{a} != {e}");
        }
    }

    fn shifted(linear: &Linear<B>, by: f32) -> Linear<B> {
        Linear {
            weight: linear.weight.clone().map(|w| w + by),
            bias: linear.bias.clone().map(|b| b.map(|b| b + by)),
        }
    }

    #[test]
    fn decay_warms_up() {
        let device = Default::default();
        let linear: Linear<B> = LinearConfig::new(3, 2).init(&device);
        let ema = ExponentialMovingAverage::new(0.99, linear);
        assert!((ema.decay_at(0) - 0.1).abs() < 1e-12);
        assert!((ema.decay_at(10) - 11. / 20.).abs() < 1e-12);
        assert_eq!(ema.decay_at(100_000), 0.99);
    }

    #[test]
    fn update_blends_towards_the_model() {
        let device = Default::default();
        let linear: Linear<B> = LinearConfig::new(3, 2).init(&device);
        let initial = linear.weight.val();

        let mut ema = ExponentialMovingAverage::new(0.5, linear.clone());
        // decay is capped at 0.5 for large steps
        ema.update(1000, &shifted(&linear, 1.));

        let expected = initial + 0.5;
        assert_close(ema.shadow().weight.val(), expected);

        let bias = ema.shadow().bias.as_ref().unwrap().val();
        let expected_bias = linear.bias.as_ref().unwrap().val() + 0.5;
        assert_close(bias, expected_bias);
    }

    #[test]
    fn untracked_shadow_is_kept() {
        let device = Default::default();
        let linear: Linear<B> = LinearConfig::new(3, 2).init(&device);
        let other: Linear<B> = LinearConfig::new(3, 2).init(&device);
        let initial = linear.weight.val();

        let mut ema = ExponentialMovingAverage::new(0.5, linear);
        // different parameter ids
        ema.update(1000, &other);
        assert_close(ema.into_shadow().weight.val(), initial);
    }
}
