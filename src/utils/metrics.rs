use burn::prelude::*;
use burn::tensor::ElementConversion;

/// Number of rows whose arg-max matches the target class.
///
/// # Shapes
/// - logits: [batch_size, num_classes]
/// - targets: [batch_size]
pub fn num_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _num_classes] = logits.dims();
    assert_eq!([batch_size], targets.dims());
    let predicted = logits.argmax(1).reshape([batch_size]);
    let correct: i64 = predicted.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Fraction of rows whose arg-max matches the target class.
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [batch_size, _num_classes] = logits.dims();
    if batch_size == 0 {
        return 0.;
    }
    num_correct(logits, targets) as f64 / batch_size as f64
}

/// Accuracy accumulated over many batches.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    pub fn update<B: Backend>(&mut self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) {
        let [batch_size, _num_classes] = logits.dims();
        self.correct += num_correct(logits, targets);
        self.total += batch_size;
    }

    pub fn value(&self) -> f64 {
        if self.total == 0 {
            0.
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// `exp(total_cost / total_steps)`, where each cost is a sum over its time steps.
pub fn perplexity(total_cost: f64, total_steps: usize) -> f64 {
    if total_steps == 0 {
        return f64::INFINITY;
    }
    (total_cost / total_steps as f64).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn accuracy_counts_argmax_hits() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_floats(
            [[0.1, 0.9, 0.0], [0.8, 0.1, 0.1], [0.2, 0.3, 0.5], [0.6, 0.3, 0.1]],
            &device,
        );
        let targets = Tensor::<B, 1, Int>::from_ints([1, 0, 0, 1], &device);
        assert_eq!(num_correct(logits.clone(), targets.clone()), 2);
        assert_eq!(accuracy(logits, targets), 0.5);
    }

    #[test]
    fn running_accuracy() {
        let device = Default::default();
        let mut acc = Accuracy::default();
        assert_eq!(acc.value(), 0.);

        let logits = Tensor::<B, 2>::from_floats([[1., 0.], [0., 1.]], &device);
        acc.update(logits.clone(), Tensor::from_ints([0, 1], &device));
        acc.update(logits, Tensor::from_ints([1, 1], &device));
        assert_eq!(acc.correct, 3);
        assert_eq!(acc.total, 4);
        assert_eq!(acc.value(), 0.75);
    }

    #[test]
    fn perplexity_of_uniform_guess_is_vocab_size() {
        // a uniform guess over 10 words costs ln(10) per step
        let steps = 35;
        let cost = 10f64.ln() * steps as f64;
        assert!((perplexity(cost, steps) - 10.).abs() < 1e-9);
        assert!(perplexity(0., 0).is_infinite());
    }
}
