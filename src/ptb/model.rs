//! Word-level language model: embedding → stacked LSTMs → projection over the vocabulary.

use crate::model::ModelConfigExt;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::lstm::{Lstm, LstmConfig, LstmState};
use burn::nn::{
    Dropout, DropoutConfig, Embedding, EmbeddingConfig, Initializer, Linear, LinearConfig,
};
use burn::prelude::*;

#[derive(Config, Debug)]
pub struct PtbModelConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    /// Probability of keeping an activation under dropout.
    /// Dropout is only active on autodiff backends.
    #[config(default = 1.0)]
    pub keep_prob: f64,
    /// Every parameter is initialized uniformly in `[-init_scale, init_scale]`.
    #[config(default = 0.1)]
    pub init_scale: f64,
}

impl PtbModelConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PtbModel<B> {
        let initializer = Initializer::Uniform {
            min: -self.init_scale,
            max: self.init_scale,
        };

        let embedding = EmbeddingConfig::new(self.vocab_size, self.hidden_size)
            .with_initializer(initializer.clone())
            .init(device);
        let layers = (0..self.num_layers)
            .map(|_| {
                LstmConfig::new(self.hidden_size, self.hidden_size, true)
                    .with_initializer(initializer.clone())
                    .init(device)
            })
            .collect();
        let softmax = LinearConfig::new(self.hidden_size, self.vocab_size)
            .with_initializer(initializer)
            .init(device);

        PtbModel {
            embedding,
            dropout: DropoutConfig::new(1. - self.keep_prob).init(),
            layers,
            softmax,
        }
    }

    /// Zeroed recurrent state for `batch_size` sequences.
    pub fn zero_state<B: Backend>(&self, batch_size: usize, device: &B::Device) -> PtbState<B> {
        PtbState::zeros(self.num_layers, batch_size, self.hidden_size, device)
    }
}

impl<B: Backend> ModelConfigExt<B> for PtbModelConfig {
    type Model = PtbModel<B>;
    fn init(&self, device: &B::Device) -> Self::Model {
        PtbModelConfig::init(self, device)
    }
}

#[derive(Module, Debug)]
pub struct PtbModel<B: Backend> {
    /// Dims: [vocab_size, hidden_size].
    pub embedding: Embedding<B>,
    /// Applied to the embeddings and to the output of every LSTM layer.
    pub dropout: Dropout,
    /// # Shape
    /// [num_layers]
    pub layers: Vec<Lstm<B>>,
    /// Input channel: hidden_size.
    /// Output channel: vocab_size.
    pub softmax: Linear<B>,
}

/// Cell and hidden states of every LSTM layer.
#[derive(Debug)]
pub struct PtbState<B: Backend> {
    /// # Shape
    /// [num_layers]
    pub layers: Vec<LstmState<B, 2>>,
}

impl<B: Backend> PtbState<B> {
    pub fn zeros(
        num_layers: usize,
        batch_size: usize,
        hidden_size: usize,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|_| {
                LstmState::new(
                    Tensor::zeros([batch_size, hidden_size], device),
                    Tensor::zeros([batch_size, hidden_size], device),
                )
            })
            .collect();
        Self { layers }
    }

    /// Cuts the state from the graph that produced it, so the next window backpropagates
    /// only through its own time steps.
    pub fn detach(self) -> Self {
        let layers = self
            .layers
            .into_iter()
            .map(|state| LstmState::new(state.cell.detach(), state.hidden.detach()))
            .collect();
        Self { layers }
    }
}

impl<B: Backend> PtbModel<B> {
    /// # Shapes
    ///   - inputs [batch_size, num_steps]
    ///   - output logits [batch_size, num_steps, vocab_size]
    pub fn forward(
        &self,
        inputs: Tensor<B, 2, Int>,
        state: PtbState<B>,
    ) -> (Tensor<B, 3>, PtbState<B>) {
        let [batch_size, num_steps] = inputs.dims();
        let [vocab_size, hidden_size] = self.embedding.weight.dims();
        assert_eq!(state.layers.len(), self.layers.len());

        let mut x = self.dropout.forward(self.embedding.forward(inputs));
        debug_assert_eq!([batch_size, num_steps, hidden_size], x.dims());

        let mut next_state = Vec::with_capacity(self.layers.len());
        for (layer, layer_state) in self.layers.iter().zip(state.layers) {
            let (output, layer_state) = layer.forward(x, Some(layer_state));
            x = self.dropout.forward(output);
            next_state.push(layer_state);
        }
        debug_assert_eq!([batch_size, num_steps, hidden_size], x.dims());

        let logits = self.softmax.forward(x);
        debug_assert_eq!([batch_size, num_steps, vocab_size], logits.dims());

        (logits, PtbState { layers: next_state })
    }

    /// Sequence loss of one window: cross entropy summed over the time steps and averaged
    /// over the batch.
    ///
    /// # Shapes
    ///   - inputs [batch_size, num_steps]
    ///   - targets [batch_size, num_steps]
    ///   - cost [1]
    pub fn cost(
        &self,
        inputs: Tensor<B, 2, Int>,
        targets: Tensor<B, 2, Int>,
        state: PtbState<B>,
    ) -> (Tensor<B, 1>, PtbState<B>) {
        let [batch_size, num_steps] = inputs.dims();
        assert_eq!([batch_size, num_steps], targets.dims());

        let (logits, state) = self.forward(inputs, state);
        let [_batch_size, _num_steps, vocab_size] = logits.dims();

        let logits = logits.reshape([batch_size * num_steps, vocab_size]);
        let targets = targets.reshape([batch_size * num_steps]);
        let mean = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, targets);

        (mean * num_steps as f64, state)
    }
}
