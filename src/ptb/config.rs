use crate::ptb::PtbModelConfig;
use crate::schedule::LrSchedule;
use burn::prelude::*;
use std::fmt;

/// Hyper-parameters of a PTB language model run.
#[derive(Config, Debug)]
pub struct PtbConfig {
    /// Parameters are initialized uniformly in `[-init_scale, init_scale]`.
    pub init_scale: f64,
    /// Learning rate of the first `max_epoch` epochs.
    pub learning_rate: f64,
    /// Gradients are clipped to this global norm.
    pub max_grad_norm: f64,
    pub num_layers: usize,
    /// Number of unrolled time steps per window.
    pub num_steps: usize,
    pub hidden_size: usize,
    /// Epochs trained with the initial learning rate.
    pub max_epoch: usize,
    /// Total number of epochs.
    pub max_max_epoch: usize,
    /// Probability of keeping an activation under dropout.
    pub keep_prob: f64,
    /// Learning rate decay applied once per epoch after `max_epoch`.
    pub lr_decay: f64,
    pub batch_size: usize,
    pub vocab_size: usize,
    #[config(default = 0)]
    pub seed: u64,
}

pub const PRESETS: [&str; 4] = ["small", "medium", "large", "test"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPreset(pub String);

impl fmt::Display for UnknownPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown model preset {:?}, expected one of {:?}",
            self.0, PRESETS
        )
    }
}

impl std::error::Error for UnknownPreset {}

/// A model config whose shape disagrees with the run's [`PtbConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfigMismatch {
    pub field: &'static str,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for ModelConfigMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model config has {} = {}, but the training config expects {}",
            self.field, self.found, self.expected
        )
    }
}

impl std::error::Error for ModelConfigMismatch {}

impl PtbConfig {
    pub fn small() -> Self {
        Self {
            init_scale: 0.1,
            learning_rate: 1.0,
            max_grad_norm: 5.,
            num_layers: 2,
            num_steps: 20,
            hidden_size: 200,
            max_epoch: 4,
            max_max_epoch: 13,
            keep_prob: 1.0,
            lr_decay: 0.5,
            batch_size: 20,
            vocab_size: 10000,
            seed: 0,
        }
    }

    pub fn medium() -> Self {
        Self {
            init_scale: 0.05,
            learning_rate: 1.0,
            max_grad_norm: 5.,
            num_layers: 2,
            num_steps: 35,
            hidden_size: 650,
            max_epoch: 6,
            max_max_epoch: 39,
            keep_prob: 0.5,
            lr_decay: 0.8,
            batch_size: 20,
            vocab_size: 10000,
            seed: 0,
        }
    }

    pub fn large() -> Self {
        Self {
            init_scale: 0.04,
            learning_rate: 1.0,
            max_grad_norm: 10.,
            num_layers: 2,
            num_steps: 35,
            hidden_size: 1500,
            max_epoch: 14,
            max_max_epoch: 55,
            keep_prob: 0.35,
            lr_decay: 1. / 1.15,
            batch_size: 20,
            vocab_size: 10000,
            seed: 0,
        }
    }

    /// Tiny configuration, for smoke tests.
    pub fn test() -> Self {
        Self {
            init_scale: 0.1,
            learning_rate: 1.0,
            max_grad_norm: 1.,
            num_layers: 1,
            num_steps: 2,
            hidden_size: 2,
            max_epoch: 1,
            max_max_epoch: 1,
            keep_prob: 1.0,
            lr_decay: 0.5,
            batch_size: 20,
            vocab_size: 10000,
            seed: 0,
        }
    }

    pub fn preset(name: &str) -> Result<Self, UnknownPreset> {
        match name {
            "small" => Ok(Self::small()),
            "medium" => Ok(Self::medium()),
            "large" => Ok(Self::large()),
            "test" => Ok(Self::test()),
            _ => Err(UnknownPreset(name.to_owned())),
        }
    }

    /// Same model, fed one word at a time.
    pub fn eval_config(&self) -> Self {
        let mut config = self.clone();
        config.batch_size = 1;
        config.num_steps = 1;
        config
    }

    /// Per-epoch learning rate.
    pub fn lr_schedule(&self) -> LrSchedule {
        LrSchedule::EpochDecay {
            base: self.learning_rate,
            decay: self.lr_decay,
            max_epoch: self.max_epoch,
        }
    }

    /// Checks that an externally provided model config has the shape this run trains.
    ///
    /// `keep_prob` and `init_scale` are free to differ.
    pub fn check_model_config(&self, model: &PtbModelConfig) -> Result<(), ModelConfigMismatch> {
        let fields = [
            ("vocab_size", self.vocab_size, model.vocab_size),
            ("hidden_size", self.hidden_size, model.hidden_size),
            ("num_layers", self.num_layers, model.num_layers),
        ];
        for (field, expected, found) in fields {
            if expected != found {
                return Err(ModelConfigMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    pub fn model_config(&self) -> PtbModelConfig {
        PtbModelConfig::new(self.vocab_size, self.hidden_size, self.num_layers)
            .with_keep_prob(self.keep_prob)
            .with_init_scale(self.init_scale)
    }
}
