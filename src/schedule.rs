use serde::{Deserialize, Serialize};

/// Learning-rate schedules, indexed either by the global step or by the epoch,
/// depending on how the training loop queries them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// The same learning rate for every step.
    Constant { lr: f64 },
    /// Decays `base` by `decay_rate` once every `decay_steps`.
    ///
    /// Example: base = 0.8, decay_rate = 0.99, decay_steps = 550:
    /// step 0 → 0.8, step 550 → 0.792, step 275 → 0.796 (or 0.8 when `staircase`).
    ExponentialDecay {
        base: f64,
        decay_rate: f64,
        decay_steps: usize,
        /// Decays in discrete intervals instead of continuously.
        staircase: bool,
    },
    /// Keeps `base` for the first `max_epoch` epochs, then multiplies it by `decay`
    /// once per epoch.
    ///
    /// Example: base = 1.0, decay = 0.5, max_epoch = 4:
    /// (0→1.0, 1→1.0, 2→1.0, 3→1.0), (4→0.5, 5→0.25, ...)
    EpochDecay { base: f64, decay: f64, max_epoch: usize },
}

impl Default for LrSchedule {
    fn default() -> Self {
        LrSchedule::Constant { lr: 0.01 }
    }
}

impl LrSchedule {
    /// The learning rate for the zero-based step (or epoch) `index`.
    pub fn lr(&self, index: usize) -> f64 {
        match self {
            LrSchedule::Constant { lr } => *lr,
            LrSchedule::ExponentialDecay {
                base,
                decay_rate,
                decay_steps,
                staircase,
            } => {
                let decay_steps = (*decay_steps).max(1);
                let exponent = if *staircase {
                    (index / decay_steps) as f64
                } else {
                    index as f64 / decay_steps as f64
                };
                base * decay_rate.powf(exponent)
            }
            LrSchedule::EpochDecay {
                base,
                decay,
                max_epoch,
            } => {
                let exponent = (index + 1).saturating_sub(*max_epoch);
                base * decay.powi(exponent as i32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn constant_ignores_step() {
        let schedule = LrSchedule::Constant { lr: 0.01 };
        assert_eq!(schedule.lr(0), 0.01);
        assert_eq!(schedule.lr(9999), 0.01);
    }

    #[test]
    fn exponential_decay_is_continuous_by_default() {
        let schedule = LrSchedule::ExponentialDecay {
            base: 0.8,
            decay_rate: 0.99,
            decay_steps: 550,
            staircase: false,
        };
        assert!(close(schedule.lr(0), 0.8));
        assert!(close(schedule.lr(550), 0.8 * 0.99));
        assert!(close(schedule.lr(275), 0.8 * 0.99f64.powf(0.5)));
        assert!(schedule.lr(9999) < schedule.lr(5000));
    }

    #[test]
    fn exponential_decay_staircase() {
        let schedule = LrSchedule::ExponentialDecay {
            base: 1.0,
            decay_rate: 0.5,
            decay_steps: 10,
            staircase: true,
        };
        assert!(close(schedule.lr(9), 1.0));
        assert!(close(schedule.lr(10), 0.5));
        assert!(close(schedule.lr(25), 0.25));
    }

    #[test]
    fn epoch_decay_holds_then_decays() {
        let schedule = LrSchedule::EpochDecay {
            base: 1.0,
            decay: 0.5,
            max_epoch: 4,
        };
        let lrs: Vec<f64> = (0..7).map(|epoch| schedule.lr(epoch)).collect();
        assert_eq!(lrs, vec![1.0, 1.0, 1.0, 1.0, 0.5, 0.25, 0.125]);
    }
}
