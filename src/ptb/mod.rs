mod config;
mod model;
mod reader;
mod train;

pub use config::{ModelConfigMismatch, PRESETS, PtbConfig, UnknownPreset};
pub use model::{PtbModel, PtbModelConfig, PtbState};
pub use reader::{
    EOS, EmptyEpoch, PtbCorpus, PtbProducer, PtbWindow, Vocabulary, read_words, split_words,
};
pub use train::{REPORTS_PER_EPOCH, eval_epoch, reports_at, train_epoch};
