//! Step-numbered model checkpoints, with an index file listing the ones kept on disk.

use burn::prelude::*;
use burn::record::{FileRecorder, RecorderError};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub type RecorderTy = burn::record::DefaultRecorder;

/// Name of the index file, inside the checkpoint directory.
pub const INDEX_NAME: &str = "checkpoint";
pub const DEFAULT_NAME: &str = "model";
pub const DEFAULT_MAX_TO_KEEP: usize = 5;

const LATEST_KEY: &str = "model_checkpoint_path";
const ALL_KEY: &str = "all_model_checkpoint_paths";

#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    Recorder(RecorderError),
    /// Checkpoint names can't contain a dot, since the recorder replaces the file extension.
    InvalidName(String),
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::Io(err) => write!(f, "checkpoint io error: {err}"),
            CheckpointError::Recorder(err) => write!(f, "checkpoint record error: {err}"),
            CheckpointError::InvalidName(name) => {
                write!(f, "invalid checkpoint name {name:?}: must not contain '.'")
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(err: io::Error) -> Self {
        CheckpointError::Io(err)
    }
}

impl From<RecorderError> for CheckpointError {
    fn from(err: RecorderError) -> Self {
        CheckpointError::Recorder(err)
    }
}

/// Saves a model as `{dir}/{name}-{step}` every time it's asked to, keeping only the
/// `max_to_keep` most recent files.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
    name: String,
    max_to_keep: usize,
    /// Steps of the checkpoints on disk, oldest first.
    kept: VecDeque<usize>,
}

impl Checkpointer {
    /// Opens (or starts) the checkpoints of `dir`.
    ///
    /// An existing index file is read back, so older checkpoints keep being rotated out.
    pub fn new(dir: &Path, name: &str, max_to_keep: usize) -> Result<Self, CheckpointError> {
        if name.contains('.') || name.is_empty() {
            return Err(CheckpointError::InvalidName(name.to_owned()));
        }
        std::fs::create_dir_all(dir)?;

        let mut checkpointer = Self {
            dir: dir.to_owned(),
            name: name.to_owned(),
            max_to_keep: max_to_keep.max(1),
            kept: VecDeque::new(),
        };
        let index = dir.join(INDEX_NAME);
        if index.exists() {
            checkpointer.kept = checkpointer.parse_index(&std::fs::read_to_string(index)?);
        }
        Ok(checkpointer)
    }

    pub fn with_defaults(dir: &Path) -> Result<Self, CheckpointError> {
        Self::new(dir, DEFAULT_NAME, DEFAULT_MAX_TO_KEEP)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(&self, step: usize) -> String {
        format!("{}-{step}", self.name)
    }

    /// Path handed to the recorder, which appends its own extension.
    fn record_path(&self, step: usize) -> PathBuf {
        self.dir.join(self.stem(step))
    }

    /// Path of the file written for `step`.
    pub fn file_path<B: Backend>(&self, step: usize) -> PathBuf {
        let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
        self.dir.join(format!("{}.{file_ext}", self.stem(step)))
    }

    /// Steps of the checkpoints on disk, oldest first.
    pub fn steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.kept.iter().copied()
    }

    pub fn latest(&self) -> Option<usize> {
        self.kept.back().copied()
    }

    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        model: &M,
        step: usize,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.file_path::<B>(step);
        println!("Saving checkpoint to {path:?}");
        model
            .clone()
            .save_file(self.record_path(step), &RecorderTy::new())?;

        self.kept.retain(|&kept| kept != step);
        self.kept.push_back(step);
        while self.kept.len() > self.max_to_keep {
            if let Some(oldest) = self.kept.pop_front() {
                let oldest = self.file_path::<B>(oldest);
                if oldest.exists() {
                    std::fs::remove_file(oldest)?;
                }
            }
        }
        std::fs::write(self.dir.join(INDEX_NAME), self.index())?;

        Ok(path)
    }

    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model: M,
        step: usize,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        println!("Loading checkpoint from {:?}", self.file_path::<B>(step));
        let model = model.load_file(self.record_path(step), &RecorderTy::new(), device)?;
        Ok(model)
    }

    /// Loads the most recent checkpoint into `model`, if any.
    pub fn load_latest<B: Backend, M: Module<B>>(
        &self,
        model: M,
        device: &B::Device,
    ) -> Result<Option<(usize, M)>, CheckpointError> {
        match self.latest() {
            Some(step) => Ok(Some((step, self.load(model, step, device)?))),
            None => Ok(None),
        }
    }

    fn index(&self) -> String {
        let mut index = String::new();
        if let Some(latest) = self.latest() {
            index.push_str(&format!("{LATEST_KEY}: {:?}\n", self.stem(latest)));
        }
        for &step in &self.kept {
            index.push_str(&format!("{ALL_KEY}: {:?}\n", self.stem(step)));
        }
        index
    }

    fn parse_index(&self, index: &str) -> VecDeque<usize> {
        let prefix = format!("{}-", self.name);
        index
            .lines()
            .filter_map(|line| line.strip_prefix(ALL_KEY)?.strip_prefix(':'))
            .filter_map(|value| {
                let stem = value.trim().trim_matches('"');
                stem.strip_prefix(prefix.as_str())?.parse().ok()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type B = NdArray<f32>;

    fn weights(linear: &Linear<B>) -> Vec<f32> {
        linear.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn dots_are_rejected_in_names() {
        let dir = temp_dir::TempDir::new().unwrap();
        let err = Checkpointer::new(dir.path(), "model.ckpt", 5).unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidName(_)));
    }

    #[test]
    fn keeps_only_the_most_recent() {
        let dir = temp_dir::TempDir::new().unwrap();
        let device = Default::default();
        let model: Linear<B> = LinearConfig::new(4, 3).init(&device);

        let mut checkpointer = Checkpointer::new(dir.path(), "model", 2).unwrap();
        assert_eq!(checkpointer.latest(), None);
        for step in [1, 1001, 2001] {
            let path = checkpointer.save(&model, step).unwrap();
            assert!(path.exists());
        }

        assert_eq!(checkpointer.steps().collect::<Vec<_>>(), vec![1001, 2001]);
        assert_eq!(checkpointer.latest(), Some(2001));
        assert!(!checkpointer.file_path::<B>(1).exists());
        assert!(checkpointer.file_path::<B>(1001).exists());

        let index = std::fs::read_to_string(dir.child(INDEX_NAME)).unwrap();
        assert_eq!(index.lines().next(), Some("model_checkpoint_path: \"model-2001\""));
    }

    #[test]
    fn reopening_reads_the_index() {
        let dir = temp_dir::TempDir::new().unwrap();
        let device = Default::default();
        let model: Linear<B> = LinearConfig::new(2, 2).init(&device);

        let mut checkpointer = Checkpointer::new(dir.path(), "model", 2).unwrap();
        checkpointer.save(&model, 10).unwrap();
        checkpointer.save(&model, 20).unwrap();

        let mut reopened = Checkpointer::new(dir.path(), "model", 2).unwrap();
        assert_eq!(reopened.steps().collect::<Vec<_>>(), vec![10, 20]);
        reopened.save(&model, 30).unwrap();
        assert!(!reopened.file_path::<B>(10).exists());
    }

    #[test]
    fn load_latest_restores_the_weights() {
        let dir = temp_dir::TempDir::new().unwrap();
        let device = Default::default();
        let saved: Linear<B> = LinearConfig::new(3, 2).init(&device);

        let mut checkpointer = Checkpointer::with_defaults(dir.path()).unwrap();
        let fresh: Linear<B> = LinearConfig::new(3, 2).init(&device);
        assert!(checkpointer.load_latest(fresh, &device).unwrap().is_none());

        checkpointer.save(&saved, 7).unwrap();
        let fresh: Linear<B> = LinearConfig::new(3, 2).init(&device);
        let (step, loaded) = checkpointer.load_latest(fresh, &device).unwrap().unwrap();
        assert_eq!(step, 7);
        assert_eq!(weights(&loaded), weights(&saved));
    }
}
