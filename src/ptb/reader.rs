//! Penn Treebank word streams and the windows fed to the language model.

use burn::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

/// Marks the end of every sentence (line).
pub const EOS: &str = "<eos>";

pub const TRAIN_FILE: &str = "ptb.train.txt";
pub const VALID_FILE: &str = "ptb.valid.txt";
pub const TEST_FILE: &str = "ptb.test.txt";

/// Splits a text into words, with every newline replaced by [`EOS`].
///
/// The replacement does not insert whitespace: PTB lines carry their own leading and
/// trailing spaces.
pub fn split_words(text: &str) -> Vec<String> {
    text.replace('\n', EOS)
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

pub fn read_words(path: &Path) -> io::Result<Vec<String>> {
    Ok(split_words(&std::fs::read_to_string(path)?))
}

/// Word ↔ id mapping, where the most frequent words get the smallest ids.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    words: Vec<String>,
    ids: HashMap<String, usize>,
}

impl Vocabulary {
    /// Ids are assigned by descending frequency; words with the same count are ordered
    /// alphabetically.
    pub fn build(words: &[String]) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in words {
            *counts.entry(word.as_str()).or_default() += 1;
        }

        let mut counted: Vec<(&str, usize)> = counts.into_iter().collect();
        counted.sort_by(|(word_a, count_a), (word_b, count_b)| {
            count_b.cmp(count_a).then_with(|| word_a.cmp(word_b))
        });

        let words: Vec<String> = counted.into_iter().map(|(word, _)| word.to_owned()).collect();
        let ids = words
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), id))
            .collect();
        Self { words, ids }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn id(&self, word: &str) -> Option<usize> {
        self.ids.get(word).copied()
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        self.words.get(id).map(String::as_str)
    }

    /// Maps every word to its id; out-of-vocabulary words are dropped.
    pub fn to_ids(&self, words: &[String]) -> Vec<usize> {
        words.iter().filter_map(|word| self.id(word)).collect()
    }
}

/// The three PTB splits, as word ids over the vocabulary of the training split.
#[derive(Debug, Clone)]
pub struct PtbCorpus {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
    pub test: Vec<usize>,
    pub vocabulary: Vocabulary,
}

impl PtbCorpus {
    /// Loads `ptb.{train,valid,test}.txt` from `data_path`.
    pub fn load(data_path: &Path) -> io::Result<Self> {
        let train_words = read_words(&data_path.join(TRAIN_FILE))?;
        let valid_words = read_words(&data_path.join(VALID_FILE))?;
        let test_words = read_words(&data_path.join(TEST_FILE))?;

        let vocabulary = Vocabulary::build(&train_words);
        Ok(Self {
            train: vocabulary.to_ids(&train_words),
            valid: vocabulary.to_ids(&valid_words),
            test: vocabulary.to_ids(&test_words),
            vocabulary,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }
}

/// The data is too short to produce a single window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyEpoch {
    pub data_len: usize,
    pub batch_size: usize,
    pub num_steps: usize,
}

impl fmt::Display for EmptyEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch_size == 0, decrease batch_size ({}) or num_steps ({}) for {} words",
            self.batch_size, self.num_steps, self.data_len
        )
    }
}

impl std::error::Error for EmptyEpoch {}

/// Cuts a word-id stream into `[batch_size, num_steps]` windows.
///
/// The stream is laid out as `batch_size` contiguous rows of `batch_len` words (the tail that
/// doesn't fill a row is dropped). Window `i` covers columns `i * num_steps..(i + 1) * num_steps`,
/// and its targets are the same columns shifted by one word.
#[derive(Debug, Clone)]
pub struct PtbProducer {
    /// # Shape
    /// [batch_size, batch_len]
    data: Vec<usize>,
    batch_size: usize,
    batch_len: usize,
    num_steps: usize,
}

impl PtbProducer {
    pub fn new(data: &[usize], batch_size: usize, num_steps: usize) -> Result<Self, EmptyEpoch> {
        let empty = EmptyEpoch {
            data_len: data.len(),
            batch_size,
            num_steps,
        };
        if batch_size == 0 || num_steps == 0 {
            return Err(empty);
        }
        let batch_len = data.len() / batch_size;
        if batch_len == 0 || (batch_len - 1) / num_steps == 0 {
            return Err(empty);
        }

        Ok(Self {
            data: data[..batch_size * batch_len].to_vec(),
            batch_size,
            batch_len,
            num_steps,
        })
    }

    /// Number of windows per epoch: `(batch_len - 1) / num_steps`.
    pub fn epoch_size(&self) -> usize {
        (self.batch_len - 1) / self.num_steps
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// # Panics
    /// If `i >= epoch_size`.
    pub fn window(&self, i: usize) -> PtbWindow {
        assert!(i < self.epoch_size(), "window {i} out of {}", self.epoch_size());
        let mut inputs = Vec::with_capacity(self.batch_size * self.num_steps);
        let mut targets = Vec::with_capacity(self.batch_size * self.num_steps);
        for row in 0..self.batch_size {
            let start = row * self.batch_len + i * self.num_steps;
            let end = start + self.num_steps;
            inputs.extend(self.data[start..end].iter().map(|&id| id as i64));
            targets.extend(self.data[start + 1..end + 1].iter().map(|&id| id as i64));
        }
        PtbWindow {
            inputs,
            targets,
            batch_size: self.batch_size,
            num_steps: self.num_steps,
        }
    }

    /// All windows of one epoch, in order.
    pub fn iter(&self) -> impl Iterator<Item = PtbWindow> + '_ {
        (0..self.epoch_size()).map(|i| self.window(i))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtbWindow {
    /// Row-major `[batch_size, num_steps]` word ids.
    pub inputs: Vec<i64>,
    /// Row-major `[batch_size, num_steps]` next-word ids.
    pub targets: Vec<i64>,
    pub batch_size: usize,
    pub num_steps: usize,
}

impl PtbWindow {
    /// # Shapes
    ///   - inputs [batch_size, num_steps]
    ///   - targets [batch_size, num_steps]
    pub fn to_tensors<B: Backend>(
        &self,
        device: &B::Device,
    ) -> (Tensor<B, 2, Int>, Tensor<B, 2, Int>) {
        let shape = [self.batch_size, self.num_steps];
        let inputs = TensorData::new(self.inputs.clone(), shape).convert::<B::IntElem>();
        let targets = TensorData::new(self.targets.clone(), shape).convert::<B::IntElem>();
        (
            Tensor::from_data(inputs, device),
            Tensor::from_data(targets, device),
        )
    }
}
