use burn::prelude::*;
use burn::record::FileRecorder;
use burn_lenet_ptb::checkpoint::{
    Checkpointer, DEFAULT_MAX_TO_KEEP, DEFAULT_NAME, INDEX_NAME, RecorderTy,
};
use burn_lenet_ptb::mnist::{MnistDataset, MnistSplit};
use burn_lenet_ptb::model::ModelConfigExt;
use burn_lenet_ptb::ptb::PtbCorpus;
use std::path::{Path, PathBuf};

pub const HELP: &str = "\
burn-lenet-ptb demos

Command-line tools for training and evaluating small classic networks:
mnist-mlp (fully connected MNIST classifier), mnist-lenet (convolutional MNIST classifier)
and ptb-lm (LSTM language model over the Penn Treebank).
Models, checkpoints and configurations are persisted in an artifacts directory.

USAGE:
    cargo run --release --example <mnist-mlp|mnist-lenet|ptb-lm> --features dev-ndarray -- [OPTIONS]

When no --training or --inference flag is provided, the program exits after handling configuration logic.

BEHAVIOR OVERVIEW
- The program manages two configurations: training config and model config.
- If --training-config or --model-config is given, the corresponding config is loaded from the specified file and saved to the artifacts directory (overwriting any existing file).
- If no explicit config file is provided for a component, the program attempts to load it from the artifacts directory; if absent, a default configuration is created and saved.
- The artifacts directory (--artifacts-path) is used to read/write model weights, checkpoints, and configurations. If not specified, a new temporary directory is created and its path is printed.
- With --remove-artifacts, any existing model and checkpoint files in the artifacts directory are deleted before training (if --training is active).
- If both --training and --inference are specified, training executes first, followed by evaluation of the trained model.

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -t, --training              Run training
    -i, --inference             Evaluate the latest saved model
    -r, --remove-artifacts      Delete existing model and checkpoint files from the artifacts directory before training
                                (has no effect if --training is not used)
    -c, --training-config <PATH>
                                Load training configuration from this file (overrides any config in artifacts directory)
    -m, --model-config <PATH>   Load model configuration from this file (overrides any config in artifacts directory)
                                PTB: its vocab_size, hidden_size and num_layers must match the training config.
    -a, --artifacts-path <PATH>
                                Directory where configurations, model weights, and checkpoints are saved and loaded.
                                If the directory does not exist, it will be created.
                                Defaults to a newly created temporary directory (path will be printed).
    -d, --data-path <PATH>      Directory holding the dataset files.
                                MNIST: the four IDX files (raw or .gz), downloaded into ~/.cache/burn-dataset when omitted.
                                PTB: ptb.train.txt, ptb.valid.txt and ptb.test.txt (required).
    --model <PRESET>            PTB model preset: small, medium, large or test (default: small)
";

#[derive(Debug)]
pub struct AppArgs {
    pub training: bool,
    pub inference: bool,
    pub remove_artifacts: bool,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
    pub data_path: Option<PathBuf>,
    pub model: Option<String>,
}

impl AppArgs {
    pub fn parse() -> Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let args = AppArgs {
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            data_path: pargs.opt_value_from_os_str(["-d", "--data-path"], parse_path)?,
            model: pargs.opt_value_from_str("--model")?,
            artifacts_path: pargs
                .opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?
                .unwrap_or_else(|| {
                    // e.g. /tmp/burn-lenet-ptb-mnist_lenet-abcd-0
                    let name = format!(
                        "{}-{}-",
                        std::env!("CARGO_PKG_NAME"), // burn-lenet-ptb
                        std::env!("CARGO_CRATE_NAME") // e.g. mnist_lenet
                    );
                    let tmp = temp_dir::TempDir::with_prefix(name)
                        .expect("Failed to create the temporary directory")
                        .dont_delete_on_drop();
                    let path = tmp.path();
                    println!("new artifacts directory: {path:?}");
                    path.into()
                }),
            // must parse flags after values
            training: pargs.contains(["-t", "--training"]),
            inference: pargs.contains(["-i", "--inference"]),
            remove_artifacts: pargs.contains(["-r", "--remove-artifacts"]),
        };

        // It's up to the caller what to do with the remaining arguments.
        let remaining = pargs.finish();
        if !remaining.is_empty() {
            panic!("unused arguments: {remaining:?}");
        }

        Ok(args)
    }

    pub fn create_artifact_dir(&self) {
        create_artifact_dir(&self.artifacts_path, self.remove_artifacts && self.training)
    }

    pub fn save_training_config(&self, training_config: &impl Config) {
        let path = config_path(&self.artifacts_path, TRAINING_CONFIG_NAME);
        save_config("training", &path, training_config)
    }

    pub fn load_training_config<TrainingConfig: Config>(&self) -> Option<TrainingConfig> {
        self.training_config
            .as_ref()
            .map(|path| {
                load_config("training", path)
                    .unwrap_or_else(|| panic!("Failed to find the training config file {path:?}"))
            })
            .or_else(|| {
                let path = config_path(&self.artifacts_path, TRAINING_CONFIG_NAME);
                load_config("training", &path)
            })
    }

    pub fn save_model_config(&self, model_config: &impl Config) {
        let path = config_path(&self.artifacts_path, MODEL_CONFIG_NAME);
        save_config("model", &path, model_config)
    }

    pub fn load_model_config<ModelConfig: Config>(&self) -> Option<ModelConfig> {
        self.model_config
            .as_ref()
            .map(|path| {
                load_config("model", path)
                    .unwrap_or_else(|| panic!("Failed to find the model config file {path:?}"))
            })
            .or_else(|| {
                let path = config_path(&self.artifacts_path, MODEL_CONFIG_NAME);
                load_config("model", &path)
            })
    }

    pub fn save_model<B: Backend>(&self, model: &impl Module<B>) {
        save_model(&self.artifacts_path, model)
    }

    pub fn load_model<B: Backend, ModelConfig: ModelConfigExt<B>>(
        &self,
        model_config: &ModelConfig,
        device: &B::Device,
    ) -> Option<ModelConfig::Model> {
        load_model(&self.artifacts_path, model_config, device)
    }

    /// Step checkpoints of `{artifacts_path}/{MODEL_NAME}-{step}`.
    pub fn checkpointer(&self) -> Checkpointer {
        Checkpointer::new(&self.artifacts_path, MODEL_NAME, DEFAULT_MAX_TO_KEEP)
            .expect("Failed to open the checkpoints")
    }

    /// MNIST split, read from `--data-path` or downloaded.
    pub fn mnist(&self, split: MnistSplit) -> MnistDataset {
        let dataset = match &self.data_path {
            Some(path) => MnistDataset::from_dir(path, split),
            None => MnistDataset::new(split),
        };
        dataset.unwrap_or_else(|err| panic!("Failed to load the MNIST {split:?} split: {err}"))
    }

    /// PTB corpus, read from `--data-path`.
    pub fn ptb(&self) -> PtbCorpus {
        let path = self
            .data_path
            .as_ref()
            .expect("--data-path is required for the PTB corpus");
        println!("Loading the PTB corpus from {path:?}");
        PtbCorpus::load(path).unwrap_or_else(|err| panic!("Failed to load {path:?}: {err}"))
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<std::path::PathBuf, &'static str> {
    Ok(s.into())
}

// Create the directory to save the models, checkpoints and configs
pub fn create_artifact_dir(artifact_dir: &Path, delete: bool) {
    std::fs::create_dir_all(artifact_dir).expect("failed to create the artifacts directory");
    if delete {
        println!("removing {artifact_dir:?}/{{{MODEL_NAME}*,{INDEX_NAME}}}");
        let entries =
            std::fs::read_dir(artifact_dir).expect("failed to read the artifacts directory");
        for entry in entries {
            let entry = entry.expect("failed to read the artifacts directory");
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_model = name.starts_with(MODEL_NAME) && !name.ends_with(".json");
            if is_model || name == INDEX_NAME {
                std::fs::remove_file(entry.path()).expect("failed to remove a model file");
            }
        }
    }
}

fn config_path(artifact_dir: &Path, name: &str) -> PathBuf {
    artifact_dir.join(format!("{name}.json"))
}

pub const TRAINING_CONFIG_NAME: &str = "training_config";
pub const MODEL_CONFIG_NAME: &str = "model_config";

pub fn save_config(kind: &str, path: &Path, config: &impl Config) {
    println!("Saving {kind} config into {path:?}");
    config
        .save(path)
        .unwrap_or_else(|err| panic!("Failed to save the {kind} config: {err}"));
}

pub fn load_config<C: Config>(kind: &str, path: &Path) -> Option<C> {
    let exists = std::fs::exists(path).unwrap_or_else(|err| panic!("failed to check {path:?}: {err}"));
    if exists {
        println!("Loading {kind} config from {path:?}");
        let config =
            C::load(path).unwrap_or_else(|err| panic!("Failed to load the {kind} config: {err}"));
        Some(config)
    } else {
        None
    }
}

pub const MODEL_NAME: &str = DEFAULT_NAME;
pub fn save_model<B: Backend>(artifact_dir: &Path, model: &impl Module<B>) {
    let path = artifact_dir.join(MODEL_NAME);
    let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
    println!("Saving model to {:?}", path.with_extension(file_ext));
    model
        .clone()
        .save_file(path, &RecorderTy::new()) // ext added automatically
        .expect("Failed to save the model");
}

pub fn load_model<B: Backend, ModelConfig: ModelConfigExt<B>>(
    artifact_dir: &Path,
    model_config: &ModelConfig,
    device: &B::Device,
) -> Option<ModelConfig::Model> {
    let path = artifact_dir.join(MODEL_NAME);
    let file_ext = <RecorderTy as FileRecorder<B>>::file_extension();
    let path_ext = path.with_extension(file_ext);
    let exists =
        std::fs::exists(&path_ext).unwrap_or_else(|err| panic!("failed to check {path_ext:?}: {err}"));
    if exists {
        println!("Loading model from {path_ext:?}");
        let model_init = model_config.init(device);
        let model = model_init
            .load_file(path, &RecorderTy::new(), device) // ext added automatically
            .expect("Failed to load the model");
        Some(model)
    } else {
        None
    }
}
