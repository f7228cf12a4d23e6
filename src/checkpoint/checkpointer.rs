//! Agent checkpointing.
//!
//! Saves and restores agent module records during training, with best-agent
//! tracking and cleanup of stale files.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory checkpoint files are written to (created on construction).
    pub checkpoint_dir: PathBuf,
    /// Environment steps between checkpoint saves.
    pub save_interval: usize,
    /// How many recent step checkpoints to retain; 0 keeps everything.
    /// `best.bin` is never pruned.
    pub keep_last_n: usize,
    /// Whether to track and save the best agent by evaluation return.
    pub save_best: bool,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_interval: 10_000,
            keep_last_n: 5,
            save_best: true,
        }
    }
}

impl CheckpointerConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    /// Filesystem failure while reading or writing a checkpoint.
    Io(io::Error),
    /// Record serialization or deserialization failure.
    Recorder(String),
    /// The directory holds no agent checkpoints.
    NoCheckpoints,
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "Recorder error: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "No checkpoints found"),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// Checkpoint metadata.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    /// Location of the record file.
    pub path: PathBuf,
    /// Environment step at which the checkpoint was saved.
    pub step: usize,
    /// Evaluation return attached at save time, if any.
    pub metric: Option<f32>,
}

/// Saves agent records on an interval, keeps the best one, and prunes old
/// files. The record type is any burn [`Module`]; the agent passes its
/// combined module bundle.
pub struct Checkpointer {
    config: CheckpointerConfig,
    best_metric: f32,
    history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Creates the checkpoint directory if it does not exist.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;

        Ok(Self {
            config,
            best_metric: f32::NEG_INFINITY,
            history: Vec::new(),
        })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    pub fn should_save(&self, step: usize) -> bool {
        step > 0 && step % self.config.save_interval == 0
    }

    /// Save an agent record at `step`, with an optional evaluation return
    /// driving best-agent tracking.
    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        modules: &M,
        step: usize,
        metric: Option<f32>,
    ) -> Result<PathBuf, CheckpointError> {
        let filename = format!("agent_{:08}.bin", step);
        let path = self.config.checkpoint_dir.join(&filename);

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        modules
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        self.history.push(CheckpointInfo {
            path: path.clone(),
            step,
            metric,
        });

        if self.config.save_best {
            if let Some(m) = metric {
                if m > self.best_metric {
                    self.best_metric = m;
                    let best_path = self.config.checkpoint_dir.join("best.bin");
                    modules
                        .clone()
                        .save_file(&best_path, &recorder)
                        .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
                }
            }
        }

        self.cleanup_old_checkpoints();

        Ok(path)
    }

    /// Load an agent record from a file into a freshly initialized template.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        template
            .load_file(path, &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the best-return agent, if one was saved.
    pub fn load_best<B: Backend, M: Module<B>>(
        &self,
        template: M,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let best_path = self.config.checkpoint_dir.join("best.bin");
        if !best_path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        self.load(template, &best_path, device)
    }

    /// Load the most recent checkpoint, returning the modules and the step
    /// they were saved at.
    pub fn load_latest<B: Backend, M: Module<B>>(
        &self,
        template: M,
        device: &B::Device,
    ) -> Result<(M, usize), CheckpointError> {
        let latest = self.find_latest_checkpoint()?;
        let modules = self.load(template, &latest.path, device)?;
        Ok((modules, latest.step))
    }

    /// Find the most recent checkpoint in the directory by filename, which
    /// sorts by step thanks to the zero-padded step number.
    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        let latest = self
            .list_checkpoints()?
            .pop()
            .ok_or(CheckpointError::NoCheckpoints)?;
        Ok(latest)
    }

    /// All checkpoints in the directory, sorted by step.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let filename = path.file_name()?.to_str()?;
                let step = filename
                    .strip_prefix("agent_")?
                    .strip_suffix(".bin")?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo {
                    path,
                    step,
                    metric: None,
                })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    pub fn best_metric(&self) -> f32 {
        self.best_metric
    }

    fn cleanup_old_checkpoints(&mut self) {
        if self.config.keep_last_n == 0 {
            return; // keep all
        }
        while self.history.len() > self.config.keep_last_n {
            let old = self.history.remove(0);
            let _ = fs::remove_file(&old.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::LinearConfig;
    use tempfile::tempdir;

    type B = NdArray<f32>;

    fn linear_weights(linear: &burn::nn::Linear<B>) -> Vec<f32> {
        linear
            .weight
            .val()
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_config_builders() {
        let config = CheckpointerConfig::new("./runs/agent")
            .with_save_interval(2_000)
            .with_keep_last_n(2)
            .with_save_best(false);

        assert_eq!(config.checkpoint_dir, PathBuf::from("./runs/agent"));
        assert_eq!(config.save_interval, 2_000);
        assert_eq!(config.keep_last_n, 2);
        assert!(!config.save_best);
    }

    #[test]
    fn test_save_cadence_follows_interval() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(
            CheckpointerConfig::new(dir.path()).with_save_interval(500),
        )
        .unwrap();

        // Step 0 never saves; only exact multiples of the interval do.
        assert!(!checkpointer.should_save(0));
        assert!(!checkpointer.should_save(499));
        assert!(checkpointer.should_save(500));
        assert!(!checkpointer.should_save(501));
        assert!(checkpointer.should_save(1500));
    }

    #[test]
    fn test_creates_nested_run_directory() {
        let dir = tempdir().unwrap();
        let run_dir = dir.path().join("runs/cartpole/agent");

        let _ = Checkpointer::new(CheckpointerConfig::new(&run_dir)).unwrap();
        assert!(run_dir.exists());
    }

    #[test]
    fn test_load_best_survives_pruning() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let mut checkpointer = Checkpointer::new(
            CheckpointerConfig::new(dir.path()).with_keep_last_n(1),
        )
        .unwrap();

        let strong = LinearConfig::new(3, 3).init::<B>(&device);
        let weak = LinearConfig::new(3, 3).init::<B>(&device);
        checkpointer.save(&strong, 10, Some(9.0)).unwrap();
        checkpointer.save(&weak, 20, Some(2.0)).unwrap();

        // Pruning removed the step-10 file, yet its weights remain the best.
        assert_eq!(checkpointer.list_checkpoints().unwrap().len(), 1);
        let template = LinearConfig::new(3, 3).init::<B>(&device);
        let loaded = checkpointer.load_best(template, &device).unwrap();
        assert_eq!(linear_weights(&loaded), linear_weights(&strong));
    }

    #[test]
    fn test_load_best_without_best_file_errors() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(
            CheckpointerConfig::new(dir.path()).with_save_best(false),
        )
        .unwrap();
        let device = Default::default();

        let template = LinearConfig::new(2, 2).init::<B>(&device);
        assert!(matches!(
            checkpointer.load_best(template, &device),
            Err(CheckpointError::NoCheckpoints)
        ));
    }

    #[test]
    fn test_save_and_load_latest_round_trip() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let mut checkpointer =
            Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();

        let module = LinearConfig::new(4, 3).init::<B>(&device);
        checkpointer.save(&module, 100, None).unwrap();
        checkpointer.save(&module, 200, None).unwrap();

        let template = LinearConfig::new(4, 3).init::<B>(&device);
        let (loaded, step) = checkpointer.load_latest(template, &device).unwrap();
        assert_eq!(step, 200);

        let original = module.weight.val().into_data();
        let restored = loaded.weight.val().into_data();
        assert_eq!(
            original.as_slice::<f32>().unwrap(),
            restored.as_slice::<f32>().unwrap()
        );
    }

    #[test]
    fn test_best_tracking_and_cleanup() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = CheckpointerConfig::new(dir.path()).with_keep_last_n(2);
        let mut checkpointer = Checkpointer::new(config).unwrap();

        let module = LinearConfig::new(2, 2).init::<B>(&device);
        checkpointer.save(&module, 1, Some(1.0)).unwrap();
        checkpointer.save(&module, 2, Some(5.0)).unwrap();
        checkpointer.save(&module, 3, Some(2.0)).unwrap();

        assert_eq!(checkpointer.best_metric(), 5.0);
        assert!(dir.path().join("best.bin").exists());

        let remaining = checkpointer.list_checkpoints().unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].step, 2);
        assert_eq!(remaining[1].step, 3);
    }

    #[test]
    fn test_no_checkpoints_error() {
        let dir = tempdir().unwrap();
        let checkpointer =
            Checkpointer::new(CheckpointerConfig::new(dir.path())).unwrap();
        assert!(matches!(
            checkpointer.find_latest_checkpoint(),
            Err(CheckpointError::NoCheckpoints)
        ));
    }
}
