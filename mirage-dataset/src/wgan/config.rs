//! Configuration of [`WganTrainer`](super::WganTrainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Configuration of [`WganTrainer`](super::WganTrainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct WganConfig {
    /// Number of records in a real batch.
    pub batch_size: usize,

    /// Critic iterations per generator iteration after the warmup.
    pub n_critic: usize,

    /// Lower bound of the critic parameters.
    pub clamp_lower: f32,

    /// Upper bound of the critic parameters.
    pub clamp_upper: f32,

    /// Number of epochs.
    pub n_epochs: usize,

    /// Number of real batches drawn in an epoch.
    pub iters_per_epoch: usize,

    /// Interval of sample writing in generator iterations, 0 disables it.
    pub sample_interval: usize,

    /// Directory of samples and checkpoints.
    pub experiment_dir: PathBuf,

    /// Extension of the checkpoint files.
    pub checkpoint_ext: String,
}

impl Default for WganConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            n_critic: 5,
            clamp_lower: -0.01,
            clamp_upper: 0.01,
            n_epochs: 25,
            iters_per_epoch: 1000,
            sample_interval: 500,
            experiment_dir: PathBuf::from("experiment"),
            checkpoint_ext: "pth".to_string(),
        }
    }
}

impl WganConfig {
    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the number of critic iterations per generator iteration.
    pub fn n_critic(mut self, v: usize) -> Self {
        self.n_critic = v;
        self
    }

    /// Sets the bounds of the critic parameters.
    pub fn clamp(mut self, lower: f32, upper: f32) -> Self {
        self.clamp_lower = lower;
        self.clamp_upper = upper;
        self
    }

    /// Sets the number of epochs.
    pub fn n_epochs(mut self, v: usize) -> Self {
        self.n_epochs = v;
        self
    }

    /// Sets the number of real batches in an epoch.
    pub fn iters_per_epoch(mut self, v: usize) -> Self {
        self.iters_per_epoch = v;
        self
    }

    /// Sets the interval of sample writing.
    pub fn sample_interval(mut self, v: usize) -> Self {
        self.sample_interval = v;
        self
    }

    /// Sets the directory of samples and checkpoints.
    pub fn experiment_dir(mut self, v: impl AsRef<Path>) -> Self {
        self.experiment_dir = v.as_ref().to_path_buf();
        self
    }

    /// Constructs [`WganConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`WganConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
