//! Configuration of [`DatasetManager`](super::DatasetManager).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
    time::Duration,
};

/// Configuration of [`DatasetManager`](super::DatasetManager).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DatasetManagerConfig {
    /// Directory of the persisted dataset.
    pub data_dir: PathBuf,

    /// Shape `(C, H, W)` of the frames.
    pub frame_shape: [usize; 3],

    /// Maximum number of records kept in the persisted dataset.
    pub gan_recent_dataset: usize,

    /// Interval between persistence cycles in seconds.
    pub gan_worker_com_interval_secs: f32,

    /// Directory of the generator checkpoints.
    pub experiment_dir: PathBuf,

    /// Extension of the generator checkpoint files.
    pub checkpoint_ext: String,
}

impl Default for DatasetManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            frame_shape: [3, 64, 64],
            gan_recent_dataset: 10000,
            gan_worker_com_interval_secs: 60.0,
            experiment_dir: PathBuf::from("experiment"),
            checkpoint_ext: "pth".to_string(),
        }
    }
}

impl DatasetManagerConfig {
    /// Sets the directory of the persisted dataset.
    pub fn data_dir(mut self, v: impl AsRef<Path>) -> Self {
        self.data_dir = v.as_ref().to_path_buf();
        self
    }

    /// Sets the shape of the frames.
    pub fn frame_shape(mut self, v: [usize; 3]) -> Self {
        self.frame_shape = v;
        self
    }

    /// Sets the maximum number of persisted records.
    pub fn gan_recent_dataset(mut self, v: usize) -> Self {
        self.gan_recent_dataset = v;
        self
    }

    /// Sets the interval between persistence cycles in seconds.
    pub fn gan_worker_com_interval_secs(mut self, v: f32) -> Self {
        self.gan_worker_com_interval_secs = v;
        self
    }

    /// Sets the directory of the generator checkpoints.
    pub fn experiment_dir(mut self, v: impl AsRef<Path>) -> Self {
        self.experiment_dir = v.as_ref().to_path_buf();
        self
    }

    /// Sets the extension of the checkpoint files.
    pub fn checkpoint_ext(mut self, v: impl Into<String>) -> Self {
        self.checkpoint_ext = v.into();
        self
    }

    /// Interval between persistence cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f32(self.gan_worker_com_interval_secs.max(0.0))
    }

    /// Constructs [`DatasetManagerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DatasetManagerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
