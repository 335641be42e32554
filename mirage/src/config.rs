//! Configuration of a training run.
use crate::env::{DotEnvConfig, N_ACTIONS};
use crate::linear::DEFAULT_LEARNING_RATE;
use anyhow::{bail, Result};
use mirage_async_trainer::{CoordinatorConfig, EnvDriverConfig};
use mirage_dataset::{DatasetManagerConfig, WganConfig};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Configuration of a training run.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct MirageConfig {
    /// Configuration of the environment driver.
    pub driver: EnvDriverConfig,

    /// Configuration of the training coordinator.
    pub coordinator: CoordinatorConfig,

    /// Configuration of the dataset manager.
    pub dataset: DatasetManagerConfig,

    /// Configuration of the WGAN trainer.
    pub wgan: WganConfig,

    /// Configuration of the environment.
    pub env: DotEnvConfig,

    /// Directory of TensorBoard logs.
    pub log_dir: PathBuf,

    /// Number of coordinator iterations, unbounded if `None`.
    pub max_iterations: Option<usize>,

    /// Learning rate of the shared model.
    pub learning_rate: f32,

    /// Scale of the initial weights.
    pub init_scale: f32,

    /// Random seed.
    pub seed: u64,
}

impl Default for MirageConfig {
    fn default() -> Self {
        let env = DotEnvConfig::default();
        let dataset = DatasetManagerConfig::default().frame_shape(env.frame_shape());
        Self {
            driver: EnvDriverConfig::default().action_space(N_ACTIONS),
            coordinator: CoordinatorConfig::default(),
            wgan: WganConfig::default().experiment_dir(&dataset.experiment_dir),
            dataset,
            env,
            log_dir: PathBuf::from("logs"),
            max_iterations: None,
            learning_rate: DEFAULT_LEARNING_RATE,
            init_scale: 0.01,
            seed: 42,
        }
    }
}

impl MirageConfig {
    /// Sets the configuration of the environment and the frame shape of the dataset.
    pub fn env(mut self, v: DotEnvConfig) -> Self {
        self.dataset = self.dataset.frame_shape(v.frame_shape());
        self.env = v;
        self
    }

    /// Sets the directory the WGAN trainer writes checkpoints to and the
    /// dataset manager reloads the generator from.
    pub fn experiment_dir(mut self, v: impl AsRef<Path>) -> Self {
        self.dataset = self.dataset.experiment_dir(v.as_ref());
        self.wgan = self.wgan.experiment_dir(v);
        self
    }

    /// Sets the directory of TensorBoard logs.
    pub fn log_dir(mut self, v: impl AsRef<Path>) -> Self {
        self.log_dir = v.as_ref().to_path_buf();
        self
    }

    /// Sets the number of coordinator iterations.
    pub fn max_iterations(mut self, v: Option<usize>) -> Self {
        self.max_iterations = v;
        self
    }

    /// Sets the learning rate of the shared model.
    pub fn learning_rate(mut self, v: f32) -> Self {
        self.learning_rate = v;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Checks that the sections agree with each other and with the environment.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.summary_interval == 0 {
            bail!("coordinator.summary_interval must be positive");
        }
        if self.wgan.sample_interval == 0 {
            bail!("wgan.sample_interval must be positive");
        }
        if self.wgan.experiment_dir != self.dataset.experiment_dir
            || self.wgan.checkpoint_ext != self.dataset.checkpoint_ext
        {
            bail!(
                "WGAN checkpoints go to {:?} (*.{}), the dataset manager reads {:?} (*.{})",
                self.wgan.experiment_dir,
                self.wgan.checkpoint_ext,
                self.dataset.experiment_dir,
                self.dataset.checkpoint_ext
            );
        }
        if self.driver.action_space != N_ACTIONS {
            bail!(
                "driver.action_space is {}, the environment has {} actions",
                self.driver.action_space,
                N_ACTIONS
            );
        }
        if self.dataset.frame_shape != self.env.frame_shape() {
            bail!(
                "dataset.frame_shape is {:?}, the environment produces {:?}",
                self.dataset.frame_shape,
                self.env.frame_shape()
            );
        }
        Ok(())
    }

    /// Constructs [`MirageConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MirageConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_mirage_config() -> Result<()> {
        let config = MirageConfig::default()
            .env(DotEnvConfig::default().size(8))
            .log_dir("runs/dot")
            .experiment_dir("runs/dot/experiment")
            .max_iterations(Some(100))
            .seed(3);
        config.validate()?;
        assert_eq!(config.dataset.frame_shape, [3, 8, 8]);
        assert_eq!(config.wgan.experiment_dir, config.dataset.experiment_dir);

        let dir = TempDir::new("mirage_config")?;
        let path = dir.path().join("mirage.yaml");
        config.save(&path)?;
        let config_ = MirageConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn test_validate() {
        let mut config = MirageConfig::default();
        assert!(config.validate().is_ok());
        config.driver = config.driver.action_space(6);
        assert!(config.validate().is_err());

        let mut config = MirageConfig::default();
        config.dataset = config.dataset.frame_shape([3, 64, 64]);
        assert!(config.validate().is_err());

        let mut config = MirageConfig::default();
        config.wgan = config.wgan.experiment_dir("elsewhere");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let mut config = MirageConfig::default();
        config.coordinator = config.coordinator.summary_interval(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("summary_interval"));

        let mut config = MirageConfig::default();
        config.wgan = config.wgan.sample_interval(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sample_interval"));
    }
}
