//! Configuration of [`TrainingCoordinator`](super::TrainingCoordinator).
use anyhow::Result;
use mirage_core::{
    advantage::{DEFAULT_GAMMA, DEFAULT_LAMBDA},
    grad::DEFAULT_GRAD_CLIP_NORM,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
    time::Duration,
};

/// Configuration of [`TrainingCoordinator`](super::TrainingCoordinator).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CoordinatorConfig {
    /// Index of the worker. Only worker 0 writes summaries.
    pub task: usize,

    /// Discount factor.
    pub gamma: f32,

    /// GAE parameter.
    pub lambda: f32,

    /// Threshold of the global norm of gradients.
    pub grad_clip_norm: f32,

    /// Interval of summaries in iterations, 0 disables them.
    pub summary_interval: usize,

    /// If `false`, gradients are computed but not applied.
    pub agent_learning: bool,

    /// Timeout of taking a segment from the queue in seconds.
    pub queue_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            task: 0,
            gamma: DEFAULT_GAMMA,
            lambda: DEFAULT_LAMBDA,
            grad_clip_norm: DEFAULT_GRAD_CLIP_NORM,
            summary_interval: 11,
            agent_learning: true,
            queue_timeout_secs: 600,
        }
    }
}

impl CoordinatorConfig {
    /// Sets the index of the worker.
    pub fn task(mut self, v: usize) -> Self {
        self.task = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the GAE parameter.
    pub fn lambda(mut self, v: f32) -> Self {
        self.lambda = v;
        self
    }

    /// Sets the threshold of the gradient norm.
    pub fn grad_clip_norm(mut self, v: f32) -> Self {
        self.grad_clip_norm = v;
        self
    }

    /// Sets the interval of summaries.
    pub fn summary_interval(mut self, v: usize) -> Self {
        self.summary_interval = v;
        self
    }

    /// Sets whether gradients are applied to the shared model.
    pub fn agent_learning(mut self, v: bool) -> Self {
        self.agent_learning = v;
        self
    }

    /// Sets the queue timeout in seconds.
    pub fn queue_timeout_secs(mut self, v: u64) -> Self {
        self.queue_timeout_secs = v;
        self
    }

    /// Queue timeout.
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    /// Constructs [`CoordinatorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CoordinatorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
