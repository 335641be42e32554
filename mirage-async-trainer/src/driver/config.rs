//! Configuration of [`EnvironmentDriver`](super::EnvironmentDriver).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
    time::Duration,
};

/// Configuration of [`EnvironmentDriver`](super::EnvironmentDriver).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EnvDriverConfig {
    /// Maximum number of transitions in a segment.
    pub num_local_steps: usize,

    /// If `false`, actions are sampled uniformly instead of taken from the policy.
    pub agent_acting: bool,

    /// Number of discrete actions.
    pub action_space: usize,

    /// If `true`, the environment is rendered after every step.
    pub render: bool,

    /// Capacity of the segment queue.
    pub queue_capacity: usize,

    /// Timeout of putting a segment into the queue in seconds.
    pub queue_timeout_secs: u64,
}

impl Default for EnvDriverConfig {
    fn default() -> Self {
        Self {
            num_local_steps: 20,
            agent_acting: true,
            action_space: 4,
            render: false,
            queue_capacity: 5,
            queue_timeout_secs: 600,
        }
    }
}

impl EnvDriverConfig {
    /// Sets the maximum number of transitions in a segment.
    pub fn num_local_steps(mut self, v: usize) -> Self {
        self.num_local_steps = v;
        self
    }

    /// Sets whether the policy chooses the actions.
    pub fn agent_acting(mut self, v: bool) -> Self {
        self.agent_acting = v;
        self
    }

    /// Sets the number of discrete actions.
    pub fn action_space(mut self, v: usize) -> Self {
        self.action_space = v;
        self
    }

    /// Sets whether the environment is rendered.
    pub fn render(mut self, v: bool) -> Self {
        self.render = v;
        self
    }

    /// Sets the capacity of the segment queue.
    pub fn queue_capacity(mut self, v: usize) -> Self {
        self.queue_capacity = v;
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

    /// Constructs [`EnvDriverConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`EnvDriverConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
