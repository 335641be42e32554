//! Environment.
use crate::{frame::Image, record::Record};
use anyhow::Result;

/// Outcome of a single environment step.
#[derive(Debug, Clone)]
pub struct EnvStep {
    /// Raw image observed after the step, channel-first `(C, H, W)`.
    pub image: Image,

    /// Reward of the step.
    pub reward: f32,

    /// Flag denoting if the episode is terminated.
    pub is_terminal: bool,

    /// Additional scalar information reported by the environment.
    ///
    /// An empty record means no information.
    pub info: Record,
}

/// Represents a real-time environment producing image observations.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Resets the environment and returns the initial image.
    fn reset(&mut self) -> Result<Image>;

    /// Performs an environment step with the index of a discrete action.
    fn step(&mut self, action: usize) -> Result<EnvStep>;

    /// Renders the current state, if the environment supports it.
    fn render(&mut self) -> Result<()> {
        Ok(())
    }
}
