//! A toy pixel environment.
use anyhow::{bail, Result};
use mirage_core::{
    record::{Record, RecordValue},
    Env, EnvStep, Image,
};
use serde::{Deserialize, Serialize};

/// Number of actions of [`DotEnv`]: up, down, left and right.
pub const N_ACTIONS: usize = 4;

/// Configuration of [`DotEnv`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DotEnvConfig {
    /// Height and width of the images.
    pub size: usize,

    /// Maximum number of steps in an episode.
    pub max_steps: usize,

    /// Reward of a step that does not reach the dot.
    pub step_penalty: f32,
}

impl Default for DotEnvConfig {
    fn default() -> Self {
        Self {
            size: 16,
            max_steps: 64,
            step_penalty: -0.01,
        }
    }
}

impl DotEnvConfig {
    /// Sets the height and width of the images.
    pub fn size(mut self, v: usize) -> Self {
        self.size = v;
        self
    }

    /// Sets the maximum number of steps in an episode.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Shape `(C, H, W)` of the images.
    pub fn frame_shape(&self) -> [usize; 3] {
        [3, self.size, self.size]
    }
}

/// Moves a cursor on a square grid until it reaches a dot.
///
/// The red channel of the image shows the dot and the green channel the cursor.
/// Reaching the dot gives reward 1 and ends the episode.
pub struct DotEnv {
    config: DotEnvConfig,
    rng: fastrand::Rng,
    dot: (usize, usize),
    cursor: (usize, usize),
    t: usize,
}

impl DotEnv {
    fn random_position(&self) -> (usize, usize) {
        (
            self.rng.usize(0..self.config.size),
            self.rng.usize(0..self.config.size),
        )
    }

    fn distance(&self) -> usize {
        let dy = (self.dot.0 as isize - self.cursor.0 as isize).abs();
        let dx = (self.dot.1 as isize - self.cursor.1 as isize).abs();
        (dy + dx) as usize
    }

    fn image(&self) -> Image {
        let mut image = Image::zeros((3, self.config.size, self.config.size));
        image[[0, self.dot.0, self.dot.1]] = 1.0;
        image[[1, self.cursor.0, self.cursor.1]] = 1.0;
        image
    }

    /// Position `(row, column)` of the dot.
    pub fn dot(&self) -> (usize, usize) {
        self.dot
    }

    /// Position `(row, column)` of the cursor.
    pub fn cursor(&self) -> (usize, usize) {
        self.cursor
    }
}

impl Env for DotEnv {
    type Config = DotEnvConfig;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        if config.size < 2 {
            bail!("DotEnv needs a grid of at least 2x2, got size {}", config.size);
        }
        Ok(Self {
            config: config.clone(),
            rng: fastrand::Rng::with_seed(seed as u64),
            dot: (0, 0),
            cursor: (0, 1),
            t: 0,
        })
    }

    fn reset(&mut self) -> Result<Image> {
        self.t = 0;
        self.dot = self.random_position();
        self.cursor = self.random_position();
        while self.cursor == self.dot {
            self.cursor = self.random_position();
        }
        Ok(self.image())
    }

    fn step(&mut self, action: usize) -> Result<EnvStep> {
        let last = self.config.size - 1;
        let (y, x) = self.cursor;
        self.cursor = match action {
            0 => (y.saturating_sub(1), x),
            1 => ((y + 1).min(last), x),
            2 => (y, x.saturating_sub(1)),
            3 => (y, (x + 1).min(last)),
            _ => bail!("Invalid action {} for DotEnv", action),
        };
        self.t += 1;

        let reached = self.cursor == self.dot;
        let reward = if reached { 1.0 } else { self.config.step_penalty };
        let info = Record::from_slice(&[(
            "env/distance",
            RecordValue::Scalar(self.distance() as f32),
        )]);

        Ok(EnvStep {
            image: self.image(),
            reward,
            is_terminal: reached || self.t >= self.config.max_steps,
            info,
        })
    }
}
