//! Linear WGAN on frame histories.
//!
//! The generator predicts the current frame of a record from the previous one
//! and a noise vector, pixel by pixel: `a * prev + w_z z + b`. The critic is a
//! linear function of a frame. Both train on a CPU in the time of a test and
//! save their parameters as bincode checkpoints the dataset manager picks up.
use anyhow::{bail, Result};
use log::debug;
use mirage_core::{frame::HISTORY_LEN, FrameHistoryRecord, Image};
use mirage_dataset::{CriticStep, Wgan};
use ndarray::{Array1, Array2, Axis};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

/// Length of the noise vector.
pub const Z_DIM: usize = 8;

/// Learning rate of the generator and the critic unless configured otherwise.
pub const WGAN_LEARNING_RATE: f32 = 5e-5;

fn save_bincode<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value)?;
    Ok(())
}

fn load_bincode<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let file = File::open(path)?;
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}

/// Parameters of the generator of [`LinearWgan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    /// Shape of a generated frame.
    pub frame_shape: [usize; 3],

    /// Per-pixel weight of the previous frame.
    pub a: Array1<f32>,

    /// Noise weights, `(frame_len, Z_DIM)`.
    pub w_z: Array2<f32>,

    /// Per-pixel bias.
    pub b: Array1<f32>,
}

impl GeneratorParams {
    /// A generator copying the previous frame with a little noise.
    fn new(frame_shape: [usize; 3], rng: &fastrand::Rng) -> Self {
        let frame_len = frame_shape.iter().product();
        let mut w_z = Array2::<f32>::zeros((frame_len, Z_DIM));
        w_z.mapv_inplace(|_| (rng.f32() * 2.0 - 1.0) * 0.01);
        Self {
            frame_shape,
            a: Array1::ones(frame_len),
            w_z,
            b: Array1::zeros(frame_len),
        }
    }

    /// Loads parameters saved by [`LinearWgan`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_bincode(path)
    }

    fn generate(&self, prev: &Array1<f32>, z: &Array1<f32>) -> Array1<f32> {
        &self.a * prev + self.w_z.dot(z) + &self.b
    }
}

/// Parameters of the critic of [`LinearWgan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticParams {
    /// Weights of the flattened frame.
    pub w: Array1<f32>,
}

impl CriticParams {
    /// Loads parameters saved by [`LinearWgan`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_bincode(path)
    }

    fn score(&self, x: &Array1<f32>) -> f32 {
        self.w.dot(x)
    }
}

/// Linear generator and critic.
///
/// The critic ascends `D(real) - D(fake)`, the generator ascends `D(fake)`,
/// both with plain gradient steps.
pub struct LinearWgan {
    generator: GeneratorParams,
    critic: CriticParams,
    lr: f32,
    sample_dir: PathBuf,
    /// Previous frames of the last real batch, the generator is conditioned on them.
    conditions: Vec<Array1<f32>>,
    rng: fastrand::Rng,
}

impl LinearWgan {
    /// Creates networks for frames of `frame_shape`, writing samples in `sample_dir`.
    pub fn new(frame_shape: [usize; 3], sample_dir: impl AsRef<Path>, seed: u64) -> Self {
        let rng = fastrand::Rng::with_seed(seed);
        let generator = GeneratorParams::new(frame_shape, &rng);
        let frame_len = generator.a.len();
        Self {
            generator,
            critic: CriticParams {
                w: Array1::zeros(frame_len),
            },
            lr: WGAN_LEARNING_RATE,
            sample_dir: sample_dir.as_ref().to_path_buf(),
            conditions: vec![],
            rng,
        }
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, v: f32) -> Self {
        self.lr = v;
        self
    }

    /// Generator parameters.
    pub fn generator(&self) -> &GeneratorParams {
        &self.generator
    }

    /// Critic parameters.
    pub fn critic(&self) -> &CriticParams {
        &self.critic
    }

    fn noise(&self) -> Array1<f32> {
        (0..Z_DIM).map(|_| self.rng.f32() * 2.0 - 1.0).collect()
    }

    /// Flattened previous and current frames of `record`.
    fn split(&self, record: &FrameHistoryRecord) -> Result<(Array1<f32>, Array1<f32>)> {
        let prev = &record.frames[HISTORY_LEN - 2];
        let current = &record.frames[HISTORY_LEN - 1];
        let frame_shape = &self.generator.frame_shape[..];
        if prev.shape() != frame_shape || current.shape() != frame_shape {
            bail!(
                "Record with frames of shape {:?} given to a WGAN on {:?}",
                current.shape(),
                frame_shape
            );
        }
        Ok((
            prev.iter().cloned().collect(),
            current.iter().cloned().collect(),
        ))
    }
}

impl Wgan for LinearWgan {
    fn clamp_critic(&mut self, lower: f32, upper: f32) {
        self.critic.w.mapv_inplace(|v| v.clamp(lower, upper));
    }

    fn critic_step(&mut self, real: &[FrameHistoryRecord]) -> Result<CriticStep> {
        if real.is_empty() {
            bail!("Critic step without real records");
        }
        let pairs = real
            .iter()
            .map(|r| self.split(r))
            .collect::<Result<Vec<_>>>()?;
        let n = pairs.len() as f32;
        let fakes = pairs
            .iter()
            .map(|(prev, _)| self.generator.generate(prev, &self.noise()))
            .collect::<Vec<_>>();

        let real_scores = pairs
            .iter()
            .map(|(_, x)| self.critic.score(x))
            .collect::<Vec<_>>();
        let loss_real = real_scores.iter().sum::<f32>() / n;
        let loss_fake = fakes.iter().map(|x| self.critic.score(x)).sum::<f32>() / n;

        let mut grad = Array1::<f32>::zeros(self.critic.w.len());
        for ((_, x), fake) in pairs.iter().zip(fakes.iter()) {
            grad += x;
            grad -= fake;
        }
        self.critic.w.scaled_add(self.lr / n, &grad);
        self.conditions = pairs.into_iter().map(|(prev, _)| prev).collect();

        Ok(CriticStep {
            loss_real,
            loss_fake,
            real_scores,
        })
    }

    fn generator_step(&mut self, batch_size: usize) -> Result<f32> {
        if self.conditions.is_empty() {
            bail!("Generator step before any critic step");
        }
        let n = batch_size.max(1);
        let mut d_a = Array1::<f32>::zeros(self.generator.a.len());
        let mut z_sum = Array1::<f32>::zeros(Z_DIM);
        let mut score = 0.0;
        for i in 0..n {
            let prev = &self.conditions[i % self.conditions.len()];
            let z = self.noise();
            score += self.critic.score(&self.generator.generate(prev, &z));
            d_a += &(&self.critic.w * prev);
            z_sum += &z;
        }

        let scale = self.lr / n as f32;
        let w = self.critic.w.view().insert_axis(Axis(1));
        let z = z_sum.view().insert_axis(Axis(0));
        self.generator.w_z.scaled_add(scale, &w.dot(&z));
        self.generator.a.scaled_add(scale, &d_a);
        self.generator.b.scaled_add(self.lr, &self.critic.w);

        // Loss to minimize, the negated critic output on generated frames
        Ok(-score / n as f32)
    }

    fn write_samples(&mut self, gen_iterations: usize) -> Result<()> {
        let prev = match self.conditions.first() {
            Some(prev) => prev,
            None => return Ok(()),
        };
        let sample: Image = self
            .generator
            .generate(prev, &self.noise())
            .into_shape(self.generator.frame_shape)?;
        fs::create_dir_all(&self.sample_dir)?;
        let path = self
            .sample_dir
            .join(format!("fake_samples_{}.bin", gen_iterations));
        save_bincode(&sample, &path)?;
        debug!("Wrote a generated frame to {}", path.display());
        Ok(())
    }

    fn save_checkpoint(&self, generator: &Path, critic: &Path) -> Result<()> {
        save_bincode(&self.generator, generator)?;
        save_bincode(&self.critic, critic)?;
        Ok(())
    }
}
