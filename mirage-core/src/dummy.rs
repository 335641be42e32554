//! Deterministic collaborators used in tests.
//!
//! The recurrent features of [`DummyPolicy`] count the steps since the last
//! reset, which makes feature resets at episode boundaries observable.
use crate::{
    advantage::Batch,
    frame::{one_hot, Image},
    grad::Gradients,
    record::{Record, RecordValue},
    Env, EnvStep, GradientReport, LocalModel, Policy, PolicyOutput, SharedModel, SyncModel,
};
use anyhow::Result;
use ndarray::Array1;

/// Configuration of [`DummyEnv`].
#[derive(Clone, Debug)]
pub struct DummyEnvConfig {
    /// Number of steps in an episode.
    pub episode_len: usize,

    /// Shape of the images, `(C, H, W)`.
    pub shape: (usize, usize, usize),

    /// Reward of every step.
    pub reward: f32,

    /// If `true`, every step reports its index as info `"env/step"`.
    pub with_info: bool,
}

impl Default for DummyEnvConfig {
    fn default() -> Self {
        Self {
            episode_len: 10,
            shape: (3, 4, 4),
            reward: 1.0,
            with_info: false,
        }
    }
}

/// An environment whose images are filled with the global step count.
pub struct DummyEnv {
    config: DummyEnvConfig,
    t: usize,
    total_steps: usize,
    n_resets: usize,
}

impl DummyEnv {
    /// Number of resets so far.
    pub fn n_resets(&self) -> usize {
        self.n_resets
    }

    fn image(&self) -> Image {
        Image::from_elem(self.config.shape, self.total_steps as f32)
    }
}

impl Env for DummyEnv {
    type Config = DummyEnvConfig;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            t: 0,
            total_steps: 0,
            n_resets: 0,
        })
    }

    fn reset(&mut self) -> Result<Image> {
        self.t = 0;
        self.n_resets += 1;
        Ok(self.image())
    }

    fn step(&mut self, action: usize) -> Result<EnvStep> {
        self.t += 1;
        self.total_steps += 1;
        let mut info = Record::empty();
        if self.config.with_info {
            info.insert("env/step", RecordValue::Scalar(self.t as f32));
            info.insert("env/action", RecordValue::Scalar(action as f32));
        }
        Ok(EnvStep {
            image: self.image(),
            reward: self.config.reward,
            is_terminal: self.t >= self.config.episode_len,
            info,
        })
    }
}

/// A policy cycling through the actions.
///
/// Its features count the steps taken since [`Policy::initial_features`].
#[derive(Clone, Debug)]
pub struct DummyPolicy {
    n_actions: usize,
    n_acts: usize,
    synced: Option<usize>,
}

impl DummyPolicy {
    /// Creates a policy over `n_actions` actions.
    pub fn new(n_actions: usize) -> Self {
        Self {
            n_actions,
            n_acts: 0,
            synced: None,
        }
    }

    /// Model info given in the last [`SyncModel::sync_model`] call.
    pub fn synced(&self) -> Option<usize> {
        self.synced
    }
}

impl Policy for DummyPolicy {
    type Features = usize;

    fn initial_features(&self) -> usize {
        0
    }

    fn act(&mut self, _state: &Image, features: &usize) -> Result<PolicyOutput<usize>> {
        let action = one_hot(self.n_acts % self.n_actions, self.n_actions);
        self.n_acts += 1;
        Ok(PolicyOutput {
            action,
            value: 0.5,
            features: features + 1,
        })
    }

    fn value(&mut self, _state: &Image, _features: &usize) -> Result<f32> {
        Ok(1.0)
    }
}

impl SyncModel for DummyPolicy {
    type ModelInfo = usize;

    fn model_info(&self) -> (usize, usize) {
        (0, self.synced.unwrap_or(0))
    }

    fn sync_model(&mut self, model_info: &usize) {
        self.synced = Some(*model_info);
    }
}

/// A local model returning fixed gradients.
#[derive(Clone, Debug)]
pub struct DummyLocalModel {
    grads: Gradients,
    version: usize,
    batch_sizes: Vec<usize>,
    initial_features: Vec<usize>,
}

impl DummyLocalModel {
    /// Creates a model whose gradients are always `grads`.
    pub fn new(grads: Gradients) -> Self {
        Self {
            grads,
            version: 0,
            batch_sizes: vec![],
            initial_features: vec![],
        }
    }

    /// Sizes of the batches gradients were computed on.
    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    /// Features of the batches gradients were computed on.
    pub fn initial_features(&self) -> &[usize] {
        &self.initial_features
    }

    /// Version of the parameters the model was last synchronized to.
    pub fn version(&self) -> usize {
        self.version
    }
}

impl SyncModel for DummyLocalModel {
    type ModelInfo = usize;

    fn model_info(&self) -> (usize, usize) {
        (0, self.version)
    }

    fn sync_model(&mut self, model_info: &usize) {
        self.version = *model_info;
    }
}

impl LocalModel<usize> for DummyLocalModel {
    fn compute_gradients(&mut self, batch: &Batch<usize>) -> Result<GradientReport> {
        self.batch_sizes.push(batch.len());
        self.initial_features.push(batch.features);
        let n = batch.len() as f32;
        Ok(GradientReport {
            grads: self.grads.clone(),
            policy_loss: 2.0 * n,
            value_loss: 3.0 * n,
            entropy: n,
        })
    }

    fn param_global_norm(&self) -> f32 {
        1.0
    }
}

/// A shared model remembering the gradients applied to it.
///
/// Its model info is the number of applied updates.
#[derive(Clone, Debug, Default)]
pub struct DummySharedModel {
    global_step: usize,
    applied: Vec<Gradients>,
}

impl DummySharedModel {
    /// Creates a model at global step 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gradients applied so far.
    pub fn applied(&self) -> &[Gradients] {
        &self.applied
    }
}

impl SharedModel for DummySharedModel {
    type ModelInfo = usize;

    fn model_info(&self) -> (usize, usize) {
        (self.global_step, self.applied.len())
    }

    fn apply_gradients(&mut self, grads: &Gradients) -> Result<()> {
        self.applied.push(grads.clone());
        Ok(())
    }

    fn global_step(&self) -> usize {
        self.global_step
    }

    fn advance_global_step(&mut self, n: usize) -> usize {
        self.global_step += n;
        self.global_step
    }
}

/// Fixed gradients with global norm 50.
pub fn gradients_of_norm_50() -> Gradients {
    Gradients::new(vec![Array1::from(vec![30.0, 0.0]), Array1::from(vec![40.0])])
}
