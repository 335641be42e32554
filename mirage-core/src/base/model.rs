//! Local and shared models.
use crate::{advantage::Batch, grad::Gradients};
use anyhow::Result;

/// Synchronizes a model with parameters published elsewhere.
pub trait SyncModel {
    /// Information of the model, typically a snapshot of its parameters.
    type ModelInfo: Clone;

    /// Get `ModelInfo`.
    ///
    /// The first element of the return value is the global step at which the
    /// information was taken.
    fn model_info(&self) -> (usize, Self::ModelInfo);

    /// Synchronizes the model.
    fn sync_model(&mut self, model_info: &Self::ModelInfo);
}

/// Gradients and loss terms of one batch, summed over batch elements.
#[derive(Debug, Clone)]
pub struct GradientReport {
    /// Gradients of the total loss w.r.t. the model parameters.
    pub grads: Gradients,

    /// Policy-gradient loss.
    pub policy_loss: f32,

    /// Value-function loss.
    pub value_loss: f32,

    /// Entropy of the action distribution.
    pub entropy: f32,
}

/// A worker-local copy of the model, owned exclusively by one coordinator.
pub trait LocalModel<F>: SyncModel {
    /// Computes gradients of the A3C loss on `batch`.
    ///
    /// `batch.features` is the recurrent state to replay the segment from.
    fn compute_gradients(&mut self, batch: &Batch<F>) -> Result<GradientReport>;

    /// Global norm of the model parameters.
    fn param_global_norm(&self) -> f32;
}

/// The shared model, mutated only by optimizer steps.
pub trait SharedModel {
    /// Information handed to [`SyncModel::sync_model`] of local models.
    type ModelInfo: Clone;

    /// Returns the current global step and a snapshot of the parameters.
    fn model_info(&self) -> (usize, Self::ModelInfo);

    /// Applies one optimizer update with the given gradients.
    fn apply_gradients(&mut self, grads: &Gradients) -> Result<()>;

    /// Returns the global step counter.
    fn global_step(&self) -> usize;

    /// Advances the global step by `n` processed samples and returns the new value.
    fn advance_global_step(&mut self, n: usize) -> usize;
}
