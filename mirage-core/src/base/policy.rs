//! Policy.
use crate::frame::Image;
use anyhow::Result;
use ndarray::Array1;

/// Output of [`Policy::act`].
#[derive(Debug, Clone)]
pub struct PolicyOutput<F> {
    /// One-hot encoded action.
    pub action: Array1<f32>,

    /// Value estimate of the state the action was taken in.
    pub value: f32,

    /// Recurrent features after consuming the state.
    pub features: F,
}

/// A recurrent actor-critic policy acting on luminance states.
///
/// Policies without recurrent state use `()` as [`Policy::Features`].
pub trait Policy {
    /// Recurrent state carried between steps.
    type Features: Clone;

    /// Returns the recurrent state at the beginning of an episode.
    fn initial_features(&self) -> Self::Features;

    /// Samples an action for `state`.
    fn act(&mut self, state: &Image, features: &Self::Features)
        -> Result<PolicyOutput<Self::Features>>;

    /// Returns the value estimate of `state`.
    fn value(&mut self, state: &Image, features: &Self::Features) -> Result<f32>;
}
