//! Trajectory segments.
use crate::{error::MirageError, frame::Image};
use anyhow::Result;
use ndarray::Array1;

/// A piece of a complete rollout.
///
/// The environment driver runs the policy and hands a segment over to the
/// coordinator once it has collected enough steps or the episode ended.
/// Transitions `(state, action, reward, value, features)` are stored as five
/// parallel vectors.
#[derive(Debug, Clone)]
pub struct TrajectorySegment<F> {
    /// Luminance states the actions were taken in.
    pub states: Vec<Image>,

    /// One-hot actions.
    pub actions: Vec<Array1<f32>>,

    /// Rewards.
    pub rewards: Vec<f32>,

    /// Value estimates of the states.
    pub values: Vec<f32>,

    /// Recurrent features the policy held before each action.
    pub features: Vec<F>,

    /// Bootstrap value: estimated return of the state following the last
    /// transition, `0` if the episode ended.
    pub r: f32,

    /// `true` if the last transition terminated the episode.
    pub terminal: bool,
}

impl<F> Default for TrajectorySegment<F> {
    fn default() -> Self {
        Self {
            states: vec![],
            actions: vec![],
            rewards: vec![],
            values: vec![],
            features: vec![],
            r: 0.0,
            terminal: false,
        }
    }
}

impl<F> TrajectorySegment<F> {
    /// Creates an empty segment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transition.
    pub fn add(
        &mut self,
        state: Image,
        action: Array1<f32>,
        reward: f32,
        value: f32,
        terminal: bool,
        features: F,
    ) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
        self.values.push(value);
        self.terminal = terminal;
        self.features.push(features);
    }

    /// Appends the transitions of `other` and adopts its bootstrap value and
    /// terminal flag.
    ///
    /// Fails with [`MirageError::ExtendTerminalSegment`] if `self` is terminal.
    pub fn extend(&mut self, other: TrajectorySegment<F>) -> Result<()> {
        if self.terminal {
            return Err(MirageError::ExtendTerminalSegment.into());
        }
        self.states.extend(other.states);
        self.actions.extend(other.actions);
        self.rewards.extend(other.rewards);
        self.values.extend(other.values);
        self.features.extend(other.features);
        self.r = other.r;
        self.terminal = other.terminal;
        Ok(())
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the segment has no transition.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}
