//! Image observations and frame-history records.
//!
//! Raw images from an [`Env`](crate::Env) are channel-first `(C, H, W)` arrays.
//! The policy consumes luminance states of shape `(H, W, 1)`, while the
//! generative model is trained on [`FrameHistoryRecord`]s built from raw images.
use anyhow::Result;
use ndarray::{Array1, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Image observation.
pub type Image = Array3<f32>;

/// Number of frames in a [`FrameHistoryRecord`].
pub const HISTORY_LEN: usize = 4;

/// Converts a channel-first color image to a luminance state of shape `(H, W, 1)`.
///
/// Weights `0.299`, `0.587` and `0.114` are applied to channels 0, 1 and 2.
pub fn rgb_to_gray(rgb: &Image) -> Image {
    let gray = &rgb.index_axis(Axis(0), 0) * 0.299
        + &rgb.index_axis(Axis(0), 1) * 0.587
        + &rgb.index_axis(Axis(0), 2) * 0.114;
    gray.insert_axis(Axis(2))
}

/// Index of the largest element, the first one on ties.
pub fn argmax(xs: &Array1<f32>) -> usize {
    xs.iter()
        .enumerate()
        .fold((0, f32::MIN), |(ix, max), (i, &x)| {
            if x > max {
                (i, x)
            } else {
                (ix, max)
            }
        })
        .0
}

/// One-hot vector of length `n` with `1.0` at `ix`.
pub fn one_hot(ix: usize, n: usize) -> Array1<f32> {
    let mut v = Array1::zeros(n);
    v[ix] = 1.0;
    v
}

/// Four consecutive raw frames of one episode and the action taken on the last step.
///
/// `aux` has the shape of a frame. Its top-left cell holds the normalized action
/// index `argmax(action) / action_space`; every other cell is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHistoryRecord {
    /// Three prior frames followed by the current one, oldest first.
    pub frames: [Image; HISTORY_LEN],

    /// Auxiliary channel encoding the action.
    pub aux: Image,
}

impl FrameHistoryRecord {
    /// Builds a record, encoding `action_index` into the auxiliary array.
    pub fn new(frames: [Image; HISTORY_LEN], action_index: usize, action_space: usize) -> Self {
        let mut aux = Image::zeros(frames[HISTORY_LEN - 1].raw_dim());
        if let Some(cell) = aux.get_mut([0, 0, 0]) {
            *cell = action_index as f32 / action_space as f32;
        }
        Self { frames, aux }
    }

    /// Shape of the frames.
    pub fn shape(&self) -> &[usize] {
        self.aux.shape()
    }

    /// Normalized action index stored in the auxiliary array.
    pub fn normalized_action(&self) -> f32 {
        self.aux.get([0, 0, 0]).copied().unwrap_or(0.0)
    }
}

/// Rolling window of raw frames since the last episode reset.
#[derive(Debug, Default)]
pub struct FrameHistory {
    prior: VecDeque<Image>,
}

impl FrameHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self {
            prior: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Observes the image produced by a step with `action_index`.
    ///
    /// Returns a record once three prior frames of the current episode are
    /// available, i.e. from the fourth observed frame onwards.
    pub fn observe(
        &mut self,
        image: &Image,
        action_index: usize,
        action_space: usize,
    ) -> Option<FrameHistoryRecord> {
        let record = if self.prior.len() == HISTORY_LEN - 1 {
            let frames = [
                self.prior[0].clone(),
                self.prior[1].clone(),
                self.prior[2].clone(),
                image.clone(),
            ];
            Some(FrameHistoryRecord::new(frames, action_index, action_space))
        } else {
            None
        };

        self.prior.push_back(image.clone());
        if self.prior.len() > HISTORY_LEN - 1 {
            self.prior.pop_front();
        }
        record
    }

    /// Forgets all frames. Called at episode boundaries.
    pub fn reset(&mut self) {
        self.prior.clear();
    }

    /// Number of frames available to the next record.
    pub fn len(&self) -> usize {
        self.prior.len()
    }

    /// Returns `true` if no frame has been observed since the last reset.
    pub fn is_empty(&self) -> bool {
        self.prior.is_empty()
    }
}

/// Destination of frame-history records emitted by the environment driver.
pub trait FrameSink {
    /// Appends records to the sink.
    fn push_data(&self, records: Vec<FrameHistoryRecord>) -> Result<()>;
}
