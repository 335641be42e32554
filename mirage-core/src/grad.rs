//! Gradients and global-norm clipping.
use ndarray::Array1;

/// Gradient norm threshold used by the coordinator unless configured otherwise.
pub const DEFAULT_GRAD_CLIP_NORM: f32 = 40.0;

/// Global norm over a set of flattened tensors.
pub fn global_norm<'a>(tensors: impl IntoIterator<Item = &'a Array1<f32>>) -> f32 {
    tensors
        .into_iter()
        .map(|t| t.iter().map(|x| x * x).sum::<f32>())
        .sum::<f32>()
        .sqrt()
}

/// Gradients of a loss w.r.t. model parameters, one flattened tensor per variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients(pub Vec<Array1<f32>>);

impl Gradients {
    /// Creates gradients from flattened tensors.
    pub fn new(tensors: Vec<Array1<f32>>) -> Self {
        Self(tensors)
    }

    /// Global norm of all tensors.
    pub fn global_norm(&self) -> f32 {
        global_norm(self.0.iter())
    }

    /// Rescales the gradients so that their global norm is at most `clip_norm`.
    ///
    /// Every tensor is multiplied by `clip_norm / max(norm, clip_norm)`.
    /// Returns the global norm before clipping.
    pub fn clip_by_global_norm(&mut self, clip_norm: f32) -> f32 {
        let norm = self.global_norm();
        if norm > clip_norm {
            let scale = clip_norm / norm;
            self.0.iter_mut().for_each(|t| t.mapv_inplace(|x| x * scale));
        }
        norm
    }

    /// Iterates over the tensors.
    pub fn iter(&self) -> std::slice::Iter<Array1<f32>> {
        self.0.iter()
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there is no tensor.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
