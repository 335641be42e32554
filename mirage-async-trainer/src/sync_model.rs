use std::sync::{Arc, Mutex};

/// Latest model information published by the coordinator.
///
/// The coordinator publishes the parameters its local model was synchronized
/// to, and the environment driver adopts them before collecting a segment.
/// Every publication gets a new version number.
pub struct ModelInfoSlot<M> {
    inner: Arc<Mutex<Option<(u64, usize, M)>>>,
}

impl<M> Clone for ModelInfoSlot<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M> Default for ModelInfoSlot<M> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }
}

impl<M: Clone> ModelInfoSlot<M> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes model information taken at global step `step`.
    pub fn publish(&self, step: usize, info: M) {
        let mut inner = self.inner.lock().unwrap();
        let version = inner.as_ref().map_or(1, |(v, _, _)| v + 1);
        *inner = Some((version, step, info));
    }

    /// Returns the version, the step and the information if a version newer
    /// than `version` has been published.
    pub fn newer_than(&self, version: u64) -> Option<(u64, usize, M)> {
        match self.inner.lock().unwrap().as_ref() {
            Some((v, step, info)) if *v > version => Some((*v, *step, info.clone())),
            _ => None,
        }
    }

    /// Version of the latest publication, 0 if nothing has been published.
    pub fn version(&self) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .as_ref()
            .map_or(0, |(v, _, _)| *v)
    }
}
