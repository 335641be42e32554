//! Training coordinator.
mod config;
mod stat;
use crate::{ModelInfoSlot, SegmentReceiver};
use anyhow::Result;
pub use config::CoordinatorConfig;
use log::{info, warn};
use mirage_core::{
    process_segment,
    record::{Record, RecordValue, Recorder},
    LocalModel, MirageError, SharedModel, TrajectorySegment,
};
use ndarray::{s, Array2};
pub use stat::CoordinatorStat;
use std::{
    marker::PhantomData,
    sync::{Arc, Mutex},
    time::Instant,
};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Consumes segments from the queue and updates the shared model.
///
/// One iteration of [`TrainingCoordinator::process`]:
///
/// 1. Synchronizes the local model with the shared model and publishes the
///    same model information to the environment driver.
/// 2. Takes a segment from the queue, waiting up to the queue timeout, and
///    greedily extends it with segments already in the queue until it is
///    terminal or the queue is empty.
/// 3. Computes returns and advantages with [`process_segment`].
/// 4. Computes gradients on the local model, clips them by global norm and
///    applies them to the shared model if `agent_learning` is `true`. The
///    global step advances by the batch size in any case.
/// 5. Writes a summary every `summary_interval` iterations when `task == 0`,
///    never if the interval is 0.
///
/// ```mermaid
/// graph LR
///     D[EnvironmentDriver] -->|TrajectorySegment| Q[SegmentQueue]
///     Q --> C[TrainingCoordinator]
///     C -->|Gradients| S[SharedModel]
///     S -->|ModelInfo| C
///     C -->|ModelInfo| D
/// ```
pub struct TrainingCoordinator<F, L, M>
where
    L: LocalModel<F>,
    M: SharedModel<ModelInfo = L::ModelInfo>,
{
    config: CoordinatorConfig,
    local: L,
    shared: Arc<Mutex<M>>,
    receiver: SegmentReceiver<F>,
    model_info: Option<ModelInfoSlot<M::ModelInfo>>,
    local_steps: usize,
    samples: usize,
    phantom: PhantomData<F>,
}

impl<F, L, M> TrainingCoordinator<F, L, M>
where
    F: Clone,
    L: LocalModel<F>,
    M: SharedModel<ModelInfo = L::ModelInfo>,
{
    /// Creates a coordinator.
    pub fn build(
        config: &CoordinatorConfig,
        local: L,
        shared: Arc<Mutex<M>>,
        receiver: SegmentReceiver<F>,
    ) -> Self {
        Self {
            config: config.clone(),
            local,
            shared,
            receiver,
            model_info: None,
            local_steps: 0,
            samples: 0,
            phantom: PhantomData,
        }
    }

    /// Publishes model information to `slot` after every synchronization.
    pub fn with_model_info(mut self, slot: ModelInfoSlot<M::ModelInfo>) -> Self {
        self.model_info = Some(slot);
        self
    }

    /// The local model.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Number of processed iterations.
    pub fn local_steps(&self) -> usize {
        self.local_steps
    }

    fn sync(&mut self) {
        let (step, info) = self.shared.lock().unwrap().model_info();
        self.local.sync_model(&info);
        if let Some(slot) = &self.model_info {
            slot.publish(step, info);
        }
    }

    /// Takes a segment and merges the segments already waiting in the queue
    /// until it is terminal.
    pub fn pull_segment(&self) -> Result<TrajectorySegment<F>> {
        let mut segment = self.receiver.get()?;
        while !segment.terminal {
            match self.receiver.get_nowait() {
                Some(other) => segment.extend(other)?,
                None => break,
            }
        }
        Ok(segment)
    }

    /// Runs one training iteration.
    pub fn process(&mut self, recorder: &mut impl Recorder) -> Result<()> {
        self.sync();
        let segment = self.pull_segment()?;
        if segment.is_empty() {
            warn!("Empty segment skipped");
            return Ok(());
        }
        let batch = process_segment(&segment, self.config.gamma, self.config.lambda);
        let should_compute_summary = self.config.task == 0
            && self.config.summary_interval > 0
            && self.local_steps % self.config.summary_interval == 0;

        let report = self.local.compute_gradients(&batch)?;
        let mut grads = report.grads;
        let grad_norm = grads.clip_by_global_norm(self.config.grad_clip_norm);

        let global_step = {
            let mut shared = self.shared.lock().unwrap();
            let step = shared.global_step();
            if self.config.agent_learning {
                shared.apply_gradients(&grads)?;
            }
            shared.advance_global_step(batch.len());
            step
        };

        if should_compute_summary {
            let n = batch.len() as f32;
            let (_, h, w, _) = batch.states.dim();
            let state: Array2<f32> = batch.states.slice(s![0, .., .., 0]).to_owned();
            let mut record = Record::from_slice(&[
                ("global_step", RecordValue::Scalar(global_step as _)),
                ("model/policy_loss", RecordValue::Scalar(report.policy_loss / n)),
                ("model/value_loss", RecordValue::Scalar(report.value_loss / n)),
                ("model/entropy", RecordValue::Scalar(report.entropy / n)),
                ("model/grad_global_norm", RecordValue::Scalar(grad_norm)),
                (
                    "model/var_global_norm",
                    RecordValue::Scalar(self.local.param_global_norm()),
                ),
            ]);
            record.insert(
                "model/state",
                RecordValue::Array2(state.iter().copied().collect(), [h, w]),
            );
            recorder.write(record);
            recorder.flush();
        }

        self.local_steps += 1;
        self.samples += batch.len();
        Ok(())
    }

    /// Runs iterations until `stop` is set or `max_iterations` is reached.
    ///
    /// A disconnected queue after `stop` has been set ends the loop normally.
    pub fn run(
        &mut self,
        max_iterations: Option<usize>,
        stop: Arc<Mutex<bool>>,
        recorder: &mut impl Recorder,
    ) -> Result<CoordinatorStat> {
        let start = Instant::now();
        let mut iterations = 0;

        loop {
            if *stop.lock().unwrap() || max_iterations.map_or(false, |n| iterations >= n) {
                break;
            }
            if let Err(e) = self.process(recorder) {
                let disconnected = matches!(
                    e.downcast_ref::<MirageError>(),
                    Some(MirageError::QueueDisconnected)
                );
                if disconnected && *stop.lock().unwrap() {
                    break;
                }
                return Err(e);
            }
            iterations += 1;
        }

        let stat = CoordinatorStat {
            iterations,
            samples: self.samples,
            duration: start.elapsed(),
        };
        info!("Training coordinator stopped");
        info!("{}", stat.fmt());
        Ok(stat)
    }
}
