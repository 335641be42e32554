//! Asynchronous A3C training.
//!
//! Three tasks run on their own threads:
//!
//! * [`EnvironmentDriver`] interacts with a real-time environment and puts
//!   [`TrajectorySegment`](mirage_core::TrajectorySegment)s into a bounded queue.
//! * [`TrainingCoordinator`] takes segments from the queue, computes gradients on
//!   its local model and applies them to the shared model.
//! * [`DatasetManager`](mirage_dataset::DatasetManager) collects the frame
//!   histories observed by the driver for the generative model.
//!
//! # Messages
//! * From the driver to the coordinator: trajectory segments, through
//!   [`segment_channel`] (capacity 5, 10 minute timeouts by default).
//! * From the coordinator to the driver: model information, through a
//!   [`ModelInfoSlot`].
//! * From each task to the caller: a [`TaskEvent`] when it ends, through the
//!   [`Supervisor`].
mod coordinator;
mod driver;
mod queue;
mod supervisor;
mod sync_model;
mod util;
pub use coordinator::{CoordinatorConfig, CoordinatorStat, TrainingCoordinator};
pub use driver::{DriverStat, EnvDriverConfig, EnvironmentDriver, SegmentStream};
pub use queue::{segment_channel, SegmentReceiver, SegmentSender};
pub use supervisor::{Supervisor, TaskEvent, TaskOutcome};
pub use sync_model::ModelInfoSlot;
pub use util::train_async;
