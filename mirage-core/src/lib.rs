#![warn(missing_docs)]
//! Core of mirage, an A3C trainer whose experience stream is supplemented by a
//! frame-history conditioned WGAN.
//!
//! This crate holds the data model shared by the environment driver, the
//! training coordinator and the dataset manager:
//!
//! * [`TrajectorySegment`] - transitions collected by the environment driver.
//! * [`Batch`] - returns and advantages computed by [`process_segment`].
//! * [`FrameHistoryRecord`] - four consecutive frames fed to the generative model.
//! * [`Env`], [`Policy`], [`LocalModel`], [`SharedModel`] and [`SyncModel`] -
//!   interfaces of the external collaborators.
pub mod advantage;
pub mod dummy;
pub mod error;
pub mod frame;
pub mod grad;
pub mod loss;
pub mod record;
pub mod segment;

mod base;
pub use advantage::{discount, process_segment, Batch};
pub use base::{
    Env, EnvStep, GradientReport, LocalModel, Policy, PolicyOutput, SharedModel, SyncModel,
};
pub use error::MirageError;
pub use frame::{FrameHistory, FrameHistoryRecord, FrameSink, Image};
pub use grad::Gradients;
pub use segment::TrajectorySegment;
