#![warn(missing_docs)]
//! Lifecycle of the frame-history dataset the WGAN is trained on.
//!
//! * [`DatasetManager`] collects [`FrameHistoryRecord`](mirage_core::FrameHistoryRecord)s
//!   pushed by the environment driver through a [`DatasetHandle`], periodically
//!   merges them into the persisted [`SampleDataset`] and reloads the generator
//!   from its latest checkpoint.
//! * [`FileSampleStore`] persists the dataset as a bincode file.
//! * [`CheckpointDir`] finds the newest generator checkpoint.
//! * [`RequestInbox`] exchanges frame histories and rewards with external
//!   simulators through a directory.
//! * [`WganTrainer`] runs the WGAN training schedule on data from the store or
//!   the inbox.
pub mod checkpoint;
pub mod dataset;
pub mod inbox;
pub mod manager;
pub mod store;
pub mod wgan;

pub use checkpoint::{CheckpointDir, GenerativeModel};
pub use dataset::SampleDataset;
pub use inbox::{critic_reward, RequestInbox};
pub use manager::{CycleReport, DatasetHandle, DatasetManager, DatasetManagerConfig};
pub use store::{FileSampleStore, SampleStore, SnapshotLoad};
pub use wgan::{
    critic_iters, CriticStep, InboxSource, RealSource, StoreSource, Wgan, WganConfig, WganTrainer,
};
