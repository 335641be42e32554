//! Types and traits for recording training metrics.
//!
//! * [`Record`] - a container of key-value pairs of various data types
//! * [`RecordValue`] - the values that can be stored in a [`Record`]
//! * [`Recorder`] - the interface for writing records to some destination
//! * [`BufferedRecorder`] - keeps records in memory
//! * [`NullRecorder`] - discards all records
//!
//! ```rust
//! use mirage_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("global/episode_reward", RecordValue::Scalar(21.0));
//! record.insert("global/episode_length", RecordValue::Scalar(800.0));
//! assert_eq!(record.get_scalar("global/episode_reward").unwrap(), 21.0);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
