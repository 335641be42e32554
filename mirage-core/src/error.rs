//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum MirageError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// A terminal segment was asked to absorb another segment.
    #[error("Cannot extend a terminal trajectory segment")]
    ExtendTerminalSegment,

    /// The hand-off queue did not accept or deliver a segment in time.
    #[error("Hand-off queue timed out after {0} seconds")]
    QueueTimeout(u64),

    /// The peer on the other side of the hand-off queue is gone.
    #[error("Hand-off queue disconnected")]
    QueueDisconnected,

    /// A frame history record does not match the shape of the dataset.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape of the frames held by the dataset.
        expected: [usize; 3],
        /// Shape of the rejected frame.
        actual: Vec<usize>,
    },

    /// A persisted snapshot could not be decoded.
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}
