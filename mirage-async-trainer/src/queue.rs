//! Bounded hand-off queue of trajectory segments.
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use mirage_core::{MirageError, TrajectorySegment};
use std::time::Duration;

/// Creates a queue holding at most `capacity` segments.
///
/// Both ends give up after `timeout` waiting for room or for a segment.
pub fn segment_channel<F>(
    capacity: usize,
    timeout: Duration,
) -> (SegmentSender<F>, SegmentReceiver<F>) {
    let (s, r) = bounded(capacity);
    (
        SegmentSender {
            sender: s,
            timeout,
        },
        SegmentReceiver {
            receiver: r,
            timeout,
        },
    )
}

/// Producer end of the queue, owned by the environment driver.
pub struct SegmentSender<F> {
    sender: Sender<TrajectorySegment<F>>,
    timeout: Duration,
}

impl<F> SegmentSender<F> {
    /// Puts a segment, blocking while the queue is full.
    ///
    /// Fails with [`MirageError::QueueTimeout`] if no room is made within the
    /// timeout and with [`MirageError::QueueDisconnected`] if the receiver is gone.
    pub fn put(&self, segment: TrajectorySegment<F>) -> Result<()> {
        match self.sender.send_timeout(segment, self.timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                Err(MirageError::QueueTimeout(self.timeout.as_secs()).into())
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(MirageError::QueueDisconnected.into()),
        }
    }

    /// Number of segments in the queue.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Consumer end of the queue, owned by the training coordinator.
pub struct SegmentReceiver<F> {
    receiver: Receiver<TrajectorySegment<F>>,
    timeout: Duration,
}

impl<F> SegmentReceiver<F> {
    /// Sets the timeout of [`SegmentReceiver::get`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Takes a segment, blocking while the queue is empty.
    ///
    /// Fails with [`MirageError::QueueTimeout`] if nothing arrives within the
    /// timeout and with [`MirageError::QueueDisconnected`] if the queue is empty
    /// and the sender is gone.
    pub fn get(&self) -> Result<TrajectorySegment<F>> {
        match self.receiver.recv_timeout(self.timeout) {
            Ok(segment) => Ok(segment),
            Err(RecvTimeoutError::Timeout) => {
                Err(MirageError::QueueTimeout(self.timeout.as_secs()).into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(MirageError::QueueDisconnected.into()),
        }
    }

    /// Takes a segment if one is immediately available.
    pub fn get_nowait(&self) -> Option<TrajectorySegment<F>> {
        self.receiver.try_recv().ok()
    }

    /// Number of segments in the queue.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
