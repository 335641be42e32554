use super::{Record, Recorder};

/// Buffered recorder.
///
/// Keeps every record in memory. Mostly used in tests for inspecting the
/// summaries emitted by the driver and the coordinator.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    n_flush: usize,
}

impl BufferedRecorder {
    /// Construct the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Returns the number of records written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no record has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns how many times [`Recorder::flush`] was called.
    pub fn n_flush(&self) -> usize {
        self.n_flush
    }
}

impl Recorder for BufferedRecorder {
    /// Write a [`Record`] to the buffer.
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }

    fn flush(&mut self) {
        self.n_flush += 1;
    }
}
