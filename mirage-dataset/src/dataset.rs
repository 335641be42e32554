//! In-memory collection of frame-history records.
use anyhow::Result;
use mirage_core::{FrameHistoryRecord, MirageError};
use serde::{Deserialize, Serialize};

/// Frame-history records of a fixed frame shape, oldest first.
///
/// The dataset is append-only between persistence cycles, where it is trimmed
/// to the most recent records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDataset {
    frame_shape: [usize; 3],
    records: Vec<FrameHistoryRecord>,
}

impl SampleDataset {
    /// Creates an empty dataset for frames of shape `(C, H, W)`.
    pub fn new(frame_shape: [usize; 3]) -> Self {
        Self {
            frame_shape,
            records: vec![],
        }
    }

    /// Shape of the frames.
    pub fn frame_shape(&self) -> [usize; 3] {
        self.frame_shape
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the dataset has no record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records, oldest first.
    pub fn records(&self) -> &[FrameHistoryRecord] {
        &self.records
    }

    /// Consumes the dataset and returns its records.
    pub fn into_records(self) -> Vec<FrameHistoryRecord> {
        self.records
    }

    /// Checks that every frame of `record` has the shape of the dataset.
    pub fn check_shape(&self, record: &FrameHistoryRecord) -> Result<()> {
        let expected = &self.frame_shape[..];
        let bad = record
            .frames
            .iter()
            .chain(std::iter::once(&record.aux))
            .find(|f| f.shape() != expected);
        match bad {
            None => Ok(()),
            Some(f) => Err(MirageError::ShapeMismatch {
                expected: self.frame_shape,
                actual: f.shape().to_vec(),
            }
            .into()),
        }
    }

    /// Checks the shapes of all records, e.g. of a dataset read from disk.
    pub fn check_records(&self) -> Result<()> {
        self.records.iter().try_for_each(|r| self.check_shape(r))
    }

    /// Appends records after checking all of their shapes.
    ///
    /// Nothing is appended if any record is rejected.
    pub fn extend(&mut self, records: Vec<FrameHistoryRecord>) -> Result<()> {
        for record in records.iter() {
            self.check_shape(record)?;
        }
        self.records.extend(records);
        Ok(())
    }

    /// Appends the records of `newer`, a dataset of the same frame shape.
    pub fn append(&mut self, newer: SampleDataset) {
        debug_assert_eq!(self.frame_shape, newer.frame_shape);
        self.records.extend(newer.records);
    }

    /// Inserts records in front of the existing ones, as older data.
    pub fn prepend(&mut self, mut records: Vec<FrameHistoryRecord>) {
        records.append(&mut self.records);
        self.records = records;
    }

    /// Keeps only the `n` most recent records.
    pub fn trim_to_recent(&mut self, n: usize) {
        if self.records.len() > n {
            self.records.drain(..self.records.len() - n);
        }
    }

    /// Takes the records out, leaving an empty dataset of the same shape.
    pub fn take(&mut self) -> SampleDataset {
        let empty = SampleDataset::new(self.frame_shape);
        std::mem::replace(self, empty)
    }
}
