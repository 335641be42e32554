//! Writes mirage records as TensorBoard event files.
use log::warn;
use mirage_core::record::{Record, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Key of the step in records written by the training coordinator.
pub const GLOBAL_STEP_KEY: &str = "global_step";

/// Scales values to `0..=255`, mapping the minimum to 0 and the maximum to 255.
fn to_pixels(data: &[f32]) -> Vec<u8> {
    let min = data.iter().fold(f32::MAX, |m, v| v.min(m));
    let max = data.iter().fold(f32::MIN, |m, v| v.max(m));
    let scale = if max > min { max - min } else { 1.0 };
    data.iter()
        .map(|&e| ((e - min) / scale * 255f32) as u8)
        .collect()
}

/// Writes records to TFRecord.
///
/// Every record must hold its step as a scalar under the step key, `global_step`
/// by default. Scalars are written as scalar summaries and 2-dimensional arrays
/// as gray images.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
}

impl TensorboardRecorder {
    /// Constructs a [`TensorboardRecorder`] storing TFRecord in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self::with_step_key(logdir, GLOBAL_STEP_KEY)
    }

    /// Constructs a [`TensorboardRecorder`] reading steps from `step_key`.
    pub fn with_step_key<P: AsRef<Path>>(logdir: P, step_key: impl Into<String>) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: step_key.into(),
        }
    }

    fn add_gray_image(&mut self, key: &str, data: &[f32], shape: [usize; 2], step: usize) {
        let pixels = to_pixels(data);
        let mut rgb = Vec::with_capacity(pixels.len() * 3);
        for _ in 0..3 {
            rgb.extend_from_slice(&pixels);
        }
        self.writer
            .add_image(key, rgb.as_slice(), &[3, shape[0], shape[1]], step)
    }
}

impl Recorder for TensorboardRecorder {
    fn write(&mut self, record: Record) {
        let step = match record.get_scalar(&self.step_key) {
            Ok(v) => v as usize,
            Err(e) => {
                warn!("Record without step is not written: {}", e);
                return;
            }
        };

        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::Array2(data, shape) => self.add_gray_image(k, data, *shape, step),
            }
        }
    }

    fn flush(&mut self) {
        self.writer.flush();
    }
}
