//! Persistent storage of [`SampleDataset`].
use crate::dataset::SampleDataset;
use anyhow::Result;
use log::debug;
use mirage_core::MirageError;
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind},
    path::{Path, PathBuf},
};

/// Name of the file holding the dataset in the data directory.
pub const DATA_FILE: &str = "data.bin";

/// Outcome of loading a persisted dataset.
#[derive(Debug)]
pub enum SnapshotLoad {
    /// A dataset was decoded.
    Loaded(SampleDataset),

    /// Nothing has been persisted yet.
    Missing,

    /// The persisted bytes could not be read or decoded.
    Corrupt(String),
}

/// Storage shared by the dataset manager and the generative model trainer.
pub trait SampleStore {
    /// Loads the persisted dataset.
    fn load(&self) -> SnapshotLoad;

    /// Persists `dataset`, replacing the previous snapshot.
    fn save(&self, dataset: &SampleDataset) -> Result<()>;
}

/// Stores a dataset as a single bincode file.
///
/// Data is written to a temporary sibling file which is then renamed, so a
/// concurrent reader sees either the previous or the new snapshot.
#[derive(Debug, Clone)]
pub struct FileSampleStore {
    path: PathBuf,
}

impl FileSampleStore {
    /// Creates a store writing `data.bin` in `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(DATA_FILE),
        }
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("bin.tmp")
    }
}

impl SampleStore for FileSampleStore {
    fn load(&self) -> SnapshotLoad {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return SnapshotLoad::Missing,
            Err(e) => return SnapshotLoad::Corrupt(e.to_string()),
        };
        match bincode::deserialize_from::<_, SampleDataset>(BufReader::new(file)) {
            Ok(dataset) => SnapshotLoad::Loaded(dataset),
            Err(e) => SnapshotLoad::Corrupt(
                MirageError::CorruptSnapshot(format!("{}: {}", self.path.display(), e)).to_string(),
            ),
        }
    }

    fn save(&self, dataset: &SampleDataset) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.tmp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut writer, dataset)?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(
            "Saved {} records to {}",
            dataset.len(),
            self.path.display()
        );
        Ok(())
    }
}
