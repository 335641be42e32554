//! Dataset manager.
mod config;
use crate::{
    checkpoint::{CheckpointDir, GenerativeModel},
    dataset::SampleDataset,
    store::{SampleStore, SnapshotLoad},
};
use anyhow::Result;
pub use config::DatasetManagerConfig;
use log::{info, warn};
use mirage_core::{FrameHistoryRecord, FrameSink};
use std::{
    sync::{Arc, Mutex},
    thread::sleep,
    time::{Duration, Instant},
};

/// Granularity of the stop flag check while sleeping between cycles.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Accepts frame-history records from any thread.
///
/// Records are appended to the active buffer of the [`DatasetManager`] it was
/// obtained from.
#[derive(Clone)]
pub struct DatasetHandle {
    buffer: Arc<Mutex<SampleDataset>>,
}

impl DatasetHandle {
    /// Appends records to the active buffer.
    ///
    /// Fails with [`MirageError::ShapeMismatch`](mirage_core::MirageError::ShapeMismatch)
    /// if any record has frames of another shape, in which case nothing is appended.
    pub fn push_data(&self, records: Vec<FrameHistoryRecord>) -> Result<()> {
        self.buffer.lock().unwrap().extend(records)
    }

    /// Number of records waiting for the next cycle.
    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    /// Returns `true` if no record is waiting for the next cycle.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameSink for DatasetHandle {
    fn push_data(&self, records: Vec<FrameHistoryRecord>) -> Result<()> {
        DatasetHandle::push_data(self, records)
    }
}

/// Outcome of [`DatasetManager::cycle`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Number of records in the loaded snapshot.
    pub loaded: usize,

    /// Number of records pushed since the previous cycle.
    pub fresh: usize,

    /// Number of persisted records, `None` if persisting failed.
    pub persisted: Option<usize>,

    /// Epoch of the checkpoint the generator was reloaded from.
    pub checkpoint: Option<usize>,
}

/// Owns the dataset of observed frame histories and keeps the persisted
/// snapshot and the generative model up to date.
///
/// The environment driver appends records through a [`DatasetHandle`] while
/// [`DatasetManager::run`] periodically merges them into the persisted dataset,
/// keeps the most recent `gan_recent_dataset` records and reloads the
/// generator from its latest checkpoint.
pub struct DatasetManager<S, G> {
    config: DatasetManagerConfig,
    store: S,
    generator: G,
    checkpoints: CheckpointDir,
    buffer: Arc<Mutex<SampleDataset>>,
    n_cycles: usize,
}

impl<S, G> DatasetManager<S, G>
where
    S: SampleStore,
    G: GenerativeModel,
{
    /// Creates a manager and persists an empty dataset.
    pub fn new(config: &DatasetManagerConfig, store: S, generator: G) -> Result<Self> {
        let empty = SampleDataset::new(config.frame_shape);
        store.save(&empty)?;
        Ok(Self {
            config: config.clone(),
            store,
            generator,
            checkpoints: CheckpointDir::new(&config.experiment_dir, config.checkpoint_ext.as_str()),
            buffer: Arc::new(Mutex::new(empty)),
            n_cycles: 0,
        })
    }

    /// Returns a handle appending records to the active buffer.
    pub fn handle(&self) -> DatasetHandle {
        DatasetHandle {
            buffer: self.buffer.clone(),
        }
    }

    /// The store the dataset is persisted to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The generative model reloaded on every cycle.
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Number of cycles done so far.
    pub fn n_cycles(&self) -> usize {
        self.n_cycles
    }

    fn load_snapshot(&self) -> SampleDataset {
        let frame_shape = self.config.frame_shape;
        match self.store.load() {
            SnapshotLoad::Loaded(dataset) if dataset.frame_shape() == frame_shape => {
                match dataset.check_records() {
                    Ok(()) => dataset,
                    Err(e) => {
                        warn!("Snapshot holds records of another shape; ignored: {}", e);
                        SampleDataset::new(frame_shape)
                    }
                }
            }
            SnapshotLoad::Loaded(dataset) => {
                warn!(
                    "Snapshot has frame shape {:?}, expected {:?}; ignored",
                    dataset.frame_shape(),
                    frame_shape
                );
                SampleDataset::new(frame_shape)
            }
            SnapshotLoad::Missing => {
                info!("No snapshot found");
                SampleDataset::new(frame_shape)
            }
            SnapshotLoad::Corrupt(msg) => {
                warn!("Failed to load snapshot: {}", msg);
                SampleDataset::new(frame_shape)
            }
        }
    }

    fn reload_generator(&mut self) -> Option<usize> {
        match self.checkpoints.latest() {
            Ok(Some((epoch, path))) => match self.generator.reload(&path) {
                Ok(()) => Some(epoch),
                Err(e) => {
                    warn!("Failed to reload generator from {}: {}", path.display(), e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(
                    "Failed to list checkpoints in {}: {}",
                    self.checkpoints.dir().display(),
                    e
                );
                None
            }
        }
    }

    /// Merges fresh records into the persisted dataset and reloads the generator.
    ///
    /// The active buffer is swapped out under the lock, so pushes made during
    /// the cycle go to the next one. Snapshot records come before fresh ones
    /// and only the most recent `gan_recent_dataset` records are persisted.
    /// If persisting fails, the fresh records that survived trimming are put
    /// back in front of the active buffer.
    pub fn cycle(&mut self) -> CycleReport {
        let fresh = self.buffer.lock().unwrap().take();
        let n_fresh = fresh.len();

        let mut merged = self.load_snapshot();
        let loaded = merged.len();
        merged.append(fresh);
        merged.trim_to_recent(self.config.gan_recent_dataset);

        let persisted = match self.store.save(&merged) {
            Ok(()) => Some(merged.len()),
            Err(e) => {
                warn!("Failed to persist dataset: {}", e);
                let n_kept = n_fresh.min(merged.len());
                let mut records = merged.into_records();
                let kept = records.split_off(records.len() - n_kept);
                self.buffer.lock().unwrap().prepend(kept);
                None
            }
        };

        let checkpoint = self.reload_generator();
        self.n_cycles += 1;

        CycleReport {
            loaded,
            fresh: n_fresh,
            persisted,
            checkpoint,
        }
    }

    /// Runs cycles separated by the configured interval until `stop` is set.
    pub fn run(mut self, stop: Arc<Mutex<bool>>) -> Result<()> {
        let interval = self.config.interval();
        loop {
            if *stop.lock().unwrap() {
                break;
            }

            let report = self.cycle();
            match report.persisted {
                Some(n) => info!(
                    "Dataset cycle {}: {} loaded, {} fresh, {} persisted",
                    self.n_cycles, report.loaded, report.fresh, n
                ),
                None => info!(
                    "Dataset cycle {}: {} loaded, {} fresh, not persisted",
                    self.n_cycles, report.loaded, report.fresh
                ),
            }
            if let Some(epoch) = report.checkpoint {
                info!("Generator reloaded from epoch {}", epoch);
            }

            let start = Instant::now();
            while start.elapsed() < interval {
                if *stop.lock().unwrap() {
                    return Ok(());
                }
                sleep(STOP_POLL.min(interval - start.elapsed().min(interval)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::FileSampleStore;
    use anyhow::anyhow;
    use mirage_core::{Image, MirageError};
    use serde::Serialize;
    use std::{cell::RefCell, fs, path::Path, path::PathBuf, thread};
    use tempdir::TempDir;
    use test_log::test;

    #[derive(Default)]
    struct RecordingGenerator {
        reloaded: Vec<PathBuf>,
    }

    impl GenerativeModel for RecordingGenerator {
        fn reload(&mut self, path: &Path) -> Result<()> {
            self.reloaded.push(path.to_path_buf());
            Ok(())
        }
    }

    /// A store whose saves fail after the first one.
    struct FlakyStore {
        saved: RefCell<Vec<SampleDataset>>,
        fail: RefCell<bool>,
    }

    impl SampleStore for FlakyStore {
        fn load(&self) -> SnapshotLoad {
            match self.saved.borrow().last() {
                Some(ds) => SnapshotLoad::Loaded(ds.clone()),
                None => SnapshotLoad::Missing,
            }
        }

        fn save(&self, dataset: &SampleDataset) -> Result<()> {
            if *self.fail.borrow() {
                return Err(anyhow!("disk full"));
            }
            self.saved.borrow_mut().push(dataset.clone());
            Ok(())
        }
    }

    fn record(v: f32) -> FrameHistoryRecord {
        let f = Image::from_elem((1, 2, 2), v);
        FrameHistoryRecord::new([f.clone(), f.clone(), f.clone(), f], 0, 4)
    }

    fn first_values(dataset: &SampleDataset) -> Vec<f32> {
        dataset
            .records()
            .iter()
            .map(|r| r.frames[3][[0, 0, 0]])
            .collect()
    }

    fn config(dir: &Path, max: usize) -> DatasetManagerConfig {
        DatasetManagerConfig::default()
            .data_dir(dir.join("data"))
            .experiment_dir(dir.join("exp"))
            .frame_shape([1, 2, 2])
            .gan_recent_dataset(max)
            .gan_worker_com_interval_secs(0.01)
    }

    fn persisted(store: &FileSampleStore) -> SampleDataset {
        match store.load() {
            SnapshotLoad::Loaded(ds) => ds,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_new_bootstraps_empty_snapshot() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let manager =
            DatasetManager::new(&config(dir.path(), 2), store, RecordingGenerator::default())?;
        let ds = persisted(manager.store());
        assert!(ds.is_empty());
        assert_eq!(ds.frame_shape(), [1, 2, 2]);
        Ok(())
    }

    #[test]
    fn test_cycle_persists_most_recent_records() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut manager =
            DatasetManager::new(&config(dir.path(), 2), store, RecordingGenerator::default())?;
        let handle = manager.handle();
        handle.push_data(vec![record(0.0), record(1.0), record(2.0)])?;

        let report = manager.cycle();
        assert_eq!(report.fresh, 3);
        assert_eq!(report.persisted, Some(2));
        assert!(handle.is_empty());
        assert_eq!(first_values(&persisted(manager.store())), vec![1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_snapshot_records_come_first() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut manager =
            DatasetManager::new(&config(dir.path(), 10), store, RecordingGenerator::default())?;
        let handle = manager.handle();

        handle.push_data(vec![record(0.0), record(1.0)])?;
        manager.cycle();
        handle.push_data(vec![record(2.0)])?;
        let report = manager.cycle();

        assert_eq!(report.loaded, 2);
        assert_eq!(
            first_values(&persisted(manager.store())),
            vec![0.0, 1.0, 2.0]
        );
        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot_is_replaced() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut manager =
            DatasetManager::new(&config(dir.path(), 10), store, RecordingGenerator::default())?;
        fs::write(manager.store().path(), b"garbage")?;
        manager.handle().push_data(vec![record(5.0)])?;

        let report = manager.cycle();
        assert_eq!(report.loaded, 0);
        assert_eq!(first_values(&persisted(manager.store())), vec![5.0]);
        Ok(())
    }

    #[test]
    fn test_snapshot_with_foreign_records_is_replaced() -> Result<()> {
        // Same layout as `SampleDataset`, without the shape checks.
        #[derive(Serialize)]
        struct Forged {
            frame_shape: [usize; 3],
            records: Vec<FrameHistoryRecord>,
        }

        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut manager =
            DatasetManager::new(&config(dir.path(), 10), store, RecordingGenerator::default())?;
        let f = Image::zeros((3, 5, 5));
        let forged = Forged {
            frame_shape: [1, 2, 2],
            records: vec![FrameHistoryRecord::new([f.clone(), f.clone(), f.clone(), f], 0, 4)],
        };
        fs::write(manager.store().path(), bincode::serialize(&forged)?)?;
        manager.handle().push_data(vec![record(6.0)])?;

        let report = manager.cycle();
        assert_eq!(report.loaded, 0);
        assert_eq!(report.persisted, Some(1));
        let ds = persisted(manager.store());
        assert_eq!(first_values(&ds), vec![6.0]);
        assert!(ds.check_records().is_ok());
        Ok(())
    }

    #[test]
    fn test_concurrent_pushes_are_persisted_once() -> Result<()> {
        const N_THREADS: usize = 4;
        const N_PUSHES: usize = 250;

        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut manager = DatasetManager::new(
            &config(dir.path(), N_THREADS * N_PUSHES * 2),
            store,
            RecordingGenerator::default(),
        )?;

        let threads = (0..N_THREADS)
            .map(|t| {
                let handle = manager.handle();
                thread::spawn(move || -> Result<()> {
                    for i in 0..N_PUSHES {
                        handle.push_data(vec![record((t * N_PUSHES + i) as f32)])?;
                    }
                    Ok(())
                })
            })
            .collect::<Vec<_>>();

        let mut n_cycles = 0;
        while !threads.iter().all(|th| th.is_finished()) {
            manager.cycle();
            n_cycles += 1;
        }
        for th in threads {
            th.join().unwrap()?;
        }
        manager.cycle();
        assert!(n_cycles > 0);

        let values = first_values(&persisted(manager.store()));
        assert_eq!(values.len(), N_THREADS * N_PUSHES);
        for t in 0..N_THREADS {
            let lo = (t * N_PUSHES) as f32;
            let hi = ((t + 1) * N_PUSHES) as f32;
            let ours: Vec<f32> = values.iter().copied().filter(|v| lo <= *v && *v < hi).collect();
            let expected: Vec<f32> = (t * N_PUSHES..(t + 1) * N_PUSHES).map(|v| v as f32).collect();
            assert_eq!(ours, expected);
        }
        Ok(())
    }

    #[test]
    fn test_push_rejects_other_shapes() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let manager =
            DatasetManager::new(&config(dir.path(), 10), store, RecordingGenerator::default())?;
        let f = Image::zeros((3, 2, 2));
        let bad = FrameHistoryRecord::new([f.clone(), f.clone(), f.clone(), f], 0, 4);
        let err = manager.handle().push_data(vec![bad]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MirageError>(),
            Some(MirageError::ShapeMismatch { .. })
        ));
        assert!(manager.handle().is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_persist_restores_fresh_records() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FlakyStore {
            saved: RefCell::new(vec![]),
            fail: RefCell::new(false),
        };
        let mut manager =
            DatasetManager::new(&config(dir.path(), 10), store, RecordingGenerator::default())?;
        let handle = manager.handle();
        handle.push_data(vec![record(0.0)])?;
        manager.cycle();

        *manager.store().fail.borrow_mut() = true;
        handle.push_data(vec![record(1.0), record(2.0)])?;
        let report = manager.cycle();
        assert_eq!(report.persisted, None);
        handle.push_data(vec![record(3.0)])?;
        assert_eq!(handle.len(), 3);

        *manager.store().fail.borrow_mut() = false;
        manager.cycle();
        let saved = manager.store().saved.borrow();
        assert_eq!(
            first_values(saved.last().unwrap()),
            vec![0.0, 1.0, 2.0, 3.0]
        );
        Ok(())
    }

    #[test]
    fn test_cycle_reloads_latest_checkpoint() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut manager =
            DatasetManager::new(&config(dir.path(), 10), store, RecordingGenerator::default())?;
        assert_eq!(manager.cycle().checkpoint, None);

        let exp = dir.path().join("exp");
        fs::create_dir_all(&exp)?;
        fs::write(exp.join("netG_epoch_0.pth"), b"")?;
        fs::write(exp.join("netG_epoch_1.pth"), b"")?;
        assert_eq!(manager.cycle().checkpoint, Some(1));
        assert_eq!(
            manager.generator().reloaded,
            vec![exp.join("netG_epoch_1.pth")]
        );
        Ok(())
    }

    #[test]
    fn test_run_stops_on_flag() -> Result<()> {
        let dir = TempDir::new("dataset_manager")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let manager =
            DatasetManager::new(&config(dir.path(), 10), store.clone(), RecordingGenerator::default())?;
        let handle = manager.handle();
        let stop = Arc::new(Mutex::new(false));
        let stop_ = stop.clone();
        let th = thread::spawn(move || manager.run(stop_));

        handle.push_data(vec![record(7.0)])?;
        let start = Instant::now();
        while persisted(&store).is_empty() && start.elapsed() < Duration::from_secs(10) {
            thread::sleep(Duration::from_millis(10));
        }
        *stop.lock().unwrap() = true;
        th.join().unwrap()?;
        assert_eq!(first_values(&persisted(&store)), vec![7.0]);
        Ok(())
    }
}
