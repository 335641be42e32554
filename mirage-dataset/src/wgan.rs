//! Training schedule of the frame-history WGAN.
//!
//! The networks live outside of this crate behind the [`Wgan`] trait. This
//! module drives them: critic phases with parameter clamping, one generator
//! step per phase, loss records, periodic samples and a checkpoint pair per
//! epoch, which [`DatasetManager`](crate::DatasetManager) picks up.
mod config;
use crate::{
    checkpoint::CheckpointDir,
    inbox::RequestInbox,
    store::{SampleStore, SnapshotLoad},
};
use anyhow::Result;
pub use config::WganConfig;
use log::{debug, info, warn};
use mirage_core::{
    record::{Record, RecordValue, Recorder},
    FrameHistoryRecord,
};
use std::{fs, path::Path};

/// Critic iterations during the first generator iterations.
const WARMUP_GEN_ITERATIONS: usize = 25;

/// Critic iterations during warmup and at every 500th generator iteration.
const WARMUP_CRITIC_ITERS: usize = 100;

/// Interval of the long critic phases after the warmup.
const LONG_CRITIC_INTERVAL: usize = 500;

/// Number of critic iterations before generator iteration `gen_iterations`.
pub fn critic_iters(gen_iterations: usize, n_critic: usize) -> usize {
    if gen_iterations < WARMUP_GEN_ITERATIONS || gen_iterations % LONG_CRITIC_INTERVAL == 0 {
        WARMUP_CRITIC_ITERS
    } else {
        n_critic
    }
}

/// Outcome of a critic step.
#[derive(Debug, Clone)]
pub struct CriticStep {
    /// Mean critic output on the real batch.
    pub loss_real: f32,

    /// Mean critic output on a generated batch.
    pub loss_fake: f32,

    /// Critic output of every record in the real batch.
    pub real_scores: Vec<f32>,
}

/// Generator and critic networks.
pub trait Wgan {
    /// Clamps every critic parameter to `[lower, upper]`.
    fn clamp_critic(&mut self, lower: f32, upper: f32);

    /// Updates the critic on a real batch and a generated batch of the same size.
    fn critic_step(&mut self, real: &[FrameHistoryRecord]) -> Result<CriticStep>;

    /// Updates the generator and returns its loss.
    fn generator_step(&mut self, batch_size: usize) -> Result<f32>;

    /// Writes generated samples for inspection.
    fn write_samples(&mut self, gen_iterations: usize) -> Result<()>;

    /// Saves the generator and critic parameters.
    fn save_checkpoint(&self, generator: &Path, critic: &Path) -> Result<()>;
}

/// Source of real frame histories.
pub trait RealSource {
    /// Called at the beginning of every epoch.
    fn start_epoch(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns a batch of real records, or an empty vector if not enough
    /// records are available.
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<FrameHistoryRecord>>;

    /// Receives the critic output of the last batch.
    fn feedback(&mut self, _scores: &[f32]) -> Result<()> {
        Ok(())
    }
}

/// Samples random batches from the persisted dataset.
///
/// The snapshot is reloaded at the beginning of every epoch.
pub struct StoreSource<S> {
    store: S,
    records: Vec<FrameHistoryRecord>,
    rng: fastrand::Rng,
}

impl<S: SampleStore> StoreSource<S> {
    /// Samples from `store` with a given random seed.
    pub fn new(store: S, seed: u64) -> Self {
        Self {
            store,
            records: vec![],
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Number of records batches are sampled from.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if there is no record to sample from.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<S: SampleStore> RealSource for StoreSource<S> {
    fn start_epoch(&mut self) -> Result<()> {
        match self.store.load() {
            SnapshotLoad::Loaded(dataset) => self.records = dataset.into_records(),
            SnapshotLoad::Missing => debug!("No dataset persisted yet"),
            SnapshotLoad::Corrupt(msg) => warn!("Failed to load dataset: {}", msg),
        }
        Ok(())
    }

    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<FrameHistoryRecord>> {
        if self.records.is_empty() {
            return Ok(vec![]);
        }
        let n = self.records.len();
        Ok((0..batch_size)
            .map(|_| self.records[self.rng.usize(..n)].clone())
            .collect())
    }
}

/// Takes real batches from the request inbox and answers each request with
/// the reward derived from its critic output.
pub struct InboxSource {
    inbox: RequestInbox,
    pending: Vec<(String, FrameHistoryRecord)>,
    last_ids: Vec<String>,
}

impl InboxSource {
    /// Takes requests from `inbox`.
    pub fn new(inbox: RequestInbox) -> Self {
        Self {
            inbox,
            pending: vec![],
            last_ids: vec![],
        }
    }

    /// Number of consumed requests not yet used in a batch.
    pub fn n_pending(&self) -> usize {
        self.pending.len()
    }
}

impl RealSource for InboxSource {
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<FrameHistoryRecord>> {
        self.pending.extend(self.inbox.scan()?);
        if self.pending.len() < batch_size {
            self.last_ids.clear();
            return Ok(vec![]);
        }
        let (ids, records): (Vec<String>, Vec<FrameHistoryRecord>) =
            self.pending.drain(..batch_size).unzip();
        self.last_ids = ids;
        Ok(records)
    }

    fn feedback(&mut self, scores: &[f32]) -> Result<()> {
        for (id, score) in self.last_ids.iter().zip(scores.iter()) {
            self.inbox.write_reward(id, *score)?;
        }
        self.last_ids.clear();
        Ok(())
    }
}

/// Drives the training of a [`Wgan`] on batches from a [`RealSource`].
pub struct WganTrainer<W, R> {
    config: WganConfig,
    wgan: W,
    source: R,
    checkpoints: CheckpointDir,
    gen_iterations: usize,
    epoch: usize,
}

impl<W: Wgan, R: RealSource> WganTrainer<W, R> {
    /// Constructs a trainer.
    pub fn build(config: &WganConfig, wgan: W, source: R) -> Self {
        Self {
            config: config.clone(),
            wgan,
            source,
            checkpoints: CheckpointDir::new(&config.experiment_dir, config.checkpoint_ext.as_str()),
            gen_iterations: 0,
            epoch: 0,
        }
    }

    /// Number of generator iterations so far.
    pub fn gen_iterations(&self) -> usize {
        self.gen_iterations
    }

    /// Number of finished epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// The networks.
    pub fn wgan(&self) -> &W {
        &self.wgan
    }

    /// Runs one epoch and saves a checkpoint pair.
    ///
    /// A critic phase without any real batch does not update the generator.
    pub fn train_epoch(&mut self, recorder: &mut impl Recorder) -> Result<()> {
        let batch_size = self.config.batch_size;
        self.source.start_epoch()?;

        let mut i = 0;
        while i < self.config.iters_per_epoch {
            let diters = critic_iters(self.gen_iterations, self.config.n_critic);
            let mut j = 0;
            let mut last = None;
            while j < diters && i < self.config.iters_per_epoch {
                j += 1;
                i += 1;
                self.wgan
                    .clamp_critic(self.config.clamp_lower, self.config.clamp_upper);
                let real = self.source.next_batch(batch_size)?;
                if real.is_empty() {
                    continue;
                }
                let step = self.wgan.critic_step(&real)?;
                self.source.feedback(&step.real_scores)?;
                last = Some(step);
            }

            let critic = match last {
                Some(step) => step,
                None => {
                    debug!("No real batch in critic phase");
                    continue;
                }
            };
            let loss_g = self.wgan.generator_step(batch_size)?;
            self.gen_iterations += 1;

            let loss_d = critic.loss_real - critic.loss_fake;
            info!(
                "[{}/{}][{}/{}][{}] Loss_D: {} Loss_G: {} Loss_D_real: {} Loss_D_fake {}",
                self.epoch,
                self.config.n_epochs,
                i,
                self.config.iters_per_epoch,
                self.gen_iterations,
                loss_d,
                loss_g,
                critic.loss_real,
                critic.loss_fake
            );
            recorder.write(Record::from_slice(&[
                ("gen_iterations", RecordValue::Scalar(self.gen_iterations as f32)),
                ("loss_d", RecordValue::Scalar(loss_d)),
                ("loss_g", RecordValue::Scalar(loss_g)),
                ("loss_d_real", RecordValue::Scalar(critic.loss_real)),
                ("loss_d_fake", RecordValue::Scalar(critic.loss_fake)),
            ]));

            if self.config.sample_interval > 0
                && self.gen_iterations % self.config.sample_interval == 0
            {
                self.wgan.write_samples(self.gen_iterations)?;
            }
        }

        fs::create_dir_all(self.checkpoints.dir())?;
        let (generator, critic) = self.checkpoints.paths(self.epoch);
        self.wgan.save_checkpoint(&generator, &critic)?;
        recorder.flush();
        self.epoch += 1;
        Ok(())
    }

    /// Runs all epochs.
    pub fn train(&mut self, recorder: &mut impl Recorder) -> Result<()> {
        while self.epoch < self.config.n_epochs {
            self.train_epoch(recorder)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{dataset::SampleDataset, store::FileSampleStore};
    use mirage_core::{record::BufferedRecorder, Image};
    use std::path::PathBuf;
    use tempdir::TempDir;

    #[derive(Default)]
    struct CountingWgan {
        clamps: usize,
        critic_steps: usize,
        generator_steps: usize,
        samples: Vec<usize>,
        saved: Vec<PathBuf>,
    }

    impl Wgan for CountingWgan {
        fn clamp_critic(&mut self, lower: f32, upper: f32) {
            assert!(lower < upper);
            self.clamps += 1;
        }

        fn critic_step(&mut self, real: &[FrameHistoryRecord]) -> Result<CriticStep> {
            self.critic_steps += 1;
            Ok(CriticStep {
                loss_real: 1.0,
                loss_fake: 0.25,
                real_scores: real.iter().map(|r| r.frames[3][[0, 0, 0]]).collect(),
            })
        }

        fn generator_step(&mut self, _batch_size: usize) -> Result<f32> {
            self.generator_steps += 1;
            Ok(0.5)
        }

        fn write_samples(&mut self, gen_iterations: usize) -> Result<()> {
            self.samples.push(gen_iterations);
            Ok(())
        }

        fn save_checkpoint(&self, generator: &Path, critic: &Path) -> Result<()> {
            fs::write(generator, b"")?;
            fs::write(critic, b"")?;
            Ok(())
        }
    }

    fn record(v: f32) -> FrameHistoryRecord {
        let f = Image::from_elem((1, 2, 2), v);
        FrameHistoryRecord::new([f.clone(), f.clone(), f.clone(), f], 0, 4)
    }

    #[test]
    fn test_critic_iters() {
        assert_eq!(critic_iters(0, 5), 100);
        assert_eq!(critic_iters(24, 5), 100);
        assert_eq!(critic_iters(25, 5), 5);
        assert_eq!(critic_iters(499, 5), 5);
        assert_eq!(critic_iters(500, 5), 100);
        assert_eq!(critic_iters(1000, 3), 100);
        assert_eq!(critic_iters(1001, 3), 3);
    }

    #[test]
    fn test_train_epoch_from_store() -> Result<()> {
        let dir = TempDir::new("wgan_trainer")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut dataset = SampleDataset::new([1, 2, 2]);
        dataset.extend(vec![record(0.0), record(1.0)])?;
        store.save(&dataset)?;

        // 25 warmup phases of 100 critic steps, then phases of 5.
        let config = WganConfig::default()
            .batch_size(4)
            .iters_per_epoch(2510)
            .sample_interval(26)
            .n_epochs(1)
            .experiment_dir(dir.path().join("exp"));
        let mut trainer =
            WganTrainer::build(&config, CountingWgan::default(), StoreSource::new(store, 42));
        let mut recorder = BufferedRecorder::new();
        trainer.train(&mut recorder)?;

        assert_eq!(trainer.gen_iterations(), 27);
        assert_eq!(trainer.wgan().critic_steps, 2510);
        assert_eq!(trainer.wgan().clamps, 2510);
        assert_eq!(trainer.wgan().generator_steps, 27);
        assert_eq!(trainer.wgan().samples, vec![26]);
        assert_eq!(recorder.len(), 27);
        let last = recorder.iter().last().unwrap();
        assert_eq!(last.get_scalar("loss_d")?, 0.75);
        assert_eq!(last.get_scalar("gen_iterations")?, 27.0);
        assert!(dir.path().join("exp").join("netG_epoch_0.pth").exists());
        assert!(dir.path().join("exp").join("netD_epoch_0.pth").exists());
        Ok(())
    }

    #[test]
    fn test_empty_source_skips_generator() -> Result<()> {
        let dir = TempDir::new("wgan_trainer")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let config = WganConfig::default()
            .iters_per_epoch(10)
            .n_epochs(2)
            .experiment_dir(dir.path().join("exp"));
        let mut trainer =
            WganTrainer::build(&config, CountingWgan::default(), StoreSource::new(store, 0));
        trainer.train(&mut BufferedRecorder::new())?;

        assert_eq!(trainer.epoch(), 2);
        assert_eq!(trainer.gen_iterations(), 0);
        assert_eq!(trainer.wgan().critic_steps, 0);
        assert_eq!(trainer.wgan().clamps, 20);
        Ok(())
    }

    #[test]
    fn test_zero_sample_interval_writes_no_samples() -> Result<()> {
        let dir = TempDir::new("wgan_trainer")?;
        let store = FileSampleStore::new(dir.path().join("data"));
        let mut dataset = SampleDataset::new([1, 2, 2]);
        dataset.extend(vec![record(0.5)])?;
        store.save(&dataset)?;

        let config = WganConfig::default()
            .batch_size(2)
            .iters_per_epoch(300)
            .sample_interval(0)
            .n_epochs(1)
            .experiment_dir(dir.path().join("exp"));
        let mut trainer =
            WganTrainer::build(&config, CountingWgan::default(), StoreSource::new(store, 1));
        trainer.train(&mut BufferedRecorder::new())?;

        assert_eq!(trainer.gen_iterations(), 3);
        assert!(trainer.wgan().samples.is_empty());
        Ok(())
    }

    #[test]
    fn test_inbox_source_answers_requests() -> Result<()> {
        let dir = TempDir::new("wgan_trainer")?;
        let requests = dir.path().join("requests");
        let rewards = dir.path().join("rewards");
        fs::create_dir_all(&requests)?;
        for (i, v) in [0.0f32, 0.5, 1.0].iter().enumerate() {
            fs::write(
                requests.join(format!("r{}__requiring.bin", i)),
                bincode::serialize(&record(*v))?,
            )?;
        }

        let mut source = InboxSource::new(RequestInbox::new(&requests, &rewards));
        assert!(source.next_batch(4)?.is_empty());
        assert_eq!(source.n_pending(), 3);

        let batch = source.next_batch(2)?;
        assert_eq!(batch.len(), 2);
        source.feedback(&[0.0, 0.5])?;
        assert_eq!(source.n_pending(), 1);

        let r0 = RequestInbox::read_reward(rewards.join("r0__waiting.bin"))?;
        let r1 = RequestInbox::read_reward(rewards.join("r1__waiting.bin"))?;
        assert!((r0 - 0.1).abs() < 1e-6);
        assert!((r1 - 0.05).abs() < 1e-6);
        assert!(!rewards.join("r2__waiting.bin").exists());
        Ok(())
    }
}
