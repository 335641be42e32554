//! A3C training on a real-time environment whose experience stream is
//! supplemented by a frame-history conditioned WGAN.
//!
//! This crate wires the workspace together: [`MirageConfig`] describes a run,
//! [`DotEnv`] is a toy pixel environment, [`LinearActorCritic`] a model small
//! enough to train on a CPU without a deep-learning backend and [`LinearWgan`]
//! a generative model of the same kind. [`train`] runs the agent and the
//! dataset manager, [`train_wgan`] runs the WGAN trainer on the persisted
//! dataset.
pub mod config;
pub mod env;
pub mod generator;
pub mod linear;
pub mod wgan;
pub use config::MirageConfig;
pub use env::{DotEnv, DotEnvConfig};
pub use generator::CheckpointTracker;
pub use linear::{LinearActorCritic, LinearParams, SharedLinearModel};
pub use wgan::{GeneratorParams, LinearWgan};

use anyhow::Result;
use mirage_async_trainer::{train_async, TaskEvent};
use mirage_core::record::Recorder;
use log::info;
use mirage_dataset::{DatasetManager, FileSampleStore, StoreSource, WganTrainer};
use std::sync::{Arc, Mutex};

/// Trains a [`LinearActorCritic`] in [`DotEnv`] as configured.
///
/// Returns the events of the training tasks.
pub fn train<R>(config: &MirageConfig, recorder: R) -> Result<Vec<TaskEvent>>
where
    R: Recorder + Clone + Send + 'static,
{
    config.validate()?;

    let input_dim = config.env.size * config.env.size;
    let params = LinearParams::random(
        input_dim,
        config.driver.action_space,
        config.init_scale,
        config.seed,
    );
    let policy = LinearActorCritic::new(params.clone(), config.seed + 1);
    let local = LinearActorCritic::new(params.clone(), config.seed + 2);
    let shared = Arc::new(Mutex::new(SharedLinearModel::new(
        params,
        config.learning_rate,
    )));

    let store = FileSampleStore::new(&config.dataset.data_dir);
    let manager = DatasetManager::new(&config.dataset, store, CheckpointTracker::new())?;

    train_async::<DotEnv, _, _, _, _, _, _>(
        &config.driver,
        &config.coordinator,
        &config.env,
        config.seed as i64,
        policy,
        local,
        shared,
        manager,
        recorder,
        config.max_iterations,
    )
}

/// Trains a [`LinearWgan`] on the dataset persisted in `config.dataset.data_dir`.
///
/// Checkpoints are saved in the experiment directory after every epoch, where
/// the dataset manager of a concurrent [`train`] picks them up. Returns the
/// number of generator iterations.
pub fn train_wgan(config: &MirageConfig, recorder: &mut impl Recorder) -> Result<usize> {
    config.validate()?;

    let store = FileSampleStore::new(&config.dataset.data_dir);
    let wgan = LinearWgan::new(
        config.env.frame_shape(),
        config.wgan.experiment_dir.join("samples"),
        config.seed,
    );
    let mut trainer = WganTrainer::build(&config.wgan, wgan, StoreSource::new(store, config.seed));
    trainer.train(recorder)?;
    info!(
        "WGAN trained for {} epochs, {} generator iterations",
        trainer.epoch(),
        trainer.gen_iterations()
    );
    Ok(trainer.gen_iterations())
}

#[cfg(test)]
mod test {
    use super::*;
    use mirage_async_trainer::TaskOutcome;
    use mirage_core::{record::BufferedRecorder, FrameHistoryRecord, Image};
    use mirage_dataset::{SampleDataset, SampleStore};
    use tempdir::TempDir;

    #[test]
    fn test_train() -> Result<()> {
        let dir = TempDir::new("mirage")?;
        let mut config = MirageConfig::default()
            .env(DotEnvConfig::default().size(4).max_steps(10))
            .log_dir(dir.path().join("logs"))
            .max_iterations(Some(15))
            .learning_rate(1e-2);
        config.dataset = config
            .dataset
            .data_dir(dir.path().join("data"))
            .gan_worker_com_interval_secs(0.01);
        config = config.experiment_dir(dir.path().join("experiment"));
        config.driver = config.driver.num_local_steps(5).queue_timeout_secs(10);
        config.coordinator = config.coordinator.queue_timeout_secs(10);

        let recorder = Arc::new(Mutex::new(BufferedRecorder::new()));
        let events = train(&config, recorder.clone())?;

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.outcome == TaskOutcome::Completed));
        let recorder = recorder.lock().unwrap();
        assert!(recorder
            .iter()
            .any(|r| r.get("model/value_loss").is_some()));
        assert!(dir.path().join("data").join("data.bin").is_file());
        Ok(())
    }

    #[test]
    fn test_generator_refresh_after_wgan_training() -> Result<()> {
        let dir = TempDir::new("mirage")?;
        let mut config = MirageConfig::default()
            .env(DotEnvConfig::default().size(4))
            .experiment_dir(dir.path().join("experiment"));
        config.dataset = config.dataset.data_dir(dir.path().join("data"));
        config.wgan = config.wgan.batch_size(4).iters_per_epoch(120).n_epochs(2);

        let store = FileSampleStore::new(&config.dataset.data_dir);
        let mut dataset = SampleDataset::new(config.env.frame_shape());
        let records = (0..8)
            .map(|i| {
                let f = Image::from_elem((3, 4, 4), i as f32 / 8.0);
                FrameHistoryRecord::new([f.clone(), f.clone(), f.clone(), f], i % 4, 4)
            })
            .collect();
        dataset.extend(records)?;
        store.save(&dataset)?;

        // Per epoch, a warmup phase of 100 critic steps and a cut phase of 20
        let mut recorder = BufferedRecorder::new();
        assert_eq!(train_wgan(&config, &mut recorder)?, 4);
        assert_eq!(recorder.len(), 4);

        let generator = dir.path().join("experiment").join("netG_epoch_1.pth");
        let params = GeneratorParams::load(&generator)?;
        assert_eq!(params.frame_shape, [3, 4, 4]);

        let mut manager = DatasetManager::new(&config.dataset, store, CheckpointTracker::new())?;
        assert_eq!(manager.cycle().checkpoint, Some(1));
        assert_eq!(manager.generator().current(), Some(generator.as_path()));
        Ok(())
    }
}
