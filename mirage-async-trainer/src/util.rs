//! Utility function.
use crate::{
    segment_channel, CoordinatorConfig, EnvDriverConfig, EnvironmentDriver, ModelInfoSlot,
    Supervisor, TaskEvent, TrainingCoordinator,
};
use anyhow::Result;
use log::info;
use mirage_core::{record::Recorder, Env, LocalModel, Policy, SharedModel, SyncModel};
use mirage_dataset::{DatasetManager, GenerativeModel, SampleStore};
use std::sync::{Arc, Mutex};

/// Runs asynchronous training.
///
/// This function runs an [`EnvironmentDriver`], a [`TrainingCoordinator`] and a
/// [`DatasetManager`] on supervised threads. The driver hands segments to the
/// coordinator through a bounded queue and pushes frame histories to the
/// dataset manager. Training ends when the coordinator has run
/// `max_iterations` iterations, or when any task fails.
///
/// * `driver_config` - Configuration of the environment driver and the queue.
/// * `coordinator_config` - Configuration of the coordinator.
/// * `env_config` - Configuration of the environment, built on the driver thread.
/// * `env_seed` - Random seed of the environment and of random actions.
/// * `policy` - Policy acting in the environment, synchronized from the
///   parameters the coordinator publishes.
/// * `local` - Local model computing gradients.
/// * `shared` - Shared model receiving the gradients.
/// * `manager` - Dataset manager of the frame histories.
/// * `recorder` - Recorder shared by the driver and the coordinator.
///
/// Returns the events of all tasks in the order they ended.
#[allow(clippy::too_many_arguments)]
pub fn train_async<E, P, L, M, S, G, R>(
    driver_config: &EnvDriverConfig,
    coordinator_config: &CoordinatorConfig,
    env_config: &E::Config,
    env_seed: i64,
    policy: P,
    local: L,
    shared: Arc<Mutex<M>>,
    manager: DatasetManager<S, G>,
    recorder: R,
    max_iterations: Option<usize>,
) -> Result<Vec<TaskEvent>>
where
    E: Env + 'static,
    E::Config: Send + 'static,
    P: Policy + SyncModel<ModelInfo = L::ModelInfo> + Send + 'static,
    P::Features: Send + 'static,
    L: LocalModel<P::Features> + Send + 'static,
    L::ModelInfo: Send + 'static,
    M: SharedModel<ModelInfo = L::ModelInfo> + Send + 'static,
    S: SampleStore + Send + 'static,
    G: GenerativeModel + Send + 'static,
    R: Recorder + Clone + Send + 'static,
{
    // Shared flag to stop all threads
    let stop = Arc::new(Mutex::new(false));
    let mut supervisor = Supervisor::new(stop.clone());

    let (sender, receiver) =
        segment_channel(driver_config.queue_capacity, driver_config.queue_timeout());
    let receiver = receiver.with_timeout(coordinator_config.queue_timeout());
    let model_info = ModelInfoSlot::new();
    let sink = manager.handle();

    {
        let stop = stop.clone();
        supervisor.spawn("dataset-manager", move || manager.run(stop))?;
    }

    {
        let stop = stop.clone();
        let config = coordinator_config.clone();
        let model_info = model_info.clone();
        let mut recorder = recorder.clone();
        supervisor.spawn("training-coordinator", move || {
            let mut coordinator = TrainingCoordinator::build(&config, local, shared, receiver)
                .with_model_info(model_info);
            let result = coordinator.run(max_iterations, stop.clone(), &mut recorder);
            *stop.lock().unwrap() = true;
            result.map(|_| ())
        })?;
    }

    {
        let config = driver_config.clone();
        let env_config = env_config.clone();
        supervisor.spawn("environment-driver", move || {
            let result = EnvironmentDriver::<E, _, _, _>::build(
                &config,
                &env_config,
                policy,
                sink,
                recorder,
                env_seed,
            )
            .and_then(|driver| {
                driver
                    .with_model_info(model_info)
                    .run(&sender, stop.clone())
            });
            // Raised before the sender is dropped so the coordinator sees a clean disconnect
            *stop.lock().unwrap() = true;
            result.map(|_| ())
        })?;
    }

    let events = supervisor.join();
    for event in events.iter() {
        info!("Task {}: {:?}", event.name, event.outcome);
    }
    Ok(events)
}
