//! Environment driver.
mod config;
mod stat;
use crate::{ModelInfoSlot, SegmentSender};
use anyhow::Result;
pub use config::EnvDriverConfig;
use log::{info, warn};
use mirage_core::{
    frame::{argmax, one_hot, rgb_to_gray},
    record::{Record, RecordValue::Scalar, Recorder},
    Env, FrameHistory, FrameSink, Image, MirageError, Policy, SyncModel, TrajectorySegment,
};
pub use stat::DriverStat;
use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

/// Runs the policy on a real-time environment and cuts the experience into
/// [`TrajectorySegment`]s.
///
/// Each step feeds the luminance image of the last observation to the policy
/// (or draws a uniformly random action if `agent_acting` is `false`), advances
/// the environment and stores the transition in the current segment. A segment
/// is finished after `num_local_steps` transitions or at the end of an episode.
/// Raw images are also collected into [`FrameHistoryRecord`]s pushed to a
/// [`FrameSink`], typically the handle of the dataset manager.
///
/// At the end of an episode the environment is reset, the frame history is
/// cleared, the recurrent features are reset and the episode reward and length
/// are recorded under `global/episode_reward` and `global/episode_length`.
///
/// [`FrameHistoryRecord`]: mirage_core::FrameHistoryRecord
pub struct EnvironmentDriver<E, P, S, R>
where
    E: Env,
    P: Policy + SyncModel,
    S: FrameSink,
    R: Recorder,
{
    config: EnvDriverConfig,
    env: E,
    policy: P,
    sink: S,
    recorder: R,
    model_info: Option<ModelInfoSlot<P::ModelInfo>>,
    rng: fastrand::Rng,

    last_state: Image,
    last_features: P::Features,
    history: FrameHistory,
    adopted_version: u64,
    global_step: usize,

    episode_reward: f32,
    episode_length: usize,
    env_steps: usize,
    episodes: usize,
    segments: usize,
}

impl<E, P, S, R> EnvironmentDriver<E, P, S, R>
where
    E: Env,
    P: Policy + SyncModel,
    S: FrameSink,
    R: Recorder,
{
    /// Builds the environment with `seed` and resets it.
    pub fn build(
        config: &EnvDriverConfig,
        env_config: &E::Config,
        policy: P,
        sink: S,
        recorder: R,
        seed: i64,
    ) -> Result<Self> {
        let mut env = E::build(env_config, seed)?;
        let last_state = rgb_to_gray(&env.reset()?);
        let last_features = policy.initial_features();

        Ok(Self {
            config: config.clone(),
            env,
            policy,
            sink,
            recorder,
            model_info: None,
            rng: fastrand::Rng::with_seed(seed as u64),
            last_state,
            last_features,
            history: FrameHistory::new(),
            adopted_version: 0,
            global_step: 0,
            episode_reward: 0.0,
            episode_length: 0,
            env_steps: 0,
            episodes: 0,
            segments: 0,
        })
    }

    /// Adopts model information published in `slot` before every segment.
    pub fn with_model_info(mut self, slot: ModelInfoSlot<P::ModelInfo>) -> Self {
        self.model_info = Some(slot);
        self
    }

    /// The policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// The recorder.
    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Global step of the last adopted model information.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    fn adopt_model_info(&mut self) {
        if let Some(slot) = &self.model_info {
            if let Some((version, step, info)) = slot.newer_than(self.adopted_version) {
                self.policy.sync_model(&info);
                self.adopted_version = version;
                self.global_step = step;
            }
        }
    }

    fn end_episode(&mut self) -> Result<()> {
        info!(
            "Episode finished. Sum of rewards: {}. Length: {}",
            self.episode_reward, self.episode_length
        );
        self.recorder.write(Record::from_slice(&[
            ("global_step", Scalar(self.global_step as _)),
            ("global/episode_reward", Scalar(self.episode_reward)),
            ("global/episode_length", Scalar(self.episode_length as _)),
        ]));
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.episodes += 1;

        self.history.reset();
        self.last_features = self.policy.initial_features();
        self.last_state = rgb_to_gray(&self.env.reset()?);
        Ok(())
    }

    /// Collects the next segment.
    pub fn next_segment(&mut self) -> Result<TrajectorySegment<P::Features>> {
        self.adopt_model_info();

        let acting = self.config.agent_acting;
        let action_space = self.config.action_space;
        let mut segment = TrajectorySegment::new();
        let mut terminal_end = false;

        for _ in 0..self.config.num_local_steps {
            let (action, value, features) = if acting {
                let out = self.policy.act(&self.last_state, &self.last_features)?;
                (out.action, out.value, out.features)
            } else {
                let ix = self.rng.usize(..action_space);
                (one_hot(ix, action_space), 0.0, self.policy.initial_features())
            };

            let action_index = argmax(&action);
            let step = self.env.step(action_index)?;

            if let Some(record) = self.history.observe(&step.image, action_index, action_space) {
                if let Err(e) = self.sink.push_data(vec![record]) {
                    warn!("Frame history was not pushed: {}", e);
                }
            }
            let state = rgb_to_gray(&step.image);

            if self.config.render {
                self.env.render()?;
            }

            let last_state = std::mem::replace(&mut self.last_state, state);
            let last_features = std::mem::replace(&mut self.last_features, features);
            segment.add(
                last_state,
                action,
                step.reward,
                value,
                step.is_terminal,
                last_features,
            );
            self.episode_reward += step.reward;
            self.episode_length += 1;
            self.env_steps += 1;

            if acting && !step.info.is_empty() {
                let mut record = step.info;
                record.insert("global_step", Scalar(self.global_step as _));
                self.recorder.write(record);
            }

            if step.is_terminal {
                terminal_end = true;
                self.end_episode()?;
                break;
            }
        }

        if !terminal_end && acting {
            segment.r = self.policy.value(&self.last_state, &self.last_features)?;
        }
        self.segments += 1;
        Ok(segment)
    }

    /// Returns the unbounded sequence of segments.
    pub fn segments(&mut self) -> SegmentStream<'_, E, P, S, R> {
        SegmentStream { driver: self }
    }

    fn stat(&self, start: Instant) -> DriverStat {
        DriverStat {
            env_steps: self.env_steps,
            segments: self.segments,
            episodes: self.episodes,
            duration: start.elapsed(),
        }
    }

    /// Puts segments into the queue until `stop` is set.
    ///
    /// Fails if the queue stays full for the timeout or the coordinator is gone
    /// before `stop` is set.
    pub fn run(
        &mut self,
        sender: &SegmentSender<P::Features>,
        stop: Arc<Mutex<bool>>,
    ) -> Result<DriverStat> {
        let start = Instant::now();
        for segment in self.segments() {
            if *stop.lock().unwrap() {
                break;
            }
            if let Err(e) = sender.put(segment?) {
                let disconnected = matches!(
                    e.downcast_ref::<MirageError>(),
                    Some(MirageError::QueueDisconnected)
                );
                if disconnected && *stop.lock().unwrap() {
                    break;
                }
                return Err(e);
            }
        }
        let stat = self.stat(start);
        info!("Environment driver stopped");
        info!("{}", stat.fmt());
        Ok(stat)
    }
}

/// Unbounded sequence of segments collected by an [`EnvironmentDriver`].
pub struct SegmentStream<'a, E, P, S, R>
where
    E: Env,
    P: Policy + SyncModel,
    S: FrameSink,
    R: Recorder,
{
    driver: &'a mut EnvironmentDriver<E, P, S, R>,
}

impl<'a, E, P, S, R> Iterator for SegmentStream<'a, E, P, S, R>
where
    E: Env,
    P: Policy + SyncModel,
    S: FrameSink,
    R: Recorder,
{
    type Item = Result<TrajectorySegment<P::Features>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.driver.next_segment())
    }
}
