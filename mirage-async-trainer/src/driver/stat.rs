use std::time::Duration;

/// Stats of [`EnvironmentDriver::run`](crate::EnvironmentDriver::run).
#[derive(Clone, Debug)]
pub struct DriverStat {
    /// The number of environment steps.
    pub env_steps: usize,

    /// The number of collected segments.
    pub segments: usize,

    /// The number of finished episodes.
    pub episodes: usize,

    /// Duration of the sampling loop.
    pub duration: Duration,
}

impl DriverStat {
    /// Returns a formatted string.
    pub fn fmt(&self) -> String {
        let d = self.duration.as_secs_f32();
        let mut s = "env_steps, segments, episodes, duration [sec], env_steps per sec\n".to_string();
        s += format!(
            "{}, {}, {}, {}, {}\n",
            self.env_steps,
            self.segments,
            self.episodes,
            d,
            self.env_steps as f32 / d
        )
        .as_str();
        s
    }
}
