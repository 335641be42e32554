use std::time::Duration;

/// Stats of [`TrainingCoordinator::run`](crate::TrainingCoordinator::run).
#[derive(Clone, Debug)]
pub struct CoordinatorStat {
    /// The number of training iterations.
    pub iterations: usize,

    /// The number of transitions consumed by the coordinator.
    pub samples: usize,

    /// Duration of training.
    pub duration: Duration,
}

impl CoordinatorStat {
    /// Returns a formatted string.
    pub fn fmt(&self) -> String {
        let d = self.duration.as_secs_f32();
        let mut s = "iterations, samples, samples/sec, iterations/sec, duration\n".to_string();
        s += format!(
            "{}, {}, {}, {}, {}\n",
            self.iterations,
            self.samples,
            self.samples as f32 / d,
            self.iterations as f32 / d,
            d
        )
        .as_str();
        s
    }
}
