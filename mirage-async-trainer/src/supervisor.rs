//! Supervised worker threads.
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

/// How a supervised task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The task returned `Ok`.
    Completed,

    /// The task returned an error.
    Failed(String),

    /// The task panicked.
    Panicked(String),
}

/// Sent when a supervised task ends.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    /// Name of the task.
    pub name: String,

    /// How the task ended.
    pub outcome: TaskOutcome,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Spawns named threads and reports how each of them ends.
///
/// When a task fails or panics, the shared stop flag is set so that the other
/// tasks wind down.
pub struct Supervisor {
    stop: Arc<Mutex<bool>>,
    event_sender: Sender<TaskEvent>,
    event_receiver: Receiver<TaskEvent>,
    handles: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Creates a supervisor setting `stop` on failures.
    pub fn new(stop: Arc<Mutex<bool>>) -> Self {
        let (event_sender, event_receiver) = unbounded();
        Self {
            stop,
            event_sender,
            event_receiver,
            handles: vec![],
        }
    }

    /// Receiver of [`TaskEvent`]s.
    pub fn events(&self) -> &Receiver<TaskEvent> {
        &self.event_receiver
    }

    /// Runs `f` on a new thread named `name`.
    pub fn spawn<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let name_ = name.to_string();
        let stop = self.stop.clone();
        let sender = self.event_sender.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let outcome = match catch_unwind(AssertUnwindSafe(f)) {
                    Ok(Ok(())) => TaskOutcome::Completed,
                    Ok(Err(e)) => TaskOutcome::Failed(format!("{:#}", e)),
                    Err(payload) => TaskOutcome::Panicked(panic_message(&*payload)),
                };
                match &outcome {
                    TaskOutcome::Completed => info!("Task {} completed", name_),
                    TaskOutcome::Failed(msg) | TaskOutcome::Panicked(msg) => {
                        error!("Task {} ended abnormally: {}", name_, msg);
                        *stop.lock().unwrap_or_else(|e| e.into_inner()) = true;
                    }
                }
                let _ = sender.send(TaskEvent {
                    name: name_,
                    outcome,
                });
            })?;
        self.handles.push(handle);
        info!("Started task {}", name);
        Ok(())
    }

    /// Waits for all tasks and returns their events in the order they ended.
    pub fn join(self) -> Vec<TaskEvent> {
        for handle in self.handles {
            let _ = handle.join();
        }
        self.event_receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::anyhow;
    use std::time::Duration;

    #[test]
    fn test_events_of_all_outcomes() -> Result<()> {
        let stop = Arc::new(Mutex::new(false));
        let mut supervisor = Supervisor::new(stop.clone());
        supervisor.spawn("ok", || Ok(()))?;
        let event = supervisor.events().recv_timeout(Duration::from_secs(10))?;
        assert_eq!(event.name, "ok");
        assert_eq!(event.outcome, TaskOutcome::Completed);
        assert!(!*stop.lock().unwrap());

        supervisor.spawn("err", || Err(anyhow!("queue timed out")))?;
        supervisor.spawn("panic", || panic!("boom"))?;
        let mut events = supervisor.join();
        events.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(
            events,
            vec![
                TaskEvent {
                    name: "err".to_string(),
                    outcome: TaskOutcome::Failed("queue timed out".to_string()),
                },
                TaskEvent {
                    name: "panic".to_string(),
                    outcome: TaskOutcome::Panicked("boom".to_string()),
                },
            ]
        );
        assert!(*stop.lock().unwrap());
        Ok(())
    }

    #[test]
    fn test_failure_stops_other_tasks() -> Result<()> {
        let stop = Arc::new(Mutex::new(false));
        let mut supervisor = Supervisor::new(stop.clone());
        let stop_ = stop.clone();
        supervisor.spawn("worker", move || {
            while !*stop_.lock().unwrap() {
                thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        })?;
        supervisor.spawn("failing", || Err(anyhow!("fatal")))?;

        let events = supervisor.join();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| e.name == "worker" && e.outcome == TaskOutcome::Completed));
        Ok(())
    }
}
