use core::time::Duration;
use std::{
    thread::sleep,
    time::Instant,
};

use thiserror::Error;
use tracing::{debug, warn};

use super::{Director, DirectorError, TaskState};

/// How a task is polled until it resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Time slept before each status query.
    pub interval: Duration,

    /// The most status queries made for one task.
    pub max_attempts: u32,

    /// The longest a single task is waited on, if any.
    pub deadline: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 3600,
            deadline: None,
        }
    }
}

/// Resolves director tasks into a terminal outcome by polling their status.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskPoller {
    settings: PollSettings,
}

impl TaskPoller {
    /// Create a poller.
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    /// The poller's settings.
    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Poll a task until it is done. Queued and processing tasks are polled again, every other
    /// state ends the wait.
    pub fn wait_until_done<D: Director + ?Sized>(
        &self,
        director: &D,
        task_id: u64,
    ) -> Result<(), TaskError> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if attempts >= self.settings.max_attempts {
                return Err(TaskError::Timeout { task_id, attempts });
            }
            if let Some(deadline) = self.settings.deadline {
                if started.elapsed() >= deadline {
                    return Err(TaskError::Timeout { task_id, attempts });
                }
            }

            sleep(self.settings.interval);
            attempts += 1;

            let task = director
                .task_status(task_id)
                .map_err(|e| TaskError::Director(e, task_id))?;

            match task.state {
                TaskState::Queued | TaskState::Processing => {
                    debug!("Task {task_id} is {}, attempt {attempts}", task.state);
                }
                TaskState::Done => {
                    debug!("Task {task_id} done after {attempts} attempts");
                    return Ok(());
                }
                TaskState::Error => {
                    warn!("Task {task_id} failed: {}", task.description);
                    return Err(TaskError::Failed(task_id));
                }
                TaskState::Unknown(state) => return Err(TaskError::UnknownResult(task_id, state)),
            }
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to get the status of task {1}: {0}")]
    Director(#[source] DirectorError, u64),

    #[error("Task {0} failed")]
    Failed(u64),

    #[error("Task {0} returned an unknown result '{1}'")]
    UnknownResult(u64, String),

    #[error("Task {task_id} did not finish after {attempts} status queries")]
    Timeout { task_id: u64, attempts: u32 },
}
