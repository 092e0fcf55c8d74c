//! Starts and stops the job instances of a deployment.
//!

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::director::{Director, DirectorError, JobState, TaskError, TaskPoller, VmObject};

/// One running instance of a deployment job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentJob {
    /// The job name.
    pub job: String,

    /// The instance index.
    pub index: u32,
}

impl ComponentJob {
    /// Create a component job.
    pub fn new(job: impl Into<String>, index: u32) -> Self {
        Self {
            job: job.into(),
            index,
        }
    }
}

impl fmt::Display for ComponentJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job, self.index)
    }
}

/// Select the jobs whose names start with any of `prefixes`, in the order the director listed them.
pub fn routing_jobs(vms: &[VmObject], prefixes: &[String]) -> Vec<ComponentJob> {
    vms.iter()
        .filter(|vm| prefixes.iter().any(|prefix| vm.job.starts_with(prefix.as_str())))
        .map(|vm| ComponentJob::new(vm.job.clone(), vm.index))
        .collect()
}

/// Changes the state of a fixed list of jobs, one at a time, in the order given.
pub struct JobToggler<'a> {
    director: &'a dyn Director,
    poller: TaskPoller,
    deployment: String,
    manifest: Vec<u8>,
    jobs: Vec<ComponentJob>,
}

impl<'a> JobToggler<'a> {
    /// Create a toggler over `jobs` of `deployment`.
    pub fn new(
        director: &'a dyn Director,
        poller: TaskPoller,
        deployment: impl Into<String>,
        manifest: Vec<u8>,
        jobs: Vec<ComponentJob>,
    ) -> Self {
        Self {
            director,
            poller,
            deployment: deployment.into(),
            manifest,
            jobs,
        }
    }

    /// The jobs this toggler changes.
    pub fn jobs(&self) -> &[ComponentJob] {
        &self.jobs
    }

    /// Move every job to `state`, waiting for each change to finish before requesting the next.
    /// Stops at the first failure; jobs already changed are left in their new state.
    pub fn toggle_all(&self, state: JobState) -> Result<(), ToggleError> {
        for job in &self.jobs {
            info!("[{}] [{job}] Changing state to {state}", self.deployment);

            let task_id = self
                .director
                .change_job_state(&self.deployment, &job.job, job.index, state, &self.manifest)
                .map_err(|source| ToggleError::ChangeState {
                    job: job.clone(),
                    state,
                    source,
                })?;

            self.poller
                .wait_until_done(self.director, task_id)
                .map_err(|source| ToggleError::Task {
                    job: job.clone(),
                    state,
                    source,
                })?;
        }

        Ok(())
    }

    /// Start every job.
    pub fn start(&self) -> Result<(), ToggleError> {
        self.toggle_all(JobState::Started)
    }

    /// Stop every job.
    pub fn stop(&self) -> Result<(), ToggleError> {
        self.toggle_all(JobState::Stopped)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ToggleError {
    #[error("Failed to request {job} become {state}: {source}")]
    ChangeState {
        job: ComponentJob,
        state: JobState,
        #[source]
        source: DirectorError,
    },

    #[error("Failed to wait for {job} to become {state}: {source}")]
    Task {
        job: ComponentJob,
        state: JobState,
        #[source]
        source: TaskError,
    },
}
