//! Deployment director client.
//!

use core::{fmt, str::FromStr};
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod http;
mod task;

pub use http::HttpDirector;
pub use task::{PollSettings, TaskError, TaskPoller};

/// The default port the director listens on.
pub const DIRECTOR_PORT: u16 = 25555;

/// Lifecycle and status requests against a deployment director.
pub trait Director {
    /// Fetch the director info. Succeeds only if the director is reachable and the
    /// credentials are accepted.
    fn info(&self) -> Result<Vec<u8>, DirectorError>;

    /// Fetch the manifest of a deployment.
    fn deployment_manifest(&self, deployment: &str) -> Result<Vec<u8>, DirectorError>;

    /// List the VMs of a deployment.
    fn deployment_vms(&self, deployment: &str) -> Result<Vec<VmObject>, DirectorError>;

    /// Request a job instance change state, returning the id of the task tracking it.
    fn change_job_state(
        &self,
        deployment: &str,
        job: &str,
        index: u32,
        state: JobState,
        manifest: &[u8],
    ) -> Result<u64, DirectorError>;

    /// Fetch the current status of a task.
    fn task_status(&self, task_id: u64) -> Result<Task, DirectorError>;
}

impl<D: Director + ?Sized> Director for Box<D> {
    fn info(&self) -> Result<Vec<u8>, DirectorError> {
        (**self).info()
    }

    fn deployment_manifest(&self, deployment: &str) -> Result<Vec<u8>, DirectorError> {
        (**self).deployment_manifest(deployment)
    }

    fn deployment_vms(&self, deployment: &str) -> Result<Vec<VmObject>, DirectorError> {
        (**self).deployment_vms(deployment)
    }

    fn change_job_state(
        &self,
        deployment: &str,
        job: &str,
        index: u32,
        state: JobState,
        manifest: &[u8],
    ) -> Result<u64, DirectorError> {
        (**self).change_job_state(deployment, job, index, state, manifest)
    }

    fn task_status(&self, task_id: u64) -> Result<Task, DirectorError> {
        (**self).task_status(task_id)
    }
}

/// Address and credentials of a director.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectorLogin {
    /// The director address, with or without a scheme.
    pub address: String,
    /// The director port.
    pub port: u16,
    /// The director user.
    pub username: String,
    /// The director password.
    pub password: String,
}

impl fmt::Debug for DirectorLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorLogin")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Creates director clients once the director's login has been resolved.
pub trait DirectorConnector {
    /// Connect to the director described by `login`.
    fn connect(&self, login: &DirectorLogin) -> Result<Box<dyn Director>, DirectorError>;
}

impl<F> DirectorConnector for F
where
    F: Fn(&DirectorLogin) -> Result<Box<dyn Director>, DirectorError>,
{
    fn connect(&self, login: &DirectorLogin) -> Result<Box<dyn Director>, DirectorError> {
        self(login)
    }
}

/// The target state of a job instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    /// The job instance is running.
    Started,
    /// The job instance is stopped.
    Stopped,
}

impl JobState {
    /// The director's name for the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state of a director task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting to be picked up.
    Queued,
    /// In progress.
    Processing,
    /// Completed successfully.
    Done,
    /// Completed with an error.
    Error,
    /// Any state this client does not know how to handle.
    Unknown(String),
}

impl FromStr for TaskState {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => Self::Queued,
            "processing" => Self::Processing,
            "done" => Self::Done,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let state: String = Deserialize::deserialize(deserializer)?;
        match state.parse() {
            Ok(state) => Ok(state),
            Err(infallible) => match infallible {},
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Processing => f.write_str("processing"),
            Self::Done => f.write_str("done"),
            Self::Error => f.write_str("error"),
            Self::Unknown(state) => f.write_str(state),
        }
    }
}

/// A director task, as reported by the director.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Task {
    /// The task id.
    pub id: u64,
    /// The task state.
    pub state: TaskState,
    /// What the task does.
    #[serde(default)]
    pub description: String,
}

/// A VM of a deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmObject {
    /// The job running on the VM.
    pub job: String,
    /// The job instance index.
    pub index: u32,
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("Failed to {1}: {0}")]
    Request(#[source] Box<ureq::Error>, &'static str),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),

    #[error("Unsuccessful status code {0} from {1}")]
    Status(u16, String),

    #[error("Failed to deserialize {1}: {0}")]
    Deserialize(#[source] serde_json::Error, &'static str),

    #[error("Could not find a task id in '{0}'")]
    InvalidTaskId(String),

    #[error("Failed to load the director CA certificate: {0}")]
    Certificate(#[from] shared::CertificateError),
}
