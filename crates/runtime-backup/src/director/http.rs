use core::time::Duration;
use std::{io::Read, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};
use shared::TrustStore;
use tracing::debug;

use super::{Director, DirectorError, DirectorLogin, JobState, Task, VmObject};

/// A director reached over its HTTPS API.
pub struct HttpDirector {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl HttpDirector {
    /// Create a client for the director described by `login`. When `ca_certificate` is given
    /// the director's certificate must chain to it, otherwise the platform roots are used.
    pub fn new(login: &DirectorLogin, ca_certificate: Option<&Path>) -> Result<Self, DirectorError> {
        let mut builder = ureq::AgentBuilder::new()
            .redirects(0)
            .timeout_connect(Duration::from_secs(30));

        if let Some(path) = ca_certificate {
            let trust_store = TrustStore::load(path)?;
            builder = builder.tls_config(trust_store.client_config()?);
        }

        Ok(Self::with_agent(login, builder.build()))
    }

    /// Create a client that sends its requests through `agent`. The agent must not follow
    /// redirects.
    pub fn with_agent(login: &DirectorLogin, agent: ureq::Agent) -> Self {
        let address = login.address.trim_end_matches('/');
        let base_url = if address.contains("://") {
            format!("{address}:{}", login.port)
        } else {
            format!("https://{address}:{}", login.port)
        };

        let credentials = STANDARD.encode(format!("{}:{}", login.username, login.password));

        Self {
            agent,
            base_url,
            authorization: format!("Basic {credentials}"),
        }
    }

    fn get(&self, path: &str, operation: &'static str) -> Result<ureq::Response, DirectorError> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}");

        let response = self
            .agent
            .get(&url)
            .set("authorization", &self.authorization)
            .call()
            .map_err(|e| map_error(e, &url, operation))?;

        if response.status() != 200 {
            return Err(DirectorError::Status(response.status(), url));
        }

        Ok(response)
    }

    fn get_bytes(&self, path: &str, operation: &'static str) -> Result<Vec<u8>, DirectorError> {
        let response = self.get(path, operation)?;

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| DirectorError::Io(e, operation))?;

        Ok(body)
    }
}

impl Director for HttpDirector {
    fn info(&self) -> Result<Vec<u8>, DirectorError> {
        self.get_bytes("/info", "get director info")
    }

    fn deployment_manifest(&self, deployment: &str) -> Result<Vec<u8>, DirectorError> {
        self.get_bytes(&format!("/deployments/{deployment}"), "get deployment manifest")
    }

    fn deployment_vms(&self, deployment: &str) -> Result<Vec<VmObject>, DirectorError> {
        let body = self.get_bytes(&format!("/deployments/{deployment}/vms"), "get deployment vms")?;
        serde_json::from_slice(&body).map_err(|e| DirectorError::Deserialize(e, "deployment vms"))
    }

    fn change_job_state(
        &self,
        deployment: &str,
        job: &str,
        index: u32,
        state: JobState,
        manifest: &[u8],
    ) -> Result<u64, DirectorError> {
        let url = format!(
            "{}/deployments/{deployment}/jobs/{job}/{index}?state={state}",
            self.base_url
        );
        debug!("PUT {url}");

        let response = self
            .agent
            .put(&url)
            .set("authorization", &self.authorization)
            .set("content-type", "text/yaml")
            .send_bytes(manifest)
            .map_err(|e| map_error(e, &url, "change job state"))?;

        if response.status() != 302 {
            return Err(DirectorError::Status(response.status(), url));
        }

        let location = response
            .header("location")
            .ok_or_else(|| DirectorError::InvalidTaskId(String::new()))?;

        parse_task_id(location)
    }

    fn task_status(&self, task_id: u64) -> Result<Task, DirectorError> {
        let body = self.get_bytes(&format!("/tasks/{task_id}"), "get task status")?;
        serde_json::from_slice(&body).map_err(|e| DirectorError::Deserialize(e, "task status"))
    }
}

fn map_error(error: ureq::Error, url: &str, operation: &'static str) -> DirectorError {
    match error {
        ureq::Error::Status(status, _) => DirectorError::Status(status, url.to_string()),
        error => DirectorError::Request(Box::new(error), operation),
    }
}

/// Extract the id from a task URL, e.g. `https://10.0.0.2:25555/tasks/42`.
fn parse_task_id(location: &str) -> Result<u64, DirectorError> {
    let id = location
        .rsplit_once("tasks/")
        .map(|(_, id)| id.trim_end_matches('/'))
        .and_then(|id| id.split(['?', '#']).next())
        .and_then(|id| id.parse::<u64>().ok());

    match id {
        Some(id) if id != 0 => Ok(id),
        _ => Err(DirectorError::InvalidTaskId(location.to_string())),
    }
}
