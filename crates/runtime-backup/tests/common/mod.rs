//! # common
//!

#![allow(dead_code)]

use core::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use std::{
    collections::{HashMap, VecDeque},
    io::{BufRead, BufReader, ErrorKind, Read, Write},
    net::TcpListener,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

use runtime_backup::{
    director::{
        Director, DirectorConnector, DirectorError, DirectorLogin, JobState, PollSettings, Task,
        TaskState, VmObject,
    },
    remote::{ExecuteError, RemoteExecutor, RemoteShell, SshTarget},
    topology::InstallationSettings,
};

/// Poll settings that never sleep.
pub fn fast_poll() -> PollSettings {
    PollSettings {
        interval: Duration::ZERO,
        max_attempts: 10,
        deadline: None,
    }
}

/// The installation settings fixture.
pub fn installation_settings() -> InstallationSettings {
    InstallationSettings::from_reader(include_str!("../fixtures/installation.json").as_bytes())
        .unwrap()
}

/// A state change requested of the fake director.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub deployment: String,
    pub job: String,
    pub index: u32,
    pub state: JobState,
}

/// The scripted behaviour and recorded calls of a [`FakeDirector`].
#[derive(Debug, Default)]
pub struct DirectorState {
    pub fail_connect: bool,
    pub fail_info: bool,
    pub fail_change_at: Option<usize>,
    pub fail_stop: bool,
    pub fail_start: bool,
    pub vms: Vec<VmObject>,
    pub manifest: Vec<u8>,
    /// States returned by status queries in order. Once empty, tasks are done.
    pub task_states: VecDeque<TaskState>,

    pub logins: Vec<DirectorLogin>,
    pub changes: Vec<StateChange>,
    pub manifests: Vec<Vec<u8>>,
    pub status_queries: Vec<u64>,
}

/// A director whose responses are scripted, recording every call.
#[derive(Debug, Clone, Default)]
pub struct FakeDirector {
    pub state: Arc<Mutex<DirectorState>>,
}

impl FakeDirector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A director for a deployment with two cloud controllers and a router.
    pub fn with_routing_tier() -> Self {
        let director = Self::new();
        {
            let mut state = director.state.lock().unwrap();
            state.manifest = b"name: cf-5f3c9a".to_vec();
            state.vms = vec![
                VmObject {
                    job: "cloud_controller-partition-1".into(),
                    index: 0,
                },
                VmObject {
                    job: "router-partition-1".into(),
                    index: 0,
                },
                VmObject {
                    job: "cloud_controller-partition-1".into(),
                    index: 1,
                },
            ];
        }
        director
    }

    pub fn script_states(&self, states: &[&str]) {
        self.state.lock().unwrap().task_states = states
            .iter()
            .map(|state| state.parse().unwrap())
            .collect();
    }

    pub fn changes(&self) -> Vec<StateChange> {
        self.state.lock().unwrap().changes.clone()
    }

    pub fn changes_to(&self, state: JobState) -> usize {
        self.changes()
            .iter()
            .filter(|change| change.state == state)
            .count()
    }

    pub fn status_queries(&self) -> usize {
        self.state.lock().unwrap().status_queries.len()
    }
}

impl Director for FakeDirector {
    fn info(&self) -> Result<Vec<u8>, DirectorError> {
        if self.state.lock().unwrap().fail_info {
            return Err(DirectorError::Status(401, "/info".into()));
        }
        Ok(br#"{"name":"p-bosh"}"#.to_vec())
    }

    fn deployment_manifest(&self, _deployment: &str) -> Result<Vec<u8>, DirectorError> {
        Ok(self.state.lock().unwrap().manifest.clone())
    }

    fn deployment_vms(&self, _deployment: &str) -> Result<Vec<VmObject>, DirectorError> {
        Ok(self.state.lock().unwrap().vms.clone())
    }

    fn change_job_state(
        &self,
        deployment: &str,
        job: &str,
        index: u32,
        state: JobState,
        manifest: &[u8],
    ) -> Result<u64, DirectorError> {
        let mut director = self.state.lock().unwrap();
        let call = director.changes.len();
        director.changes.push(StateChange {
            deployment: deployment.to_string(),
            job: job.to_string(),
            index,
            state,
        });
        director.manifests.push(manifest.to_vec());

        let fail = director.fail_change_at == Some(call)
            || (director.fail_stop && state == JobState::Stopped)
            || (director.fail_start && state == JobState::Started);
        if fail {
            return Err(DirectorError::Status(500, format!("/deployments/{deployment}")));
        }

        Ok(u64::try_from(call).unwrap() + 1)
    }

    fn task_status(&self, task_id: u64) -> Result<Task, DirectorError> {
        let mut director = self.state.lock().unwrap();
        director.status_queries.push(task_id);
        let state = director.task_states.pop_front().unwrap_or(TaskState::Done);

        Ok(Task {
            id: task_id,
            state,
            description: "change job state".into(),
        })
    }
}

impl DirectorConnector for FakeDirector {
    fn connect(&self, login: &DirectorLogin) -> Result<Box<dyn Director>, DirectorError> {
        let mut state = self.state.lock().unwrap();
        state.logins.push(login.clone());
        if state.fail_connect {
            return Err(DirectorError::InvalidTaskId("unreachable".into()));
        }
        Ok(Box::new(self.clone()))
    }
}

/// The scripted behaviour and recorded calls of a [`FakeShell`].
#[derive(Debug, Default)]
pub struct ShellState {
    /// Output of dump commands by host. Hosts without output produce `dump of <host>`.
    pub outputs: HashMap<String, Vec<u8>>,
    /// Hosts whose commands fail.
    pub failing_hosts: Vec<String>,

    pub connections: Vec<SshTarget>,
    pub commands: Vec<(String, String)>,
    pub imported: Vec<(String, Vec<u8>)>,
}

/// A remote shell that records commands instead of running them.
#[derive(Debug, Clone, Default)]
pub struct FakeShell {
    pub state: Arc<Mutex<ShellState>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> Vec<SshTarget> {
        self.state.lock().unwrap().connections.clone()
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn imported(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().unwrap().imported.clone()
    }

    pub fn fail_host(&self, host: &str) {
        self.state.lock().unwrap().failing_hosts.push(host.to_string());
    }
}

impl RemoteShell for FakeShell {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteExecutor>, ExecuteError> {
        self.state.lock().unwrap().connections.push(target.clone());
        Ok(Box::new(FakeSession {
            host: target.host.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    host: String,
    state: Arc<Mutex<ShellState>>,
}

impl FakeSession {
    fn record(&self, command: &str) -> Result<(), ExecuteError> {
        let mut state = self.state.lock().unwrap();
        state.commands.push((self.host.clone(), command.to_string()));
        if state.failing_hosts.contains(&self.host) {
            return Err(ExecuteError::CommandErrored(format!("{}: connection refused", self.host)));
        }
        Ok(())
    }
}

impl RemoteExecutor for FakeSession {
    fn run_to(&self, command: &str, sink: &mut dyn Write) -> Result<(), ExecuteError> {
        self.record(command)?;

        let output = self
            .state
            .lock()
            .unwrap()
            .outputs
            .get(&self.host)
            .cloned()
            .unwrap_or_else(|| format!("dump of {}", self.host).into_bytes());

        sink.write_all(&output).map_err(ExecuteError::Stream)
    }

    fn run_from(&self, command: &str, source: &mut dyn Read) -> Result<(), ExecuteError> {
        self.record(command)?;

        let mut contents = Vec::new();
        source
            .read_to_end(&mut contents)
            .map_err(ExecuteError::Stream)?;
        self.state
            .lock()
            .unwrap()
            .imported
            .push((self.host.clone(), contents));

        Ok(())
    }
}

/// A request received by the stub server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A canned response.
pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            headers: vec![("Location", location.into())],
            body: Vec::new(),
        }
    }
}

/// Serves one canned response per connection, in order, then stops.
pub struct StubServer {
    pub address: SocketAddr,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub fn start(responses: Vec<StubResponse>) -> Self {
        let listener = bind_local();
        let address = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            for response in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);

                let request = read_request(&mut reader);
                recorded.lock().unwrap().push(request);

                let mut stream = reader.into_inner();
                let mut head = format!("HTTP/1.1 {} Stub\r\n", response.status);
                for (name, value) in &response.headers {
                    head.push_str(&format!("{name}: {value}\r\n"));
                }
                head.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n",
                    response.body.len()
                ));

                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(&response.body).unwrap();
                stream.flush().unwrap();
            }
        });

        Self {
            address,
            requests,
            handle,
        }
    }

    pub fn login(&self) -> DirectorLogin {
        DirectorLogin {
            address: format!("http://{}", self.address.ip()),
            port: self.address.port(),
            username: "director".into(),
            password: "director-pass".into(),
        }
    }

    pub fn finish(self) -> Vec<RecordedRequest> {
        self.handle.join().unwrap();
        let requests = self.requests.lock().unwrap();
        requests.clone()
    }
}

fn bind_local() -> TcpListener {
    let mut port = 18181;
    loop {
        let address = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        match TcpListener::bind(address) {
            Ok(listener) => return listener,
            Err(error) if error.kind() == ErrorKind::AddrInUse => port += 1,
            Err(error) => panic!("Could not bind stub server: {error}"),
        }
    }
}

fn read_request<R: BufRead>(reader: &mut R) -> RecordedRequest {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let length: usize = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.parse().unwrap())
        .unwrap_or(0);

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).unwrap();

    RecordedRequest {
        method,
        path,
        headers,
        body,
    }
}
