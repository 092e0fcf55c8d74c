//! Running commands on deployment VMs over SSH.
//!

use core::fmt;
use std::{
    io::{self, Read, Write},
    path::PathBuf,
    process::{Child, Command, Stdio},
    thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::debug;

/// The SSH port of deployment VMs.
pub const SSH_PORT: u16 = 22;

/// Opens sessions on remote hosts.
pub trait RemoteShell {
    /// Open a session on `target`.
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteExecutor>, ExecuteError>;
}

/// Runs commands in a session on a remote host.
pub trait RemoteExecutor {
    /// Run `command`, streaming its stdout into `sink`.
    fn run_to(&self, command: &str, sink: &mut dyn Write) -> Result<(), ExecuteError>;

    /// Run `command`, streaming `source` into its stdin.
    fn run_from(&self, command: &str, source: &mut dyn Read) -> Result<(), ExecuteError>;
}

/// A host and the credentials to log into it.
#[derive(Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// The host address.
    pub host: String,
    /// The login user.
    pub username: String,
    /// The login password.
    pub password: String,
}

impl fmt::Debug for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTarget")
            .field("host", &self.host)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Runs commands through the system `ssh` client. Without a private key the login password is
/// supplied through `sshpass`.
#[derive(Debug, Clone)]
pub struct OpenSsh {
    /// The SSH port.
    pub port: u16,

    /// The private key to log in with, if any.
    pub private_key: Option<PathBuf>,

    /// Seconds to wait for the connection.
    pub connect_timeout: u32,
}

impl Default for OpenSsh {
    fn default() -> Self {
        Self {
            port: SSH_PORT,
            private_key: None,
            connect_timeout: 30,
        }
    }
}

impl RemoteShell for OpenSsh {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn RemoteExecutor>, ExecuteError> {
        if target.host.is_empty() {
            return Err(ExecuteError::MissingHost);
        }

        Ok(Box::new(OpenSshSession {
            shell: self.clone(),
            target: target.clone(),
        }))
    }
}

struct OpenSshSession {
    shell: OpenSsh,
    target: SshTarget,
}

impl OpenSshSession {
    fn command(&self, remote_command: &str) -> Command {
        let mut command = match &self.shell.private_key {
            Some(_) => Command::new("ssh"),
            None => {
                let mut command = Command::new("sshpass");
                command.arg("-e").arg("ssh").env("SSHPASS", &self.target.password);
                command
            }
        };

        command
            .arg("-p")
            .arg(self.shell.port.to_string())
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.shell.connect_timeout));

        match &self.shell.private_key {
            Some(key) => {
                command.arg("-i").arg(key).args(["-o", "BatchMode=yes"]);
            }
            None => {
                command.args(["-o", "PubkeyAuthentication=no"]);
            }
        }

        command
            .arg(format!("{}@{}", self.target.username, self.target.host))
            .arg(remote_command);

        command
    }
}

impl RemoteExecutor for OpenSshSession {
    fn run_to(&self, command: &str, sink: &mut dyn Write) -> Result<(), ExecuteError> {
        debug!("[{}] Running '{command}'", self.target.host);

        let mut child = self
            .command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExecuteError::RunCommand)?;

        let stderr = collect_stderr(&mut child);
        let copied = match child.stdout.take() {
            Some(mut stdout) => io::copy(&mut stdout, sink).map(|_| ()),
            None => Ok(()),
        };

        finish(child, stderr, copied)
    }

    fn run_from(&self, command: &str, source: &mut dyn Read) -> Result<(), ExecuteError> {
        debug!("[{}] Running '{command}'", self.target.host);

        let mut child = self
            .command(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExecuteError::RunCommand)?;

        let stderr = collect_stderr(&mut child);
        let copied = match child.stdin.take() {
            // stdin is closed when dropped at the end of this arm.
            Some(mut stdin) => io::copy(source, &mut stdin).map(|_| ()),
            None => Ok(()),
        };

        finish(child, stderr, copied)
    }
}

fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;

    Some(thread::spawn(move || {
        let mut output = String::new();
        let _ = stderr.read_to_string(&mut output);
        output
    }))
}

fn finish(
    mut child: Child,
    stderr: Option<JoinHandle<String>>,
    copied: io::Result<()>,
) -> Result<(), ExecuteError> {
    if copied.is_err() {
        let _ = child.kill();
    }

    let status = child.wait().map_err(ExecuteError::RunCommand)?;
    let stderr = stderr
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(ExecuteError::CommandErrored(stderr.trim().to_string()));
    }

    copied.map_err(ExecuteError::Stream)
}

/// Quote `argument` for a POSIX shell.
pub fn shell_quote(argument: &str) -> String {
    format!("'{}'", argument.replace('\'', r"'\''"))
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("Failed to run command:\n{0}")]
    RunCommand(#[source] io::Error),

    #[error("Command output was error:\n{0}")]
    CommandErrored(String),

    #[error("Failed to stream command data: {0}")]
    Stream(#[source] io::Error),

    #[error("No host to connect to")]
    MissingHost,
}
