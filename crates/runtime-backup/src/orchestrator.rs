//! Backup and restore of a whole deployment.
//!

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    context::BackupContext,
    director::{
        DIRECTOR_PORT, Director, DirectorConnector, DirectorError, PollSettings, TaskPoller,
    },
    dispatch::{Action, DispatchError, Dispatcher},
    persistence::{ResolveError, SystemsInfo},
    remote::RemoteShell,
    toggler::{ComponentJob, JobToggler, ToggleError, routing_jobs},
    topology::Topology,
};

/// The job name prefix of the routing tier.
pub const ROUTING_JOB_PREFIX: &str = "cloud_controller";

/// How a run talks to the director and finds the routing tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// The director port.
    pub director_port: u16,

    /// How director tasks are polled.
    pub poll: PollSettings,

    /// Jobs whose names start with any of these form the routing tier.
    pub routing_job_prefixes: Vec<String>,

    /// The routing tier, in stop order, instead of the jobs found by prefix.
    pub routing_jobs: Option<Vec<ComponentJob>>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            director_port: DIRECTOR_PORT,
            poll: PollSettings::default(),
            routing_job_prefixes: vec![ROUTING_JOB_PREFIX.to_string()],
            routing_jobs: None,
        }
    }
}

/// Backs up and restores the persistent systems of a deployment, with its routing tier stopped.
pub struct Orchestrator<'a> {
    context: BackupContext,
    systems: SystemsInfo,
    topology: &'a dyn Topology,
    connector: &'a dyn DirectorConnector,
    shell: &'a dyn RemoteShell,
    settings: OrchestratorSettings,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator.
    pub fn new(
        context: BackupContext,
        systems: SystemsInfo,
        topology: &'a dyn Topology,
        connector: &'a dyn DirectorConnector,
        shell: &'a dyn RemoteShell,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            context,
            systems,
            topology,
            connector,
            shell,
            settings,
        }
    }

    /// The systems, with credentials once a run has resolved them.
    pub fn systems(&self) -> &SystemsInfo {
        &self.systems
    }

    /// Back up every persistent system.
    pub fn backup(&mut self) -> Result<(), BackupError> {
        self.run(Action::Export)
    }

    /// Restore every persistent system from its backup.
    pub fn restore(&mut self) -> Result<(), BackupError> {
        self.run(Action::Import)
    }

    fn run(&mut self, action: Action) -> Result<(), BackupError> {
        info!("[{action}] Resolving credentials");
        self.systems.resolve_credentials(self.topology)?;

        let director = self.connect_director()?;
        let deployment = self.systems.deployment_name.clone();

        let manifest = director
            .deployment_manifest(&deployment)
            .map_err(BackupError::Manifest)?;

        let jobs = self.routing_tier(director.as_ref(), &deployment)?;
        info!(
            "[{action}] Routing tier: {}",
            jobs.iter()
                .map(ComponentJob::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let toggler = JobToggler::new(
            director.as_ref(),
            TaskPoller::new(self.settings.poll),
            deployment,
            manifest,
            jobs,
        );

        let tier = StoppedRoutingTier::new(&toggler);

        info!("[{action}] Stopping the routing tier");
        let result = match toggler.stop() {
            Ok(()) => self.run_dispatcher(action),
            Err(source) => Err(BackupError::StopRoutingTier(source)),
        };

        info!("[{action}] Starting the routing tier");
        let restart = tier.finish();

        match (result, restart) {
            (Ok(()), Ok(())) => {
                info!("[{action}] Complete");
                Ok(())
            }
            (Ok(()), Err(source)) => Err(BackupError::StartRoutingTier(source)),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(restart)) => {
                error!("[{action}] Failed to restart the routing tier: {restart}");
                Err(error)
            }
        }
    }

    fn connect_director(&self) -> Result<Box<dyn Director>, BackupError> {
        let login = self.systems.director_login(self.settings.director_port);

        let director = self
            .connector
            .connect(&login)
            .map_err(BackupError::DirectorCredentials)?;

        director.info().map_err(BackupError::DirectorCredentials)?;

        Ok(director)
    }

    fn routing_tier(
        &self,
        director: &dyn Director,
        deployment: &str,
    ) -> Result<Vec<ComponentJob>, BackupError> {
        let jobs = match &self.settings.routing_jobs {
            Some(jobs) => jobs.clone(),
            None => {
                let vms = director
                    .deployment_vms(deployment)
                    .map_err(BackupError::RoutingJobs)?;
                routing_jobs(&vms, &self.settings.routing_job_prefixes)
            }
        };

        if jobs.is_empty() {
            return Err(BackupError::NoRoutingJobs(deployment.to_string()));
        }

        Ok(jobs)
    }

    fn run_dispatcher(&self, action: Action) -> Result<(), BackupError> {
        if self.systems.persistent.is_empty() {
            return Err(BackupError::NoPersistentSystems);
        }

        Dispatcher::new(&self.context, self.shell)
            .run_db_action(&self.systems.persistent, action)
            .map_err(BackupError::Dispatch)
    }
}

/// A routing tier that has been asked to stop, and is started again exactly once: by
/// [`StoppedRoutingTier::finish`], or when dropped without finishing.
pub struct StoppedRoutingTier<'t, 'a> {
    toggler: &'t JobToggler<'a>,
    finished: bool,
}

impl<'t, 'a> StoppedRoutingTier<'t, 'a> {
    /// Guard the tier of `toggler`.
    pub fn new(toggler: &'t JobToggler<'a>) -> Self {
        Self {
            toggler,
            finished: false,
        }
    }

    /// Start the tier.
    pub fn finish(mut self) -> Result<(), ToggleError> {
        self.finished = true;
        self.toggler.start()
    }
}

impl Drop for StoppedRoutingTier<'_, '_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        warn!("Starting the routing tier after an interrupted run");
        if let Err(e) = self.toggler.start() {
            error!("Failed to restart the routing tier: {e}");
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Failed to read user credentials: {0}")]
    ResolveCredentials(#[from] ResolveError),

    #[error(
        "Invalid director credentials, or a director certificate not signed by `director.ca_certificate`: {0}"
    )]
    DirectorCredentials(#[source] DirectorError),

    #[error("Failed to get the deployment manifest: {0}")]
    Manifest(#[source] DirectorError),

    #[error("Failed to list the deployment VMs: {0}")]
    RoutingJobs(#[source] DirectorError),

    #[error("No routing tier jobs found in deployment '{0}'")]
    NoRoutingJobs(String),

    #[error("Failed to stop the routing tier: {0}")]
    StopRoutingTier(#[source] ToggleError),

    #[error("Failed to start the routing tier: {0}")]
    StartRoutingTier(#[source] ToggleError),

    #[error("No persistent systems are configured")]
    NoPersistentSystems,

    #[error("Failed to process the persistent systems: {0}")]
    Dispatch(#[source] DispatchError),
}

impl BackupError {
    /// If a restore failed because a system was never backed up.
    pub fn is_artifact_not_found(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::ArtifactNotFound(_)))
    }
}
