use thiserror::Error;
use tracing::debug;

use super::{
    DumpKind, DumpUtilities, MysqlTarget, NfsBackupType, NfsTarget, PostgresTarget, SystemDump,
};
use crate::{
    director::DirectorLogin,
    topology::{RUNTIME_PRODUCT, Topology, TopologyError},
};

/// Identity whose credentials are the VM login.
const VM_CREDENTIALS: &str = "vm_credentials";

/// What decides how the systems are dumped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemsSettings {
    /// Where the dump utilities are installed.
    pub utilities: DumpUtilities,

    /// How much of the blob store is backed up.
    pub nfs_backup_type: NfsBackupType,
}

/// The director and the ordered persistent systems of a deployment.
#[derive(Debug, Clone)]
pub struct SystemsInfo {
    /// The deployment director.
    pub director: SystemDump,

    /// The systems backed up, in backup order.
    pub persistent: Vec<SystemDump>,

    /// The runtime's deployment name, known once credentials are resolved.
    pub deployment_name: String,
}

impl SystemsInfo {
    /// Describe the systems of the deployment in `topology`: its postgres databases, then mysql,
    /// then the blob store.
    pub fn new<T: Topology + ?Sized>(topology: &T, settings: &SystemsSettings) -> Self {
        let mut persistent = Vec::new();

        for job in topology.find_cf_postgres_jobs() {
            let (identity, database) = match job.identifier.as_str() {
                "ccdb" => ("admin", "ccdb"),
                "uaadb" => ("root", "uaa"),
                "consoledb" => ("root", "console"),
                _ => continue,
            };

            persistent.push(SystemDump::new(
                RUNTIME_PRODUCT,
                job.identifier.as_str(),
                identity,
                DumpKind::Postgres(PostgresTarget::new(database, settings.utilities.clone())),
            ));
        }

        persistent.push(SystemDump::new(
            RUNTIME_PRODUCT,
            "mysql",
            "root",
            DumpKind::Mysql(MysqlTarget {
                utilities: settings.utilities.clone(),
            }),
        ));

        persistent.push(SystemDump::new(
            RUNTIME_PRODUCT,
            "nfs_server",
            "vcap",
            DumpKind::Nfs(NfsTarget {
                backup_type: settings.nfs_backup_type,
            }),
        ));

        let director_product = if topology.find_by_product_id("p-bosh").is_ok() {
            "p-bosh"
        } else {
            "microbosh"
        };

        Self {
            director: SystemDump::new(director_product, "director", "director", DumpKind::Base),
            persistent,
            deployment_name: String::new(),
        }
    }

    /// Fill in the address and credentials of every system, and the deployment name.
    pub fn resolve_credentials<T: Topology + ?Sized>(
        &mut self,
        topology: &T,
    ) -> Result<(), ResolveError> {
        resolve(topology, &mut self.director)?;
        for system in &mut self.persistent {
            resolve(topology, system)?;
        }

        self.deployment_name = topology
            .find_by_product_id(RUNTIME_PRODUCT)
            .map_err(ResolveError::DeploymentName)?
            .installation_name;

        Ok(())
    }

    /// The login of the director.
    pub fn director_login(&self, port: u16) -> DirectorLogin {
        DirectorLogin {
            address: self.director.ip.clone(),
            port,
            username: self.director.user.clone(),
            password: self.director.pass.clone(),
        }
    }
}

fn resolve<T: Topology + ?Sized>(topology: &T, system: &mut SystemDump) -> Result<(), ResolveError> {
    let wrap = |source| ResolveError::Credentials {
        component: system.component.clone(),
        source,
    };

    let ips = topology
        .find_ips_by_product_and_job(&system.product, &system.component)
        .map_err(wrap)?;
    let vm = topology
        .find_vm_credentials_by_product_and_job(&system.product, &system.component)
        .map_err(wrap)?;

    let credentials = if system.identity == VM_CREDENTIALS {
        vm.clone()
    } else {
        topology
            .find_property_credentials(&system.product, &system.component, &system.identity)
            .map_err(wrap)?
    };

    debug!(
        "Resolved {}/{} at {}",
        system.product,
        system.component,
        ips.join(", ")
    );

    system.ip = ips.into_iter().next().unwrap_or_default();
    system.vcap_user = vm.identity;
    system.vcap_pass = vm.password;
    system.user = credentials.identity;
    system.pass = credentials.password;

    Ok(())
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to resolve the credentials of '{component}': {source}")]
    Credentials {
        component: String,
        #[source]
        source: TopologyError,
    },

    #[error("Failed to find the deployment name: {0}")]
    DeploymentName(#[source] TopologyError),
}
