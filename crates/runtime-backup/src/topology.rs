//! The installation settings document describing the deployment topology and its credentials.
//!

use core::fmt;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The jobs that may run the platform's postgres databases.
pub const POSTGRES_JOBS: [&str; 3] = ["ccdb", "uaadb", "consoledb"];

/// The product identifier of the runtime.
pub const RUNTIME_PRODUCT: &str = "cf";

/// Lookups against the deployment topology.
pub trait Topology {
    /// The IPs of the VMs running `job` of `product`.
    fn find_ips_by_product_and_job(&self, product: &str, job: &str)
    -> Result<Vec<String>, TopologyError>;

    /// The VM login of the VMs running `job` of `product`.
    fn find_vm_credentials_by_product_and_job(
        &self,
        product: &str,
        job: &str,
    ) -> Result<Credentials, TopologyError>;

    /// Find a product by its identifier.
    fn find_by_product_id(&self, id: &str) -> Result<Product, TopologyError>;

    /// The runtime's postgres jobs that have at least one instance.
    fn find_cf_postgres_jobs(&self) -> Vec<Job>;

    /// The credentials held in the `identifier` property of `job` of `product`.
    fn find_property_credentials(
        &self,
        product: &str,
        job: &str,
        identifier: &str,
    ) -> Result<Credentials, TopologyError>;
}

/// An identity and its password.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The user.
    #[serde(default)]
    pub identity: String,

    /// The password.
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// An installed product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// The product's guid, keying its IP assignments.
    #[serde(default)]
    pub guid: String,

    /// The product identifier, e.g. `cf`.
    pub identifier: String,

    /// The deployment name of the product.
    #[serde(default)]
    pub installation_name: String,

    /// The product's jobs.
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// A job of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// The job's guid, keying its IP assignments.
    #[serde(default)]
    pub guid: String,

    /// The job identifier, e.g. `nfs_server`.
    pub identifier: String,

    /// The job's instance counts.
    #[serde(default)]
    pub instances: Vec<Instances>,

    /// The VM login.
    #[serde(default)]
    pub vm_credentials: Option<Credentials>,

    /// The job's properties.
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Job {
    /// Whether any instance count is at least one.
    pub fn has_instances(&self) -> bool {
        self.instances.iter().any(|instances| instances.value >= 1)
    }
}

/// An instance count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instances {
    /// What is counted.
    #[serde(default)]
    pub identifier: String,

    /// The count.
    #[serde(default)]
    pub value: i64,
}

/// A job property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// The property identifier.
    pub identifier: String,

    /// The property value.
    #[serde(default)]
    pub value: Value,
}

/// IPs by product guid, job guid, then availability zone guid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAssignments {
    /// The assignments.
    #[serde(default)]
    pub assignments: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

/// An installation settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallationSettings {
    /// The installed products.
    #[serde(default)]
    pub products: Vec<Product>,

    /// The IPs of each job.
    #[serde(default)]
    pub ip_assignments: IpAssignments,
}

impl InstallationSettings {
    /// Load a document from a JSON file.
    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let file = File::open(path).map_err(TopologyError::Read)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse a JSON document.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TopologyError> {
        Ok(serde_json::from_reader(reader)?)
    }

    fn product(&self, id: &str) -> Result<&Product, TopologyError> {
        self.products
            .iter()
            .find(|product| product.identifier == id)
            .ok_or_else(|| TopologyError::ProductNotFound(id.to_string()))
    }

    fn job(&self, product: &str, job: &str) -> Result<(&Product, &Job), TopologyError> {
        let found_product = self.product(product)?;
        let found_job = found_product
            .jobs
            .iter()
            .find(|candidate| candidate.identifier == job)
            .ok_or_else(|| TopologyError::JobNotFound(product.to_string(), job.to_string()))?;

        Ok((found_product, found_job))
    }
}

impl Topology for InstallationSettings {
    fn find_ips_by_product_and_job(
        &self,
        product: &str,
        job: &str,
    ) -> Result<Vec<String>, TopologyError> {
        let (found_product, found_job) = self.job(product, job)?;

        let ips: Vec<String> = self
            .ip_assignments
            .assignments
            .get(&found_product.guid)
            .and_then(|jobs| jobs.get(&found_job.guid))
            .map(|zones| zones.values().flatten().cloned().collect())
            .unwrap_or_default();

        if ips.is_empty() {
            return Err(TopologyError::NoIps(product.to_string(), job.to_string()));
        }

        Ok(ips)
    }

    fn find_vm_credentials_by_product_and_job(
        &self,
        product: &str,
        job: &str,
    ) -> Result<Credentials, TopologyError> {
        let (_, found_job) = self.job(product, job)?;

        found_job
            .vm_credentials
            .clone()
            .ok_or_else(|| TopologyError::NoVmCredentials(product.to_string(), job.to_string()))
    }

    fn find_by_product_id(&self, id: &str) -> Result<Product, TopologyError> {
        self.product(id).cloned()
    }

    fn find_cf_postgres_jobs(&self) -> Vec<Job> {
        let Ok(product) = self.product(RUNTIME_PRODUCT) else {
            return Vec::new();
        };

        product
            .jobs
            .iter()
            .filter(|job| POSTGRES_JOBS.contains(&job.identifier.as_str()) && job.has_instances())
            .cloned()
            .collect()
    }

    fn find_property_credentials(
        &self,
        product: &str,
        job: &str,
        identifier: &str,
    ) -> Result<Credentials, TopologyError> {
        let (_, found_job) = self.job(product, job)?;

        let property = found_job
            .properties
            .iter()
            .find(|property| property.identifier == identifier)
            .ok_or_else(|| TopologyError::PropertyNotFound {
                product: product.to_string(),
                job: job.to_string(),
                identifier: identifier.to_string(),
            })?;

        serde_json::from_value(property.value.clone()).map_err(|source| {
            TopologyError::InvalidProperty {
                identifier: identifier.to_string(),
                source,
            }
        })
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Failed to read the installation settings:\n{0}")]
    Read(#[source] io::Error),

    #[error("Failed to deserialize the installation settings:\n{0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Job not found: {0}/{1}")]
    JobNotFound(String, String),

    #[error("No IPs found for {0}/{1}")]
    NoIps(String, String),

    #[error("No VM credentials found for {0}/{1}")]
    NoVmCredentials(String, String),

    #[error("Property '{identifier}' not found for {product}/{job}")]
    PropertyNotFound {
        product: String,
        job: String,
        identifier: String,
    },

    #[error("Property '{identifier}' does not hold credentials: {source}")]
    InvalidProperty {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },
}
