use core::time::Duration;
use std::{
    fs::File,
    io::{self, BufWriter, Seek, SeekFrom, Write},
    sync::{Arc, OnceLock},
};

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    ArtifactReader, ArtifactWriter, StorageError, StorageProvider, object_key,
    signing::{Signer, encode_path},
};

/// Connection details for an S3 compatible bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// The object store domain, optionally with a scheme, e.g. `s3.amazonaws.com`.
    pub domain: String,

    /// The bucket holding the artifacts.
    pub bucket: String,

    /// The access key id.
    pub access_key_id: String,

    /// The secret access key.
    pub secret_access_key: String,

    /// The signing region.
    pub region: String,
}

/// Stores artifacts as objects in an S3 compatible bucket, using path-style addressing.
pub struct ObjectStoreProvider {
    client: Arc<Client>,
    validated: OnceLock<()>,
}

impl ObjectStoreProvider {
    /// Create a provider. The bucket is only contacted on first use.
    pub fn new(config: ObjectStoreConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();

        Self::with_agent(config, agent)
    }

    /// Create a provider that sends its requests through `agent`.
    pub fn with_agent(config: ObjectStoreConfig, agent: ureq::Agent) -> Self {
        let endpoint = if config.domain.contains("://") {
            config.domain.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", config.domain.trim_end_matches('/'))
        };
        let host = endpoint
            .split_once("://")
            .map_or(endpoint.as_str(), |(_, rest)| rest)
            .to_string();

        Self {
            client: Arc::new(Client {
                agent,
                endpoint,
                host,
                bucket: config.bucket,
                signer: Signer {
                    access_key_id: config.access_key_id,
                    secret_access_key: config.secret_access_key,
                    region: config.region,
                },
            }),
            validated: OnceLock::new(),
        }
    }

    fn ensure_bucket(&self) -> Result<(), StorageError> {
        if self.validated.get().is_some() {
            return Ok(());
        }

        match self.client.request("HEAD", "").call() {
            Ok(_) => {
                info!("Connected to bucket '{}'", self.client.bucket);
                let _ = self.validated.set(());
                Ok(())
            }
            Err(ureq::Error::Status(status, _)) => {
                Err(StorageError::Bucket(self.client.bucket.clone(), status))
            }
            Err(error) => Err(StorageError::Request(Box::new(error), "connect to bucket")),
        }
    }
}

impl StorageProvider for ObjectStoreProvider {
    fn writer(&self, path: &[&str]) -> Result<Box<dyn ArtifactWriter>, StorageError> {
        self.ensure_bucket()?;

        let spool = tempfile::tempfile().map_err(|e| StorageError::Io(e, "create upload spool"))?;

        Ok(Box::new(ObjectWriter {
            client: Arc::clone(&self.client),
            key: object_key(path),
            spool: BufWriter::new(spool),
        }))
    }

    fn reader(&self, path: &[&str]) -> Result<ArtifactReader, StorageError> {
        self.ensure_bucket()?;

        let key = object_key(path);
        match self.client.request("GET", &key).call() {
            Ok(response) => {
                debug!("Streaming object '{key}'");
                Ok(Box::new(response.into_reader()))
            }
            Err(ureq::Error::Status(404, _)) => Err(StorageError::NotFound(key)),
            Err(error) => Err(StorageError::Request(Box::new(error), "get object")),
        }
    }
}

struct Client {
    agent: ureq::Agent,
    endpoint: String,
    host: String,
    bucket: String,
    signer: Signer,
}

impl Client {
    fn request(&self, method: &str, key: &str) -> ureq::Request {
        let path = if key.is_empty() {
            format!("/{}", self.bucket)
        } else {
            format!("/{}/{key}", self.bucket)
        };
        let canonical_uri = encode_path(&path);

        let signed = self
            .signer
            .sign(method, &self.host, &canonical_uri, Utc::now());

        self.agent
            .request(method, &format!("{}{canonical_uri}", self.endpoint))
            .set("x-amz-date", &signed.amz_date)
            .set("x-amz-content-sha256", signed.content_sha256)
            .set("authorization", &signed.authorization)
    }
}

/// Spools the artifact to a temporary file, uploading it when finished.
struct ObjectWriter {
    client: Arc<Client>,
    key: String,
    spool: BufWriter<File>,
}

impl Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spool.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.spool.flush()
    }
}

impl ArtifactWriter for ObjectWriter {
    fn finish(self: Box<Self>) -> Result<(), StorageError> {
        let Self { client, key, spool } = *self;

        let mut file = spool
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error(), "flush upload spool"))?;
        let length = file
            .seek(SeekFrom::End(0))
            .map_err(|e| StorageError::Io(e, "measure upload spool"))?;
        file.rewind()
            .map_err(|e| StorageError::Io(e, "rewind upload spool"))?;

        client
            .request("PUT", &key)
            .set("content-length", &length.to_string())
            .send(file)
            .map_err(|e| StorageError::Request(Box::new(e), "put object"))?;

        info!("Uploaded object '{key}' ({length} bytes)");

        Ok(())
    }
}
