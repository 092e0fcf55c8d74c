use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
    sync::Arc,
};

use rustls::{ClientConfig, RootCertStore, crypto::ring};
use rustls_pemfile::certs;
use thiserror::Error;

/// Trust store used to verify a director's TLS certificate.
pub struct TrustStore {
    /// The trusted root certificates.
    pub roots: RootCertStore,
}

impl TrustStore {
    /// Tries to load the trusted root certificates from a PEM file.
    pub fn load(root_certificate_file: &Path) -> Result<Self, CertificateError> {
        let root_certificate_file =
            File::open(root_certificate_file).map_err(CertificateError::LoadRootCertificate)?;

        Self::from_pem(&mut BufReader::new(root_certificate_file))
    }

    /// Tries to build the trust store from PEM encoded certificates.
    pub fn from_pem(reader: &mut dyn io::BufRead) -> Result<Self, CertificateError> {
        let root_certificates: Vec<_> = certs(reader)
            .collect::<io::Result<_>>()
            .map_err(CertificateError::LoadRootCertificate)?;

        if root_certificates.is_empty() {
            return Err(CertificateError::NoRootCertificate);
        }

        let mut roots = RootCertStore::empty();
        for certificate in root_certificates {
            roots.add(certificate)?;
        }

        Ok(Self { roots })
    }

    /// Builds a client TLS config that only trusts this store.
    pub fn client_config(self) -> Result<Arc<ClientConfig>, CertificateError> {
        let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(CertificateError::ClientConfig)?
            .with_root_certificates(self.roots)
            .with_no_client_auth();

        Ok(Arc::new(config))
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to load the root certificate file\n{0}")]
    LoadRootCertificate(#[source] io::Error),

    #[error("The root certificate file contained no certificates.")]
    NoRootCertificate,

    #[error("Failed to create the trust store\n{0}")]
    CreateTrustStore(#[from] rustls::Error),

    #[error("Failed to create the client TLS config\n{0}")]
    ClientConfig(#[source] rustls::Error),
}
