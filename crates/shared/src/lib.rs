//! # Shared
//! The shared components between the backup orchestrator and the artifact store.
//!

#![warn(missing_docs)]

mod certificates;
mod failure;
mod logger;

pub use certificates::{CertificateError, TrustStore};
pub use failure::Failure;
pub use logger::{LoggerError, init_logger};
