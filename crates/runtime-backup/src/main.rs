//! # runtime-backup
//! Backs up or restores a runtime deployment.
//!

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use mimalloc::MiMalloc;
use runtime_backup::{
    BackupContext, Config, Orchestrator, StorageSettings,
    director::{Director, DirectorError, DirectorLogin, HttpDirector},
    persistence::SystemsInfo,
    topology::InstallationSettings,
};
use shared::{Failure, init_logger};
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    let _logger = init_logger(Path::new("./logs")).or_log_and_panic("Could not initialize logger");

    // Initialize config if args include 'init'.
    if std::env::args().any(|arg| arg.eq("init")) {
        let config = Config::default();
        let contents =
            toml::to_string_pretty(&config).or_log_and_panic("Could not serialize config file");
        fs::write("config.toml", contents).or_log_and_panic("Could not create config file");
        return ExitCode::SUCCESS;
    }

    let restore = match std::env::args().nth(1).as_deref() {
        Some("backup") => false,
        Some("restore") => true,
        _ => {
            error!("Usage: runtime-backup <init|backup|restore>");
            return ExitCode::FAILURE;
        }
    };

    // Load config
    let config =
        Config::load_toml(PathBuf::from("./config.toml")).or_log_and_panic("Could not load config");

    let topology = InstallationSettings::load(&config.installation_settings)
        .or_log_and_panic("Could not load installation settings");
    let systems = SystemsInfo::new(&topology, &config.systems_settings());

    let storage = StorageSettings::from_env(std::env::vars()).with_fallbacks(
        config.storage.domain.clone(),
        config.storage.encryption_key.clone(),
    );
    let context = BackupContext::new(config.target_directory.clone(), &storage)
        .or_log_and_panic("Could not create backup context");

    let ca_certificate = config.director.ca_certificate.clone();
    let connector = move |login: &DirectorLogin| -> Result<Box<dyn Director>, DirectorError> {
        Ok(Box::new(HttpDirector::new(login, ca_certificate.as_deref())?))
    };
    let shell = config.remote_shell();

    let mut orchestrator = Orchestrator::new(
        context,
        systems,
        &topology,
        &connector,
        &shell,
        config.orchestrator_settings(),
    );

    let result = if restore {
        orchestrator.restore()
    } else {
        orchestrator.backup()
    };

    match result {
        Ok(()) => {
            info!("Finished {}", if restore { "restore" } else { "backup" });
            ExitCode::SUCCESS
        }
        Err(e) if e.is_artifact_not_found() => {
            error!("Nothing to restore: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
