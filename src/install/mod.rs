//! Installation workflow: validate the wizard input, probe the target,
//! create the schema with the admin and company rows, then write the
//! settings artifact that marks the system as installed.

mod backend;
mod error;
mod mysql;
mod request;
mod settings;
mod sqlite;

pub use backend::{
    backend_for, InstallBackend, InstallOptions, InstallSeed, ProbeResult, SchemaState,
};
pub use error::InstallError;
pub use request::{
    AdminAccount, BackendConnectionDescriptor, BackendKind, CompanyInfo, CompanySeed,
    DatabaseConfig, InstallRequest, MySqlTarget, SqliteTarget,
};
pub use settings::{DatabaseSettings, InstalledSettings, SettingsStore};

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{Config, Environment, InstallationConfig};

/// Where the login page lives after a successful install
pub const LOGIN_REDIRECT: &str = "/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationState {
    NotInstalled,
    Installed,
}

impl InstallationState {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallationState::Installed)
    }
}

/// Steps of a single `perform` call, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallPhase {
    Validating,
    Probing,
    Installing,
    Persisting,
    Installed,
    Failed,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallPhase::Validating => "validating",
            InstallPhase::Probing => "probing",
            InstallPhase::Installing => "installing",
            InstallPhase::Persisting => "persisting",
            InstallPhase::Installed => "installed",
            InstallPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub message: String,
    pub env_updated: bool,
    pub redirect: &'static str,
    pub settings: InstalledSettings,
}

#[derive(Debug, Clone)]
pub struct Installer {
    app_root: PathBuf,
    store: SettingsStore,
    defaults: InstallationConfig,
    environment: Environment,
    /// Held for the install and persist steps so overlapping requests run one after another
    install_lock: Arc<Mutex<()>>,
}

impl Installer {
    pub fn new(config: &Config) -> Self {
        Self {
            app_root: config.server.app_root.clone(),
            store: SettingsStore::new(config.settings_path()),
            defaults: config.installation.clone(),
            environment: config.server.environment,
            install_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Installed iff the settings artifact exists. No credentials are checked.
    pub fn status(&self) -> InstallationState {
        if self.store.exists() {
            InstallationState::Installed
        } else {
            InstallationState::NotInstalled
        }
    }

    fn descriptor(
        &self,
        database: &DatabaseConfig,
    ) -> Result<BackendConnectionDescriptor, InstallError> {
        database.descriptor(&self.app_root, &self.defaults.default_sqlite_filename)
    }

    /// Probe a prospective target without changing installation state.
    pub async fn test_connection(
        &self,
        database: &DatabaseConfig,
    ) -> Result<ProbeResult, InstallError> {
        let descriptor = self.descriptor(database)?;
        let backend = backend_for(&descriptor);
        let result = backend.probe().await;
        info!(
            backend = %backend.kind(),
            success = result.success,
            "Connection test: {}",
            result.message
        );
        Ok(result)
    }

    pub async fn perform(&self, request: &InstallRequest) -> Result<InstallOutcome, InstallError> {
        let result = self.run(request).await;
        match &result {
            Ok(_) => info!(phase = %InstallPhase::Installed, "Installation completed"),
            Err(InstallError::AlreadyInstalled) => {
                warn!("Installation refused: target already holds user data")
            }
            Err(e) => error!(
                phase = %InstallPhase::Failed,
                code = e.code(),
                "Installation failed: {}",
                e
            ),
        }
        result
    }

    async fn run(&self, request: &InstallRequest) -> Result<InstallOutcome, InstallError> {
        info!(phase = %InstallPhase::Validating, "Starting installation");
        let (admin, database) = request.validate()?;
        let descriptor = self.descriptor(database)?;
        let backend = backend_for(&descriptor);
        let _guard = self.install_lock.lock().await;

        info!(phase = %InstallPhase::Probing, backend = %backend.kind(), "Checking connectivity");
        let probe = backend.probe().await;
        if !probe.success {
            return Err(backend.probe_error(probe.message));
        }

        info!(
            phase = %InstallPhase::Installing,
            backend = %backend.kind(),
            reinstall = database.reinstall,
            "Installing schema"
        );
        let company = request.company_seed(admin.email.trim());
        let options = InstallOptions {
            reinstall: database.reinstall,
            empty_schema: self.defaults.empty_schema_policy,
        };
        backend.install(InstallSeed { admin, company: &company }, options).await?;

        info!(
            phase = %InstallPhase::Persisting,
            path = %self.store.path().display(),
            "Writing settings"
        );
        let settings =
            InstalledSettings::materialize(&descriptor, &self.defaults, self.environment);
        let store = self.store.clone();
        let to_write = settings.clone();
        let confirmed = tokio::task::spawn_blocking(move || store.persist(&to_write))
            .await
            .map_err(|e| InstallError::PersistFailed(e.to_string()))??;
        if !confirmed {
            return Err(InstallError::PersistFailed(format!(
                "Settings file {} could not be verified after writing",
                self.store.path().display()
            )));
        }

        Ok(InstallOutcome {
            message: "Installation completed successfully".to_string(),
            env_updated: confirmed,
            redirect: LOGIN_REDIRECT,
            settings,
        })
    }
}
