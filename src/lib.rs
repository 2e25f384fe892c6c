pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod install;

pub use db::DbPool;

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use config::Config;
use std::sync::Arc;
use tracing::{info, warn};

use crate::crypto::{parse_ttl, TokenIssuer};
use crate::install::{InstalledSettings, Installer};

/// Everything that only exists once the system is installed
#[derive(Debug)]
pub struct InstalledRuntime {
    pub db: DbPool,
    pub tokens: TokenIssuer,
    pub settings: InstalledSettings,
}

pub struct AppState {
    pub config: Config,
    pub installer: Installer,
    runtime: ArcSwapOption<InstalledRuntime>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let installer = Installer::new(&config);
        Self {
            config,
            installer,
            runtime: ArcSwapOption::empty(),
        }
    }

    /// The installed database and token issuer, if installation has completed
    pub fn runtime(&self) -> Option<Arc<InstalledRuntime>> {
        self.runtime.load_full()
    }

    /// Open the runtime pool for `settings` and swap it in, closing any previous pool.
    pub async fn activate(&self, settings: InstalledSettings) -> Result<()> {
        let ttl = parse_ttl(&settings.jwt_expires_in).unwrap_or_else(|| {
            warn!(
                "Invalid JWT_EXPIRES_IN '{}', falling back to 1 day",
                settings.jwt_expires_in
            );
            chrono::Duration::days(1)
        });

        let db = db::connect(&settings.database, &self.config.server.app_root)
            .await
            .context("Failed to open the installed database")?;
        info!(backend = db.kind(), "Runtime database ready");

        let runtime = InstalledRuntime {
            db,
            tokens: TokenIssuer::new(&settings.jwt_secret, ttl),
            settings,
        };

        if let Some(previous) = self.runtime.swap(Some(Arc::new(runtime))) {
            previous.db.close().await;
        }
        Ok(())
    }

    /// Load the settings artifact if present and activate it
    pub async fn activate_from_disk(&self) -> Result<bool> {
        let store = self.installer.store();
        if !store.exists() {
            return Ok(false);
        }
        let settings = store.load()?;
        self.activate(settings).await?;
        Ok(true)
    }
}
