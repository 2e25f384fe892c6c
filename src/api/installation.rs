//! Installation wizard endpoints.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::install::{DatabaseConfig, InstallError, InstallRequest, ProbeResult};
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub installed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformResponse {
    pub success: bool,
    pub message: String,
    pub env_updated: bool,
    pub redirect: String,
}

/// GET /api/installation/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        installed: state.installer.status().is_installed(),
    })
}

/// POST /api/installation/test-connection
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Json(database): Json<DatabaseConfig>,
) -> (StatusCode, Json<ProbeResult>) {
    let result = match state.installer.test_connection(&database).await {
        Ok(result) => result,
        Err(InstallError::UnsupportedBackend(kind)) => {
            tracing::warn!(kind = %kind, "Connection test for unsupported database type");
            ProbeResult::failed("Unsupported database type")
        }
        Err(e) => ProbeResult::failed(e.to_string()),
    };

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(result))
}

/// POST /api/installation/perform
pub async fn perform(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InstallRequest>,
) -> Result<Json<PerformResponse>, ApiError> {
    let expose_internal = !state.installer.environment().is_production();
    let outcome = state
        .installer
        .perform(&request)
        .await
        .map_err(|e| ApiError::from_install(e, expose_internal))?;

    // The settings file is already on disk; a failure here only affects this process.
    if let Err(e) = state.activate(outcome.settings.clone()).await {
        tracing::error!("Installed, but failed to open the runtime database: {:#}", e);
    }

    Ok(Json(PerformResponse {
        success: true,
        message: outcome.message,
        env_updated: outcome.env_updated,
        redirect: outcome.redirect.to_string(),
    }))
}
