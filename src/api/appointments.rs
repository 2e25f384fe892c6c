use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{Appointment, CreateAppointmentRequest};
use crate::AppState;

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::validate_title;

/// List the caller's appointments, earliest first
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;
    let appointments = runtime.db.list_appointments_for_user(current.id).await?;
    Ok(Json(appointments))
}

pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Appointment>, ApiError> {
    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;
    let appointment = runtime
        .db
        .find_appointment(id, current.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found"))?;
    Ok(Json(appointment))
}

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("title", validate_title(&req.title));
    if req.end <= req.start {
        errors.add("end", "End time must be after start time");
    }
    errors.finish()?;

    let runtime = state.runtime().ok_or_else(ApiError::not_installed)?;
    let id = runtime.db.create_appointment(current.id, &req).await?;
    tracing::info!(appointment_id = id, user_id = current.id, "Appointment created");

    let appointment = runtime
        .db
        .find_appointment(id, current.id)
        .await?
        .ok_or_else(|| ApiError::internal("Created appointment could not be read back"))?;
    Ok((StatusCode::CREATED, Json(appointment)))
}
