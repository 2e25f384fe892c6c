use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub id: i64,
    pub title: String,
    #[serde(rename = "start")]
    pub start_time: NaiveDateTime,
    #[serde(rename = "end")]
    pub end_time: NaiveDateTime,
    pub description: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

/// Body of `POST /api/appointments`. Times are local, e.g. `2026-03-01T09:30:00`.
#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub description: Option<String>,
}
