use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use super::{AppointmentFilter, Appointments};
use crate::account::Accounts;
use crate::api::{self, PageParams, Pagination, validate_payload};
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handler::AppState;
use crate::model::AppointmentStatus;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    #[validate(length(min = 3, max = 100))]
    pub subject: String,
    #[validate(length(min = 10, max = 500))]
    pub details: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentRequest {
    #[validate(length(min = 3, max = 100))]
    pub subject: Option<String>,
    #[validate(length(min = 10, max = 500))]
    pub details: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListParams {
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateAppointmentRequest>,
) -> AppResult<Response> {
    validate_payload(&payload)?;

    let user = Accounts::new(&state.db)
        .get_user(&auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let appointment = Appointments::new(&state.db)
        .create(&user, payload.subject, payload.details, payload.date)
        .await?;
    tracing::info!(user_id = %auth.id, appointment_id = %appointment.id, "appointment booked");
    Ok(api::created("Appointment booked successfully", appointment))
}

fn parse_status(raw: &str) -> AppResult<AppointmentStatus> {
    AppointmentStatus::from_str(raw)
        .ok_or_else(|| AppError::Validation("Invalid status value".to_string()))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<AppointmentListParams>,
) -> AppResult<Response> {
    auth.require_admin()?;

    let status = match params.status.as_deref() {
        Some(raw) if !raw.is_empty() && raw != "all" => Some(parse_status(raw)?),
        _ => None,
    };
    let page = PageParams {
        page: params.page,
        limit: params.limit,
    }
    .resolve();
    let filter = AppointmentFilter {
        status,
        user_id: params.user_id.as_deref(),
        start_date: params.start_date,
        end_date: params.end_date,
    };
    let (appointments, total) = Appointments::new(&state.db).list(filter, page).await?;

    Ok(api::ok(
        "Appointments retrieved successfully",
        json!({
            "appointments": appointments,
            "pagination": Pagination::new(page, total),
        }),
    ))
}

pub async fn my_appointments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<PageParams>,
) -> AppResult<Response> {
    let page = params.resolve();
    let filter = AppointmentFilter {
        user_id: Some(&auth.id),
        ..Default::default()
    };
    let (appointments, total) = Appointments::new(&state.db).list(filter, page).await?;

    Ok(api::ok(
        "Appointments retrieved successfully",
        json!({
            "appointments": appointments,
            "pagination": Pagination::new(page, total),
        }),
    ))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let appointment = Appointments::new(&state.db)
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

    if !auth.is_admin() && appointment.user_id != auth.id {
        return Err(AppError::Forbidden);
    }

    Ok(api::ok("Appointment retrieved successfully", appointment))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAppointmentRequest>,
) -> AppResult<Response> {
    validate_payload(&payload)?;

    let appointments = Appointments::new(&state.db);
    let existing = appointments
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;
    if existing.user_id != auth.id {
        return Err(AppError::Forbidden);
    }

    let appointment = appointments
        .update(&id, payload.subject, payload.details, payload.date)
        .await?;
    Ok(api::ok("Appointment updated successfully", appointment))
}

pub async fn update_appointment_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Response> {
    auth.require_admin()?;

    let status = parse_status(&payload.status)?;
    let appointment = Appointments::new(&state.db).update_status(&id, status).await?;
    Ok(api::ok("Appointment status updated successfully", appointment))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let appointments = Appointments::new(&state.db);
    let existing = appointments
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;
    if !auth.is_admin() && existing.user_id != auth.id {
        return Err(AppError::Forbidden);
    }

    appointments.delete(&id).await?;
    Ok(api::ok_message("Appointment deleted successfully"))
}

pub async fn stats(State(state): State<AppState>, auth: AuthUser) -> AppResult<Response> {
    auth.require_admin()?;
    let stats = Appointments::new(&state.db).stats().await?;
    Ok(api::ok("Appointment statistics retrieved successfully", stats))
}
