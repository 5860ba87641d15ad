use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{AgencyAuth, UserAuth},
    error::ServiceError,
    model::attendance::{AttendanceAction, AttendanceMethod, AttendanceRecord},
    service::attendance::{AttendanceService, HistoryFilter, MarkAttendance},
};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualAttendanceRequest {
    #[schema(example = "e4b9f7a0-6f54-4f2c-8a3b-1f2d3c4e5f60")]
    pub user_id: String,
    #[serde(rename = "type")]
    #[schema(example = "check-in")]
    pub action: AttendanceAction,
    pub notes: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct GenerateQrQuery {
    #[serde(rename = "type")]
    #[param(example = "check-in")]
    pub action: AttendanceAction,
}

#[derive(Deserialize, IntoParams)]
pub struct MarkQrQuery {
    pub token: String,
    #[serde(rename = "type")]
    #[param(example = "check-in")]
    pub action: AttendanceAction,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AgencyHistoryQuery {
    #[param(example = "2026-03-01", value_type = String)]
    pub start_date: NaiveDate,
    #[param(example = "2026-03-31", value_type = String)]
    pub end_date: NaiveDate,
    /// Optional filter on a single user of the agency
    pub user_id: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct UserHistoryQuery {
    #[param(example = "2026-03-01", value_type = String)]
    pub start_date: NaiveDate,
    #[param(example = "2026-03-31", value_type = String)]
    pub end_date: NaiveDate,
}

fn require_uuid(value: &str, field: &str) -> Result<(), ServiceError> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ServiceError::Validation(format!("Invalid {field}.")))
}

/// Manual marking, entered by the agency for one of its users
#[utoipa::path(
    post,
    path = "/attendance/manual",
    request_body = ManualAttendanceRequest,
    responses(
        (status = 201, description = "Check-in recorded", body = AttendanceRecord),
        (status = 200, description = "Check-out recorded", body = AttendanceRecord),
        (status = 400, description = "Business rule violation or bad input"),
        (status = 409, description = "Duplicate check-in or check-out"),
        (status = 502, description = "Upstream service unavailable")
    ),
    tag = "Attendance"
)]
pub async fn mark_manual(
    agency: AgencyAuth,
    service: web::Data<AttendanceService>,
    payload: web::Json<ManualAttendanceRequest>,
) -> Result<HttpResponse, ServiceError> {
    require_uuid(&payload.user_id, "userId")?;

    let action = payload.action;
    let record = service
        .mark_attendance(MarkAttendance {
            user_id: payload.user_id.clone(),
            agency_id: agency.agency_id,
            method: AttendanceMethod::Manual,
            action,
            now: Utc::now(),
            notes: payload.notes.clone(),
        })
        .await?;

    let response = match action {
        AttendanceAction::CheckIn => HttpResponse::Created().json(record),
        AttendanceAction::CheckOut => HttpResponse::Ok().json(record),
    };
    Ok(response)
}

/// Issue a QR link binding this agency to a check-in or check-out
#[utoipa::path(
    post,
    path = "/attendance/qr/generate",
    params(GenerateQrQuery),
    responses(
        (status = 200, description = "QR link generated", body = Object, example = json!({
            "url": "https://attendance.example.com/attendance/qr?token=...&type=check-in"
        }))
    ),
    tag = "Attendance"
)]
pub async fn generate_qr(
    agency: AgencyAuth,
    service: web::Data<AttendanceService>,
    query: web::Query<GenerateQrQuery>,
) -> Result<HttpResponse, ServiceError> {
    let url = service.generate_qr_link(&agency.agency_id, query.action)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "url": url })))
}

/// Marking via a scanned QR token
#[utoipa::path(
    get,
    path = "/attendance/qr",
    params(MarkQrQuery),
    responses(
        (status = 201, description = "QR check-in recorded"),
        (status = 200, description = "QR check-out recorded"),
        (status = 400, description = "Action does not match the token"),
        (status = 401, description = "Expired or invalid token")
    ),
    tag = "Attendance"
)]
pub async fn mark_qr(
    user: UserAuth,
    service: web::Data<AttendanceService>,
    query: web::Query<MarkQrQuery>,
) -> Result<HttpResponse, ServiceError> {
    let record = service
        .mark_by_qr(&user.user_id, &query.token, query.action, Utc::now())
        .await?;

    let (mut response, message) = match query.action {
        AttendanceAction::CheckIn => (HttpResponse::Created(), "QR check-in recorded"),
        AttendanceAction::CheckOut => (HttpResponse::Ok(), "QR check-out recorded"),
    };
    Ok(response.json(serde_json::json!({
        "success": true,
        "data": record,
        "message": message
    })))
}

/// Today's record for the calling user, if any
#[utoipa::path(
    get,
    path = "/attendance/today",
    responses(
        (status = 200, description = "Today's record, or a message when none exists")
    ),
    tag = "Attendance"
)]
pub async fn today_status(
    user: UserAuth,
    service: web::Data<AttendanceService>,
) -> Result<HttpResponse, ServiceError> {
    match service.today_status(&user.user_id, Utc::now()).await? {
        Some(record) => Ok(HttpResponse::Ok().json(record)),
        None => Ok(HttpResponse::Ok().json(serde_json::json!({
            "message": "No attendance record for today."
        }))),
    }
}

/// Agency-scoped history, optionally filtered to one user
#[utoipa::path(
    get,
    path = "/attendance/history/agency",
    params(AgencyHistoryQuery),
    responses(
        (status = 200, description = "Records in range, newest first", body = Vec<AttendanceRecord>)
    ),
    tag = "Attendance"
)]
pub async fn agency_history(
    agency: AgencyAuth,
    service: web::Data<AttendanceService>,
    query: web::Query<AgencyHistoryQuery>,
) -> Result<HttpResponse, ServiceError> {
    if let Some(user_id) = &query.user_id {
        require_uuid(user_id, "userId")?;
    }

    let records = service
        .history(HistoryFilter {
            agency_id: Some(agency.agency_id),
            user_id: query.user_id.clone(),
            start_date: query.start_date,
            end_date: query.end_date,
        })
        .await?;
    Ok(HttpResponse::Ok().json(records))
}

/// History of the calling user
#[utoipa::path(
    get,
    path = "/attendance/history/user",
    params(UserHistoryQuery),
    responses(
        (status = 200, description = "Records in range, newest first", body = Vec<AttendanceRecord>)
    ),
    tag = "Attendance"
)]
pub async fn user_history(
    user: UserAuth,
    service: web::Data<AttendanceService>,
    query: web::Query<UserHistoryQuery>,
) -> Result<HttpResponse, ServiceError> {
    let records = service
        .history(HistoryFilter {
            agency_id: None,
            user_id: Some(user.user_id),
            start_date: query.start_date,
            end_date: query.end_date,
        })
        .await?;
    Ok(HttpResponse::Ok().json(records))
}
