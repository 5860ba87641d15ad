use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::AgencyAuth,
    error::ServiceError,
    model::schedule::WorkSchedule,
    service::schedule::ScheduleResolver,
    store::schedule::{NewScheduleData, ScheduleChanges, SqlScheduleStore},
    utils::time::parse_time_of_day,
};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    #[schema(example = "Morning shift")]
    pub name: String,
    #[schema(example = json!([1, 2, 3, 4, 5]))]
    pub days_of_week: Vec<u8>,
    #[schema(example = "09:00")]
    pub entry_time: String,
    #[schema(example = "17:00")]
    pub exit_time: String,
    #[schema(example = 10)]
    #[serde(default)]
    pub grace_period_minutes: u32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub assigned_user_ids: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    pub name: Option<String>,
    pub days_of_week: Option<Vec<u8>>,
    pub entry_time: Option<String>,
    pub exit_time: Option<String>,
    pub grace_period_minutes: Option<u32>,
    pub is_default: Option<bool>,
    pub assigned_user_ids: Option<Vec<String>>,
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ApplicableScheduleQuery {
    pub agency_id: String,
    pub user_id: Option<String>,
    #[param(example = "2026-03-04", value_type = String)]
    pub date: NaiveDate,
}

fn validate_days_of_week(days: &[u8]) -> Result<(), ServiceError> {
    if days.is_empty() {
        return Err(ServiceError::Validation(
            "daysOfWeek must not be empty".to_string(),
        ));
    }
    let mut seen = [false; 8];
    for &day in days {
        if !(1..=7).contains(&day) {
            return Err(ServiceError::Validation(
                "daysOfWeek values must be 1 (Monday) to 7 (Sunday)".to_string(),
            ));
        }
        if seen[day as usize] {
            return Err(ServiceError::Validation(
                "daysOfWeek must not contain duplicates".to_string(),
            ));
        }
        seen[day as usize] = true;
    }
    Ok(())
}

fn validate_time_string(text: &str, field: &str) -> Result<(), ServiceError> {
    parse_time_of_day(text, Utc::now())
        .map(|_| ())
        .map_err(|_| ServiceError::Validation(format!("{field} must be a HH:MM time")))
}

fn validate_assigned_users(user_ids: &[String]) -> Result<(), ServiceError> {
    for user_id in user_ids {
        Uuid::parse_str(user_id).map_err(|_| {
            ServiceError::Validation(format!("assignedUserIds contains invalid id '{user_id}'"))
        })?;
    }
    Ok(())
}

/// Create a work schedule for the authenticated agency
#[utoipa::path(
    post,
    path = "/schedules",
    request_body = CreateScheduleRequest,
    responses(
        (status = 201, description = "Schedule created", body = WorkSchedule),
        (status = 400, description = "Invalid schedule definition"),
        (status = 409, description = "Schedule name already used by this agency")
    ),
    tag = "Schedule"
)]
pub async fn create_schedule(
    agency: AgencyAuth,
    store: web::Data<SqlScheduleStore>,
    payload: web::Json<CreateScheduleRequest>,
) -> Result<HttpResponse, ServiceError> {
    let payload = payload.into_inner();
    validate_days_of_week(&payload.days_of_week)?;
    validate_time_string(&payload.entry_time, "entryTime")?;
    validate_time_string(&payload.exit_time, "exitTime")?;
    validate_assigned_users(&payload.assigned_user_ids)?;

    let schedule = store
        .create(
            &agency.agency_id,
            NewScheduleData {
                name: payload.name,
                days_of_week: payload.days_of_week,
                entry_time: payload.entry_time,
                exit_time: payload.exit_time,
                grace_period_minutes: payload.grace_period_minutes,
                is_default: payload.is_default,
                assigned_user_ids: payload.assigned_user_ids,
            },
        )
        .await?;

    tracing::info!(schedule_id = %schedule.id, agency_id = %schedule.agency_id, "schedule created");
    Ok(HttpResponse::Created().json(schedule))
}

/// List the agency's schedules, default first
#[utoipa::path(
    get,
    path = "/schedules",
    responses(
        (status = 200, description = "Schedules of the agency", body = Vec<WorkSchedule>)
    ),
    tag = "Schedule"
)]
pub async fn list_schedules(
    agency: AgencyAuth,
    store: web::Data<SqlScheduleStore>,
) -> Result<HttpResponse, ServiceError> {
    let schedules = store.list(&agency.agency_id).await?;
    Ok(HttpResponse::Ok().json(schedules))
}

/// Update a schedule owned by the agency
#[utoipa::path(
    put,
    path = "/schedules/{id}",
    request_body = UpdateScheduleRequest,
    responses(
        (status = 200, description = "Schedule updated", body = WorkSchedule),
        (status = 400, description = "Invalid update or last default protection"),
        (status = 404, description = "Schedule not found for this agency")
    ),
    tag = "Schedule"
)]
pub async fn update_schedule(
    agency: AgencyAuth,
    store: web::Data<SqlScheduleStore>,
    path: web::Path<String>,
    payload: web::Json<UpdateScheduleRequest>,
) -> Result<HttpResponse, ServiceError> {
    let schedule_id = path.into_inner();
    let payload = payload.into_inner();

    if let Some(days) = &payload.days_of_week {
        validate_days_of_week(days)?;
    }
    if let Some(entry_time) = &payload.entry_time {
        validate_time_string(entry_time, "entryTime")?;
    }
    if let Some(exit_time) = &payload.exit_time {
        validate_time_string(exit_time, "exitTime")?;
    }
    if let Some(assigned) = &payload.assigned_user_ids {
        validate_assigned_users(assigned)?;
    }

    let changes = ScheduleChanges {
        name: payload.name,
        days_of_week: payload.days_of_week,
        entry_time: payload.entry_time,
        exit_time: payload.exit_time,
        grace_period_minutes: payload.grace_period_minutes,
        is_default: payload.is_default,
        assigned_user_ids: payload.assigned_user_ids,
    };
    if changes.is_empty() {
        return Err(ServiceError::Validation(
            "No fields provided for update".to_string(),
        ));
    }

    let schedule = store.update(&agency.agency_id, &schedule_id, changes).await?;
    tracing::info!(schedule_id = %schedule.id, agency_id = %schedule.agency_id, "schedule updated");
    Ok(HttpResponse::Ok().json(schedule))
}

/// Delete a non-default schedule owned by the agency
#[utoipa::path(
    delete,
    path = "/schedules/{id}",
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 400, description = "The default schedule cannot be deleted"),
        (status = 404, description = "Schedule not found for this agency")
    ),
    tag = "Schedule"
)]
pub async fn delete_schedule(
    agency: AgencyAuth,
    store: web::Data<SqlScheduleStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let schedule_id = path.into_inner();
    store.delete(&agency.agency_id, &schedule_id).await?;
    tracing::info!(schedule_id = %schedule_id, agency_id = %agency.agency_id, "schedule deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Which schedule governs a user (or the agency default) on a date
#[utoipa::path(
    get,
    path = "/schedules/applicable",
    params(ApplicableScheduleQuery),
    responses(
        (status = 200, description = "The applicable schedule", body = WorkSchedule),
        (status = 404, description = "No applicable schedule for that date")
    ),
    tag = "Schedule"
)]
pub async fn applicable_schedule(
    resolver: web::Data<ScheduleResolver>,
    query: web::Query<ApplicableScheduleQuery>,
) -> Result<HttpResponse, ServiceError> {
    Uuid::parse_str(&query.agency_id)
        .map_err(|_| ServiceError::Validation("Invalid agencyId.".to_string()))?;
    if let Some(user_id) = &query.user_id {
        Uuid::parse_str(user_id)
            .map_err(|_| ServiceError::Validation("Invalid userId.".to_string()))?;
    }

    let schedule = resolver
        .resolve_applicable(&query.agency_id, query.user_id.as_deref(), query.date)
        .await
        .map_err(|e| match e {
            // As a standalone lookup the business condition is a 404.
            ServiceError::NoApplicableSchedule => ServiceError::NotFound(
                "No applicable work schedule for the given date and user.".to_string(),
            ),
            other => other,
        })?;

    Ok(HttpResponse::Ok().json(schedule))
}
