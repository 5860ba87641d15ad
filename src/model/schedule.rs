use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// A work schedule owned by one agency. `days_of_week` uses ISO numbering
/// (Monday=1 .. Sunday=7). At most one schedule per agency is the default.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkSchedule {
    pub id: String,
    pub agency_id: String,
    #[schema(example = "Morning shift")]
    pub name: String,
    #[schema(example = json!([1, 2, 3, 4, 5]))]
    pub days_of_week: Vec<u8>,
    #[schema(example = "09:00")]
    pub entry_time: String,
    #[schema(example = "17:00")]
    pub exit_time: String,
    #[schema(example = 10)]
    pub grace_period_minutes: u32,
    pub is_default: bool,
    pub assigned_user_ids: Vec<String>,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub updated_at: DateTime<Utc>,
}
