use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Channel used to record a check-in/out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceMethod {
    Manual,
    Qr,
    Nfc,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    OnTime,
    Late,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceAction {
    CheckIn,
    CheckOut,
}

/// One record per (user, calendar date). `date` is the UTC day, the partition key.
/// The schedule entry/exit strings are frozen at check-in time for audit.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: String,
    pub agency_id: String,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "2026-01-01T09:05:00Z", format = "date-time", value_type = String)]
    pub check_in_time: DateTime<Utc>,
    #[schema(example = "2026-01-01T17:30:00Z", format = "date-time", value_type = String)]
    pub check_out_time: Option<DateTime<Utc>>,
    pub status: Option<AttendanceStatus>,
    pub method_in: AttendanceMethod,
    pub method_out: Option<AttendanceMethod>,
    #[schema(example = "09:00")]
    pub schedule_entry_time: String,
    #[schema(example = "17:00")]
    pub schedule_exit_time: String,
    pub notes: Option<String>,
}

/// Everything needed to create a record on first check-in. The id is
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub user_id: String,
    pub agency_id: String,
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub status: Option<AttendanceStatus>,
    pub method_in: AttendanceMethod,
    pub schedule_entry_time: String,
    pub schedule_exit_time: String,
    pub notes: Option<String>,
}
