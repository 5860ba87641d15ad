use crate::api::attendance::ManualAttendanceRequest;
use crate::api::schedule::{CreateScheduleRequest, UpdateScheduleRequest};
use crate::model::attendance::{
    AttendanceAction, AttendanceMethod, AttendanceRecord, AttendanceStatus,
};
use crate::model::schedule::WorkSchedule;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Service API",
        version = "1.0.0",
        description = r#"
## Attendance tracking for agencies

Agencies define work schedules and mark attendance for their users; users
check in and out themselves by scanning agency-issued QR codes.

### Key Features
- **Attendance Marking**
  - Manual (agency-entered), QR and NFC check-in/check-out
  - On-time/late classification against the applicable schedule and its grace period
- **Work Schedules**
  - Agency default plus per-user overrides, per ISO weekday
- **History & Status**
  - Daily status and date-range history for agencies and users

### Security
Requests are authenticated by the API gateway, which forwards the verified
identity in the `x-agency-id` / `x-user-id` headers.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::mark_manual,
        crate::api::attendance::generate_qr,
        crate::api::attendance::mark_qr,
        crate::api::attendance::today_status,
        crate::api::attendance::agency_history,
        crate::api::attendance::user_history,

        crate::api::schedule::create_schedule,
        crate::api::schedule::list_schedules,
        crate::api::schedule::update_schedule,
        crate::api::schedule::delete_schedule,
        crate::api::schedule::applicable_schedule
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceAction,
            AttendanceMethod,
            AttendanceStatus,
            ManualAttendanceRequest,
            WorkSchedule,
            CreateScheduleRequest,
            UpdateScheduleRequest
        )
    ),
    tags(
        (name = "Attendance", description = "Attendance marking and history APIs"),
        (name = "Schedule", description = "Work schedule management APIs"),
    )
)]
pub struct ApiDoc;

/// Paths are documented relative to the API prefix; the prefix itself comes
/// from configuration, so it is attached as the server entry at startup.
pub fn openapi_for_prefix(prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![
        utoipa::openapi::ServerBuilder::new().url(prefix).build(),
    ]);
    doc
}
