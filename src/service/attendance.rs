use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    error::ServiceError,
    model::attendance::{
        AttendanceAction, AttendanceMethod, AttendanceRecord, NewAttendanceRecord,
    },
    service::{qr::QrTokens, schedule::ScheduleResolver},
    utils::time::{calendar_date, classify_check_in, parse_time_of_day},
};

/// Confirms that a user exists and belongs to the agency. Only an explicit
/// affirmative counts; transport failures surface as `ServiceError::Upstream`.
#[async_trait]
pub trait UserValidator: Send + Sync {
    async fn validate(&self, user_id: &str, agency_id: &str) -> Result<bool, ServiceError>;
}

/// Persistence for attendance records. `insert` must be backed by a unique
/// (user_id, date) key and report a key violation as
/// `ServiceError::DuplicateCheckIn`, so concurrent check-ins for the same
/// user and day have exactly one winner. `set_check_out` must only close an
/// open record and report an already-closed one as
/// `ServiceError::DuplicateCheckOut`; a closed record is immutable.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_by_user_and_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, ServiceError>;

    async fn insert(&self, record: NewAttendanceRecord) -> Result<AttendanceRecord, ServiceError>;

    async fn set_check_out(
        &self,
        id: &str,
        check_out: DateTime<Utc>,
        method: AttendanceMethod,
        notes: Option<String>,
    ) -> Result<AttendanceRecord, ServiceError>;

    async fn history(&self, filter: &HistoryFilter) -> Result<Vec<AttendanceRecord>, ServiceError>;
}

/// Date range is inclusive on both ends. At least one of agency/user must be
/// present; results come back date descending, then check-in descending.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub agency_id: Option<String>,
    pub user_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct MarkAttendance {
    pub user_id: String,
    pub agency_id: String,
    pub method: AttendanceMethod,
    pub action: AttendanceAction,
    pub now: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Attendance marking core. Holds only injected collaborator handles; one
/// value is constructed at startup and shared across requests.
pub struct AttendanceService {
    validator: Arc<dyn UserValidator>,
    schedules: ScheduleResolver,
    records: Arc<dyn AttendanceStore>,
    qr: QrTokens,
    qr_base_url: String,
}

impl AttendanceService {
    pub fn new(
        validator: Arc<dyn UserValidator>,
        schedules: ScheduleResolver,
        records: Arc<dyn AttendanceStore>,
        qr: QrTokens,
        qr_base_url: String,
    ) -> Self {
        Self {
            validator,
            schedules,
            records,
            qr,
            qr_base_url,
        }
    }

    /// Per-user-per-day lifecycle: NoRecord -> CheckedIn -> CheckedOut.
    /// Any failure aborts with no partial write; the record is only touched
    /// in the terminal step.
    pub async fn mark_attendance(
        &self,
        cmd: MarkAttendance,
    ) -> Result<AttendanceRecord, ServiceError> {
        let MarkAttendance {
            user_id,
            agency_id,
            method,
            action,
            now,
            notes,
        } = cmd;
        let date = calendar_date(now);

        tracing::info!(%user_id, %agency_id, %action, %method, time = %now, "marking attendance");

        // 1. The user must be explicitly confirmed by the user service.
        if !self.validator.validate(&user_id, &agency_id).await? {
            tracing::warn!(%user_id, %agency_id, "user rejected by validator");
            return Err(ServiceError::InvalidUser { user_id, agency_id });
        }

        // 2. Which schedule governs this user today.
        let schedule = self
            .schedules
            .resolve_applicable(&agency_id, Some(&user_id), date)
            .await?;

        // 3. Reconstruct the schedule times on today's calendar day. A stored
        //    string that fails to parse is corrupted configuration, not user error.
        let entry = parse_time_of_day(&schedule.entry_time, now).map_err(|_| {
            ServiceError::Configuration(format!(
                "schedule {} has malformed entry time '{}'",
                schedule.id, schedule.entry_time
            ))
        })?;
        parse_time_of_day(&schedule.exit_time, now).map_err(|_| {
            ServiceError::Configuration(format!(
                "schedule {} has malformed exit time '{}'",
                schedule.id, schedule.exit_time
            ))
        })?;

        // 4. Today's record, if any.
        let existing = self.records.find_by_user_and_date(&user_id, date).await?;

        // 5. Branch on the requested transition.
        match action {
            AttendanceAction::CheckIn => {
                if existing.is_some() {
                    return Err(ServiceError::DuplicateCheckIn);
                }

                let status =
                    classify_check_in(now, Some(entry), schedule.grace_period_minutes as i64);

                let record = self
                    .records
                    .insert(NewAttendanceRecord {
                        user_id: user_id.clone(),
                        agency_id,
                        date,
                        check_in_time: now,
                        status,
                        method_in: method,
                        schedule_entry_time: schedule.entry_time.clone(),
                        schedule_exit_time: schedule.exit_time.clone(),
                        notes,
                    })
                    .await?;

                tracing::info!(record_id = %record.id, %user_id, status = ?record.status, "check-in recorded");
                Ok(record)
            }
            AttendanceAction::CheckOut => {
                let Some(existing) = existing else {
                    return Err(ServiceError::CheckOutBeforeCheckIn);
                };
                if existing.check_out_time.is_some() {
                    return Err(ServiceError::DuplicateCheckOut);
                }

                let record = self
                    .records
                    .set_check_out(&existing.id, now, method, notes)
                    .await?;

                tracing::info!(record_id = %record.id, %user_id, "check-out recorded");
                Ok(record)
            }
        }
    }

    /// Marks attendance from a scanned QR token. The requested action must
    /// match the action the token was issued for.
    pub async fn mark_by_qr(
        &self,
        user_id: &str,
        token: &str,
        requested: AttendanceAction,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, ServiceError> {
        let claims = self.qr.verify(token)?;
        if claims.action != requested {
            tracing::warn!(user_id, requested = %requested, bound = %claims.action, "QR action mismatch");
            return Err(ServiceError::QrActionMismatch);
        }

        self.mark_attendance(MarkAttendance {
            user_id: user_id.to_string(),
            agency_id: claims.agency_id,
            method: AttendanceMethod::Qr,
            action: requested,
            now,
            notes: None,
        })
        .await
    }

    /// Issues a QR token for the agency and wraps it in a distributable URL.
    pub fn generate_qr_link(
        &self,
        agency_id: &str,
        action: AttendanceAction,
    ) -> Result<String, ServiceError> {
        let token = self.qr.issue(agency_id, action)?;
        Ok(format!(
            "{}/attendance/qr?token={}&type={}",
            self.qr_base_url.trim_end_matches('/'),
            token,
            action
        ))
    }

    pub async fn today_status(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AttendanceRecord>, ServiceError> {
        self.records
            .find_by_user_and_date(user_id, calendar_date(now))
            .await
    }

    pub async fn history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<AttendanceRecord>, ServiceError> {
        if filter.agency_id.is_none() && filter.user_id.is_none() {
            return Err(ServiceError::Validation(
                "agencyId or userId is required for history lookups".to_string(),
            ));
        }
        if filter.end_date < filter.start_date {
            return Err(ServiceError::Validation(
                "endDate must be on or after startDate".to_string(),
            ));
        }

        self.records.history(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::AttendanceStatus;
    use crate::service::schedule::tests::{InMemoryScheduleStore, schedule};
    use std::sync::Mutex;
    use uuid::Uuid;

    const USER: &str = "u1";
    const AGENCY: &str = "a1";

    enum Verdict {
        Valid,
        Invalid,
        Unreachable,
    }

    struct FakeValidator {
        verdict: Verdict,
    }

    #[async_trait]
    impl UserValidator for FakeValidator {
        async fn validate(&self, _user_id: &str, _agency_id: &str) -> Result<bool, ServiceError> {
            match self.verdict {
                Verdict::Valid => Ok(true),
                Verdict::Invalid => Ok(false),
                Verdict::Unreachable => {
                    Err(ServiceError::Upstream("user service: connection refused".into()))
                }
            }
        }
    }

    #[derive(Default)]
    struct InMemoryAttendanceStore {
        records: Mutex<Vec<AttendanceRecord>>,
        // When set, reads serve this snapshot instead of current state, to
        // replay a lookup that raced an in-flight write.
        stale_read: Mutex<Option<AttendanceRecord>>,
    }

    impl InMemoryAttendanceStore {
        fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AttendanceStore for InMemoryAttendanceStore {
        async fn find_by_user_and_date(
            &self,
            user_id: &str,
            date: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, ServiceError> {
            if let Some(snapshot) = self.stale_read.lock().unwrap().clone() {
                return Ok(Some(snapshot));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.user_id == user_id && r.date == date)
                .cloned())
        }

        async fn insert(
            &self,
            new: NewAttendanceRecord,
        ) -> Result<AttendanceRecord, ServiceError> {
            let mut records = self.records.lock().unwrap();
            // Mirrors the store's unique (user_id, date) key.
            if records
                .iter()
                .any(|r| r.user_id == new.user_id && r.date == new.date)
            {
                return Err(ServiceError::DuplicateCheckIn);
            }
            let record = AttendanceRecord {
                id: Uuid::new_v4().to_string(),
                user_id: new.user_id,
                agency_id: new.agency_id,
                date: new.date,
                check_in_time: new.check_in_time,
                check_out_time: None,
                status: new.status,
                method_in: new.method_in,
                method_out: None,
                schedule_entry_time: new.schedule_entry_time,
                schedule_exit_time: new.schedule_exit_time,
                notes: new.notes,
            };
            records.push(record.clone());
            Ok(record)
        }

        async fn set_check_out(
            &self,
            id: &str,
            check_out: DateTime<Utc>,
            method: AttendanceMethod,
            notes: Option<String>,
        ) -> Result<AttendanceRecord, ServiceError> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ServiceError::NotFound("attendance record not found".into()))?;
            // Mirrors the store's conditional update (check_out_time IS NULL).
            if record.check_out_time.is_some() {
                return Err(ServiceError::DuplicateCheckOut);
            }
            record.check_out_time = Some(check_out);
            record.method_out = Some(method);
            if notes.is_some() {
                record.notes = notes;
            }
            Ok(record.clone())
        }

        async fn history(
            &self,
            filter: &HistoryFilter,
        ) -> Result<Vec<AttendanceRecord>, ServiceError> {
            let mut out: Vec<AttendanceRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.date >= filter.start_date && r.date <= filter.end_date)
                .filter(|r| filter.user_id.as_deref().map_or(true, |u| r.user_id == u))
                .filter(|r| filter.agency_id.as_deref().map_or(true, |a| r.agency_id == a))
                .cloned()
                .collect();
            out.sort_by(|a, b| (b.date, b.check_in_time).cmp(&(a.date, a.check_in_time)));
            Ok(out)
        }
    }

    struct Fixture {
        service: AttendanceService,
        records: Arc<InMemoryAttendanceStore>,
        qr: QrTokens,
    }

    fn fixture_with(
        verdict: Verdict,
        schedules: Vec<crate::model::schedule::WorkSchedule>,
    ) -> Fixture {
        let records = Arc::new(InMemoryAttendanceStore::default());
        let qr = QrTokens::new("test-secret", 3600);
        let service = AttendanceService::new(
            Arc::new(FakeValidator { verdict }),
            ScheduleResolver::new(Arc::new(InMemoryScheduleStore { schedules })),
            records.clone(),
            qr.clone(),
            "https://attendance.example.com".to_string(),
        );
        Fixture { service, records, qr }
    }

    // Entry "09:00", grace 10, all seven days so any test date applies.
    fn fixture(verdict: Verdict) -> Fixture {
        fixture_with(
            verdict,
            vec![schedule(
                "default",
                AGENCY,
                &[1, 2, 3, 4, 5, 6, 7],
                true,
                &[],
                "2026-01-01T00:00:00Z",
            )],
        )
    }

    fn instant(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn mark(action: AttendanceAction, now: &str) -> MarkAttendance {
        MarkAttendance {
            user_id: USER.to_string(),
            agency_id: AGENCY.to_string(),
            method: AttendanceMethod::Manual,
            action,
            now: instant(now),
            notes: None,
        }
    }

    #[actix_web::test]
    async fn full_day_lifecycle() {
        let f = fixture(Verdict::Valid);

        // Check-in at 09:09 with grace 10 is on time.
        let record = f
            .service
            .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T09:09:00Z"))
            .await
            .unwrap();
        assert_eq!(record.status, Some(AttendanceStatus::OnTime));
        assert_eq!(record.method_in, AttendanceMethod::Manual);
        assert_eq!(record.schedule_entry_time, "09:00");
        assert_eq!(record.schedule_exit_time, "17:00");
        assert!(record.check_out_time.is_none());

        // Second check-in the same day is a duplicate.
        assert!(matches!(
            f.service
                .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T10:00:00Z"))
                .await,
            Err(ServiceError::DuplicateCheckIn)
        ));

        // Check-out completes the record.
        let record = f
            .service
            .mark_attendance(mark(AttendanceAction::CheckOut, "2026-03-04T17:30:00Z"))
            .await
            .unwrap();
        assert_eq!(record.check_out_time, Some(instant("2026-03-04T17:30:00Z")));
        assert_eq!(record.method_out, Some(AttendanceMethod::Manual));

        // And is terminal.
        assert!(matches!(
            f.service
                .mark_attendance(mark(AttendanceAction::CheckOut, "2026-03-04T18:00:00Z"))
                .await,
            Err(ServiceError::DuplicateCheckOut)
        ));
        assert_eq!(f.records.len(), 1);
    }

    #[actix_web::test]
    async fn racing_check_out_loses_to_the_store_guard() {
        let f = fixture(Verdict::Valid);
        f.service
            .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T09:00:00Z"))
            .await
            .unwrap();
        let date = calendar_date(instant("2026-03-04T09:00:00Z"));
        let open = f
            .records
            .find_by_user_and_date(USER, date)
            .await
            .unwrap()
            .unwrap();

        // First check-out lands.
        f.service
            .mark_attendance(mark(AttendanceAction::CheckOut, "2026-03-04T17:00:00Z"))
            .await
            .unwrap();

        // The second caller read the record before the first write landed,
        // so it passes the in-service already-checked-out test. The store
        // must still reject the write.
        *f.records.stale_read.lock().unwrap() = Some(open);
        let mut second = mark(AttendanceAction::CheckOut, "2026-03-04T18:00:00Z");
        second.method = AttendanceMethod::Qr;
        assert!(matches!(
            f.service.mark_attendance(second).await,
            Err(ServiceError::DuplicateCheckOut)
        ));

        // The first writer's check-out is untouched.
        *f.records.stale_read.lock().unwrap() = None;
        let record = f
            .records
            .find_by_user_and_date(USER, date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.check_out_time, Some(instant("2026-03-04T17:00:00Z")));
        assert_eq!(record.method_out, Some(AttendanceMethod::Manual));
    }

    #[actix_web::test]
    async fn late_check_in_past_grace() {
        let f = fixture(Verdict::Valid);
        let record = f
            .service
            .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T09:11:00Z"))
            .await
            .unwrap();
        assert_eq!(record.status, Some(AttendanceStatus::Late));
    }

    #[actix_web::test]
    async fn check_out_requires_check_in() {
        let f = fixture(Verdict::Valid);
        assert!(matches!(
            f.service
                .mark_attendance(mark(AttendanceAction::CheckOut, "2026-03-04T17:00:00Z"))
                .await,
            Err(ServiceError::CheckOutBeforeCheckIn)
        ));
        assert_eq!(f.records.len(), 0);
    }

    #[actix_web::test]
    async fn invalid_user_aborts_before_any_write() {
        let f = fixture(Verdict::Invalid);
        assert!(matches!(
            f.service
                .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T09:00:00Z"))
                .await,
            Err(ServiceError::InvalidUser { .. })
        ));
        assert_eq!(f.records.len(), 0);
    }

    #[actix_web::test]
    async fn unreachable_validator_is_an_upstream_fault_not_invalid_user() {
        let f = fixture(Verdict::Unreachable);
        assert!(matches!(
            f.service
                .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T09:00:00Z"))
                .await,
            Err(ServiceError::Upstream(_))
        ));
        assert_eq!(f.records.len(), 0);
    }

    #[actix_web::test]
    async fn no_applicable_schedule_writes_nothing() {
        let f = fixture_with(Verdict::Valid, vec![]);
        assert!(matches!(
            f.service
                .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T09:00:00Z"))
                .await,
            Err(ServiceError::NoApplicableSchedule)
        ));
        assert_eq!(f.records.len(), 0);
    }

    #[actix_web::test]
    async fn malformed_stored_time_is_a_configuration_fault() {
        let mut bad = schedule(
            "default",
            AGENCY,
            &[1, 2, 3, 4, 5, 6, 7],
            true,
            &[],
            "2026-01-01T00:00:00Z",
        );
        bad.entry_time = "9am".to_string();
        let f = fixture_with(Verdict::Valid, vec![bad]);

        assert!(matches!(
            f.service
                .mark_attendance(mark(AttendanceAction::CheckIn, "2026-03-04T09:00:00Z"))
                .await,
            Err(ServiceError::Configuration(_))
        ));
        assert_eq!(f.records.len(), 0);
    }

    #[actix_web::test]
    async fn check_out_keeps_existing_notes_unless_new_ones_are_given() {
        let f = fixture(Verdict::Valid);
        let mut check_in = mark(AttendanceAction::CheckIn, "2026-03-04T09:00:00Z");
        check_in.notes = Some("came in early".to_string());
        f.service.mark_attendance(check_in).await.unwrap();

        let record = f
            .service
            .mark_attendance(mark(AttendanceAction::CheckOut, "2026-03-04T17:00:00Z"))
            .await
            .unwrap();
        assert_eq!(record.notes.as_deref(), Some("came in early"));
    }

    #[actix_web::test]
    async fn qr_token_bound_to_other_action_is_rejected() {
        let f = fixture(Verdict::Valid);
        let token = f.qr.issue(AGENCY, AttendanceAction::CheckIn).unwrap();

        assert!(matches!(
            f.service
                .mark_by_qr(USER, &token, AttendanceAction::CheckOut, instant("2026-03-04T09:00:00Z"))
                .await,
            Err(ServiceError::QrActionMismatch)
        ));
        assert_eq!(f.records.len(), 0);
    }

    #[actix_web::test]
    async fn qr_check_in_uses_the_token_agency_and_qr_method() {
        let f = fixture(Verdict::Valid);
        let token = f.qr.issue(AGENCY, AttendanceAction::CheckIn).unwrap();

        let record = f
            .service
            .mark_by_qr(USER, &token, AttendanceAction::CheckIn, instant("2026-03-04T09:00:00Z"))
            .await
            .unwrap();
        assert_eq!(record.agency_id, AGENCY);
        assert_eq!(record.method_in, AttendanceMethod::Qr);
    }

    #[actix_web::test]
    async fn expired_qr_token_aborts_marking() {
        let f = fixture(Verdict::Valid);
        let expired = QrTokens::new("test-secret", -60)
            .issue(AGENCY, AttendanceAction::CheckIn)
            .unwrap();

        assert!(matches!(
            f.service
                .mark_by_qr(USER, &expired, AttendanceAction::CheckIn, instant("2026-03-04T09:00:00Z"))
                .await,
            Err(ServiceError::QrTokenExpired)
        ));
    }

    #[actix_web::test]
    async fn qr_link_embeds_token_and_action() {
        let f = fixture(Verdict::Valid);
        let url = f
            .service
            .generate_qr_link(AGENCY, AttendanceAction::CheckOut)
            .unwrap();
        assert!(url.starts_with("https://attendance.example.com/attendance/qr?token="));
        assert!(url.ends_with("&type=check-out"));
    }

    #[actix_web::test]
    async fn history_requires_a_scope_and_a_sane_range() {
        let f = fixture(Verdict::Valid);
        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();

        let unscoped = HistoryFilter {
            agency_id: None,
            user_id: None,
            start_date: start,
            end_date: end,
        };
        assert!(matches!(
            f.service.history(unscoped).await,
            Err(ServiceError::Validation(_))
        ));

        let inverted = HistoryFilter {
            agency_id: Some(AGENCY.to_string()),
            user_id: None,
            start_date: end,
            end_date: start,
        };
        assert!(matches!(
            f.service.history(inverted).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[actix_web::test]
    async fn history_is_ordered_most_recent_first() {
        let f = fixture(Verdict::Valid);
        for day in ["2026-03-02", "2026-03-04", "2026-03-03"] {
            f.service
                .mark_attendance(mark(AttendanceAction::CheckIn, &format!("{day}T09:00:00Z")))
                .await
                .unwrap();
        }

        let records = f
            .service
            .history(HistoryFilter {
                agency_id: Some(AGENCY.to_string()),
                user_id: None,
                start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            })
            .await
            .unwrap();

        let dates: Vec<String> = records.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2026-03-04", "2026-03-03", "2026-03-02"]);
    }
}
