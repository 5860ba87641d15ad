use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    model::attendance::{
        AttendanceMethod, AttendanceRecord, AttendanceStatus, NewAttendanceRecord,
    },
    service::attendance::{AttendanceStore, HistoryFilter},
};

const RECORD_COLUMNS: &str = "id, user_id, agency_id, `date`, check_in_time, check_out_time, \
     status, method_in, method_out, schedule_entry_time, schedule_exit_time, notes";

pub struct SqlAttendanceStore {
    pool: MySqlPool,
}

impl SqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: String,
    user_id: String,
    agency_id: String,
    date: NaiveDate,
    check_in_time: DateTime<Utc>,
    check_out_time: Option<DateTime<Utc>>,
    status: Option<String>,
    method_in: String,
    method_out: Option<String>,
    schedule_entry_time: String,
    schedule_exit_time: String,
    notes: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = ServiceError;

    fn try_from(row: AttendanceRow) -> Result<Self, ServiceError> {
        let corrupt = |field: &str, value: &str| {
            ServiceError::Configuration(format!(
                "attendance record {} has unknown {field} '{value}'",
                row.id
            ))
        };

        let status = row
            .status
            .as_deref()
            .map(|s| AttendanceStatus::from_str(s).map_err(|_| corrupt("status", s)))
            .transpose()?;
        let method_in = AttendanceMethod::from_str(&row.method_in)
            .map_err(|_| corrupt("method_in", &row.method_in))?;
        let method_out = row
            .method_out
            .as_deref()
            .map(|m| AttendanceMethod::from_str(m).map_err(|_| corrupt("method_out", m)))
            .transpose()?;

        Ok(AttendanceRecord {
            id: row.id,
            user_id: row.user_id,
            agency_id: row.agency_id,
            date: row.date,
            check_in_time: row.check_in_time,
            check_out_time: row.check_out_time,
            status,
            method_in,
            method_out,
            schedule_entry_time: row.schedule_entry_time,
            schedule_exit_time: row.schedule_exit_time,
            notes: row.notes,
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

#[async_trait]
impl AttendanceStore for SqlAttendanceStore {
    async fn find_by_user_and_date(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, ServiceError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE user_id = ? AND `date` = ?"
        );
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AttendanceRecord::try_from).transpose()
    }

    async fn insert(&self, new: NewAttendanceRecord) -> Result<AttendanceRecord, ServiceError> {
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (id, user_id, agency_id, `date`, check_in_time, status, method_in,
                 schedule_entry_time, schedule_exit_time, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.agency_id)
        .bind(new.date)
        .bind(new.check_in_time)
        .bind(new.status.map(|s| s.as_ref().to_string()))
        .bind(new.method_in.as_ref())
        .bind(&new.schedule_entry_time)
        .bind(&new.schedule_exit_time)
        .bind(&new.notes)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            // The unique (user_id, date) key decides races between concurrent
            // check-ins; the loser sees the same duplicate error.
            if is_unique_violation(&e) {
                return Err(ServiceError::DuplicateCheckIn);
            }
            return Err(e.into());
        }

        Ok(AttendanceRecord {
            id,
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
        })
    }

    async fn set_check_out(
        &self,
        id: &str,
        check_out: DateTime<Utc>,
        method: AttendanceMethod,
        notes: Option<String>,
    ) -> Result<AttendanceRecord, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET check_out_time = ?, method_out = ?, notes = COALESCE(?, notes)
            WHERE id = ? AND check_out_time IS NULL
            "#,
        )
        .bind(check_out)
        .bind(method.as_ref())
        .bind(&notes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        // The conditional update decides races between concurrent check-outs;
        // the loser finds the row already closed.
        if result.rows_affected() == 0 {
            return Err(ServiceError::DuplicateCheckOut);
        }

        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = ?");
        let row = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("attendance record {id} not found")))?;

        row.try_into()
    }

    async fn history(&self, filter: &HistoryFilter) -> Result<Vec<AttendanceRecord>, ServiceError> {
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE `date` >= ? AND `date` <= ?"
        );
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if filter.agency_id.is_some() {
            sql.push_str(" AND agency_id = ?");
        }
        sql.push_str(" ORDER BY `date` DESC, check_in_time DESC");

        let mut query = sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(filter.start_date)
            .bind(filter.end_date);
        if let Some(user_id) = &filter.user_id {
            query = query.bind(user_id);
        }
        if let Some(agency_id) = &filter.agency_id {
            query = query.bind(agency_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(AttendanceRecord::try_from).collect()
    }
}

// These hit a live MySQL with the migrations applied; run with
// `cargo test -- --ignored` and DATABASE_URL set.
#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqlAttendanceStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for store tests");
        SqlAttendanceStore::new(MySqlPool::connect(&url).await.expect("connect"))
    }

    #[actix_web::test]
    #[ignore]
    async fn second_check_out_write_loses_on_the_closed_row() {
        let store = store().await;
        let record = store
            .insert(NewAttendanceRecord {
                user_id: Uuid::new_v4().to_string(),
                agency_id: Uuid::new_v4().to_string(),
                date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
                check_in_time: "2026-03-04T09:00:00Z".parse().unwrap(),
                status: Some(AttendanceStatus::OnTime),
                method_in: AttendanceMethod::Manual,
                schedule_entry_time: "09:00".to_string(),
                schedule_exit_time: "17:00".to_string(),
                notes: None,
            })
            .await
            .unwrap();

        let first: DateTime<Utc> = "2026-03-04T17:00:00Z".parse().unwrap();
        store
            .set_check_out(&record.id, first, AttendanceMethod::Manual, None)
            .await
            .unwrap();

        let err = store
            .set_check_out(
                &record.id,
                "2026-03-04T18:00:00Z".parse().unwrap(),
                AttendanceMethod::Qr,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateCheckOut));

        let current = store
            .find_by_user_and_date(&record.user_id, record.date)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.check_out_time, Some(first));
        assert_eq!(current.method_out, Some(AttendanceMethod::Manual));
    }
}
