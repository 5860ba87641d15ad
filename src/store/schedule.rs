use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::{error::ServiceError, model::schedule::WorkSchedule, service::schedule::ScheduleStore};

const SCHEDULE_COLUMNS: &str = "id, agency_id, name, days_of_week, entry_time, exit_time, \
     grace_period_minutes, is_default, assigned_user_ids, created_at, updated_at";

pub struct NewScheduleData {
    pub name: String,
    pub days_of_week: Vec<u8>,
    pub entry_time: String,
    pub exit_time: String,
    pub grace_period_minutes: u32,
    pub is_default: bool,
    pub assigned_user_ids: Vec<String>,
}

#[derive(Default)]
pub struct ScheduleChanges {
    pub name: Option<String>,
    pub days_of_week: Option<Vec<u8>>,
    pub entry_time: Option<String>,
    pub exit_time: Option<String>,
    pub grace_period_minutes: Option<u32>,
    pub is_default: Option<bool>,
    pub assigned_user_ids: Option<Vec<String>>,
}

impl ScheduleChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.days_of_week.is_none()
            && self.entry_time.is_none()
            && self.exit_time.is_none()
            && self.grace_period_minutes.is_none()
            && self.is_default.is_none()
            && self.assigned_user_ids.is_none()
    }
}

pub struct SqlScheduleStore {
    pool: MySqlPool,
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: String,
    agency_id: String,
    name: String,
    days_of_week: String,
    entry_time: String,
    exit_time: String,
    grace_period_minutes: u32,
    is_default: bool,
    assigned_user_ids: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for WorkSchedule {
    type Error = ServiceError;

    fn try_from(row: ScheduleRow) -> Result<Self, ServiceError> {
        let days_of_week: Vec<u8> = serde_json::from_str(&row.days_of_week).map_err(|e| {
            ServiceError::Configuration(format!("schedule {} has corrupt days_of_week: {e}", row.id))
        })?;
        let assigned_user_ids: Vec<String> = serde_json::from_str(&row.assigned_user_ids)
            .map_err(|e| {
                ServiceError::Configuration(format!(
                    "schedule {} has corrupt assigned_user_ids: {e}",
                    row.id
                ))
            })?;

        Ok(WorkSchedule {
            id: row.id,
            agency_id: row.agency_id,
            name: row.name,
            days_of_week,
            entry_time: row.entry_time,
            exit_time: row.exit_time,
            grace_period_minutes: row.grace_period_minutes,
            is_default: row.is_default,
            assigned_user_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000"))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value)
        .map_err(|e| ServiceError::Configuration(format!("failed to encode schedule field: {e}")))
}

impl SqlScheduleStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a schedule. Setting it as the default clears the previous
    /// default first, so at most one default exists per agency.
    pub async fn create(
        &self,
        agency_id: &str,
        data: NewScheduleData,
    ) -> Result<WorkSchedule, ServiceError> {
        let mut tx = self.pool.begin().await?;

        if data.is_default {
            sqlx::query("UPDATE work_schedules SET is_default = FALSE WHERE agency_id = ? AND is_default = TRUE")
                .bind(agency_id)
                .execute(&mut *tx)
                .await?;
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO work_schedules
                (id, agency_id, name, days_of_week, entry_time, exit_time,
                 grace_period_minutes, is_default, assigned_user_ids, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(agency_id)
        .bind(&data.name)
        .bind(encode_json(&data.days_of_week)?)
        .bind(&data.entry_time)
        .bind(&data.exit_time)
        .bind(data.grace_period_minutes)
        .bind(data.is_default)
        .bind(encode_json(&data.assigned_user_ids)?)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            if is_unique_violation(&e) {
                return Err(ServiceError::Conflict(format!(
                    "A schedule named '{}' already exists for this agency.",
                    data.name
                )));
            }
            return Err(e.into());
        }

        tx.commit().await?;

        Ok(WorkSchedule {
            id,
            agency_id: agency_id.to_string(),
            name: data.name,
            days_of_week: data.days_of_week,
            entry_time: data.entry_time,
            exit_time: data.exit_time,
            grace_period_minutes: data.grace_period_minutes,
            is_default: data.is_default,
            assigned_user_ids: data.assigned_user_ids,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn list(&self, agency_id: &str) -> Result<Vec<WorkSchedule>, ServiceError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM work_schedules WHERE agency_id = ? \
             ORDER BY is_default DESC, name ASC"
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(agency_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(WorkSchedule::try_from).collect()
    }

    /// Updates a schedule owned by the agency. Promoting a schedule to
    /// default demotes the previous one; demoting the only default is
    /// rejected so the agency always keeps a fallback.
    pub async fn update(
        &self,
        agency_id: &str,
        schedule_id: &str,
        changes: ScheduleChanges,
    ) -> Result<WorkSchedule, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM work_schedules WHERE id = ? AND agency_id = ? FOR UPDATE"
        );
        let existing: WorkSchedule = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(schedule_id)
            .bind(agency_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Schedule {schedule_id} not found.")))?
            .try_into()?;

        match changes.is_default {
            Some(true) if !existing.is_default => {
                sqlx::query("UPDATE work_schedules SET is_default = FALSE WHERE agency_id = ? AND is_default = TRUE")
                    .bind(agency_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Some(false) if existing.is_default => {
                let (others,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM work_schedules WHERE agency_id = ? AND is_default = TRUE AND id <> ?",
                )
                .bind(agency_id)
                .bind(schedule_id)
                .fetch_one(&mut *tx)
                .await?;
                if others == 0 {
                    return Err(ServiceError::Business(
                        "Cannot unset the only default schedule. Set another schedule as default first."
                            .to_string(),
                    ));
                }
            }
            _ => {}
        }

        let mut updated = existing;
        if let Some(name) = changes.name {
            updated.name = name;
        }
        if let Some(days_of_week) = changes.days_of_week {
            updated.days_of_week = days_of_week;
        }
        if let Some(entry_time) = changes.entry_time {
            updated.entry_time = entry_time;
        }
        if let Some(exit_time) = changes.exit_time {
            updated.exit_time = exit_time;
        }
        if let Some(grace) = changes.grace_period_minutes {
            updated.grace_period_minutes = grace;
        }
        if let Some(is_default) = changes.is_default {
            updated.is_default = is_default;
        }
        if let Some(assigned) = changes.assigned_user_ids {
            updated.assigned_user_ids = assigned;
        }
        updated.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE work_schedules
            SET name = ?, days_of_week = ?, entry_time = ?, exit_time = ?,
                grace_period_minutes = ?, is_default = ?, assigned_user_ids = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&updated.name)
        .bind(encode_json(&updated.days_of_week)?)
        .bind(&updated.entry_time)
        .bind(&updated.exit_time)
        .bind(updated.grace_period_minutes)
        .bind(updated.is_default)
        .bind(encode_json(&updated.assigned_user_ids)?)
        .bind(updated.updated_at)
        .bind(schedule_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            if is_unique_violation(&e) {
                return Err(ServiceError::Conflict(format!(
                    "A schedule named '{}' already exists for this agency.",
                    updated.name
                )));
            }
            return Err(e.into());
        }

        tx.commit().await?;
        Ok(updated)
    }

    /// Deletes a schedule owned by the agency. The default schedule is
    /// protected: another schedule must be promoted first. The row lock
    /// serializes the check against a concurrent promotion, so a schedule
    /// that just became the default cannot slip through.
    pub async fn delete(&self, agency_id: &str, schedule_id: &str) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM work_schedules WHERE id = ? AND agency_id = ? FOR UPDATE"
        );
        let existing: WorkSchedule = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(schedule_id)
            .bind(agency_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Schedule {schedule_id} not found.")))?
            .try_into()?;

        if existing.is_default {
            return Err(ServiceError::Business(
                "Cannot delete the default schedule. Set another schedule as default first."
                    .to_string(),
            ));
        }

        let result = sqlx::query("DELETE FROM work_schedules WHERE id = ? AND is_default = FALSE")
            .bind(schedule_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::Business(
                "Cannot delete the default schedule. Set another schedule as default first."
                    .to_string(),
            ));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for SqlScheduleStore {
    async fn schedules_for_agency(
        &self,
        agency_id: &str,
    ) -> Result<Vec<WorkSchedule>, ServiceError> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM work_schedules WHERE agency_id = ?");
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(agency_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(WorkSchedule::try_from).collect()
    }
}

// These hit a live MySQL with the migrations applied; run with
// `cargo test -- --ignored` and DATABASE_URL set.
#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqlScheduleStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for store tests");
        SqlScheduleStore::new(MySqlPool::connect(&url).await.expect("connect"))
    }

    fn weekday_schedule(name: &str, is_default: bool) -> NewScheduleData {
        NewScheduleData {
            name: name.to_string(),
            days_of_week: vec![1, 2, 3, 4, 5],
            entry_time: "09:00".to_string(),
            exit_time: "17:00".to_string(),
            grace_period_minutes: 10,
            is_default,
            assigned_user_ids: vec![],
        }
    }

    #[actix_web::test]
    #[ignore]
    async fn deleting_a_schedule_promoted_to_default_is_rejected() {
        let store = store().await;
        let agency = Uuid::new_v4().to_string();
        store
            .create(&agency, weekday_schedule("Morning", true))
            .await
            .unwrap();
        let evening = store
            .create(&agency, weekday_schedule("Evening", false))
            .await
            .unwrap();

        // Promote Evening; Morning is demoted and Evening is now the only
        // default, so deleting it must fail.
        store
            .update(
                &agency,
                &evening.id,
                ScheduleChanges {
                    is_default: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = store.delete(&agency, &evening.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Business(_)));

        let remaining = store.list(&agency).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|s| s.is_default));
    }
}
