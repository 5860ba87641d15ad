use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{error::ServiceError, model::schedule::WorkSchedule, utils::time::iso_weekday};

/// Read side of the schedule configuration consumed by the resolver.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn schedules_for_agency(&self, agency_id: &str)
    -> Result<Vec<WorkSchedule>, ServiceError>;
}

/// Determines which work schedule governs a user on a given date.
#[derive(Clone)]
pub struct ScheduleResolver {
    store: Arc<dyn ScheduleStore>,
}

impl ScheduleResolver {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    /// A schedule explicitly assigned to the user and covering the weekday
    /// wins over the agency default covering the weekday. When a user is
    /// assigned to several schedules on the same weekday, the most recently
    /// updated one wins, so resolution stays deterministic.
    pub async fn resolve_applicable(
        &self,
        agency_id: &str,
        user_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<WorkSchedule, ServiceError> {
        let weekday = iso_weekday(date);

        let mut candidates = self.store.schedules_for_agency(agency_id).await?;
        candidates.retain(|s| s.days_of_week.contains(&weekday));
        candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if let Some(user_id) = user_id {
            if let Some(found) = candidates
                .iter()
                .find(|s| s.assigned_user_ids.iter().any(|u| u == user_id))
            {
                tracing::info!(schedule_id = %found.id, user_id, "user-specific schedule applies");
                return Ok(found.clone());
            }
        }

        if let Some(found) = candidates.iter().find(|s| s.is_default) {
            tracing::info!(schedule_id = %found.id, agency_id, "default schedule applies");
            return Ok(found.clone());
        }

        tracing::warn!(agency_id, user_id = ?user_id, weekday, "no applicable schedule");
        Err(ServiceError::NoApplicableSchedule)
    }
}
