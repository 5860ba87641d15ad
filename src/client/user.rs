use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::ServiceError, service::attendance::UserValidator};

/// Calls the user service through the gateway to confirm that a user belongs
/// to an agency. Every call is bounded by the configured timeout; timeouts
/// and transport errors are upstream faults, never treated as "valid" or
/// "invalid".
pub struct HttpUserValidator {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUserValidator {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { http, base_url }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest<'a> {
    user_id: &'a str,
    agency_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    is_valid: bool,
}

#[async_trait]
impl UserValidator for HttpUserValidator {
    async fn validate(&self, user_id: &str, agency_id: &str) -> Result<bool, ServiceError> {
        let url = format!("{}/v1/api/users/validate", self.base_url.trim_end_matches('/'));
        tracing::info!(user_id, agency_id, "calling user service");

        let response = self
            .http
            .post(&url)
            .json(&ValidateRequest { user_id, agency_id })
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id, agency_id, "user service unreachable");
                ServiceError::Upstream(format!("user service: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "user service returned {}",
                response.status()
            )));
        }

        let verdict: ValidateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(format!("user service: {e}")))?;

        Ok(verdict.is_valid)
    }
}
