use actix_web::{HttpResponse, http::StatusCode};
use thiserror::Error;

/// Failure taxonomy for the attendance core. Every variant maps to a JSON
/// `{"message": ...}` response; internal kinds are logged with their detail
/// and answered with a generic message.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input, rejected before any external call.
    #[error("{0}")]
    Validation(String),

    #[error("A check-in was already recorded for today.")]
    DuplicateCheckIn,

    #[error("A check-in must be recorded before checking out.")]
    CheckOutBeforeCheckIn,

    #[error("A check-out was already recorded for today.")]
    DuplicateCheckOut,

    #[error("There is no applicable work schedule for today.")]
    NoApplicableSchedule,

    #[error("User {user_id} is invalid or does not belong to agency {agency_id}.")]
    InvalidUser { user_id: String, agency_id: String },

    /// Other business rule violations (e.g. default schedule protections).
    #[error("{0}")]
    Business(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A dependency was unreachable or answered with an error; distinct from
    /// a negative answer.
    #[error("upstream service error: {0}")]
    Upstream(String),

    /// Corrupted stored configuration, e.g. an unparseable schedule time.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("The QR code has expired.")]
    QrTokenExpired,

    #[error("The QR code is not valid.")]
    QrTokenInvalid,

    #[error("The QR code was issued for a different action.")]
    QrActionMismatch,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl actix_web::ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_)
            | ServiceError::CheckOutBeforeCheckIn
            | ServiceError::NoApplicableSchedule
            | ServiceError::InvalidUser { .. }
            | ServiceError::Business(_)
            | ServiceError::QrActionMismatch => StatusCode::BAD_REQUEST,
            ServiceError::DuplicateCheckIn
            | ServiceError::DuplicateCheckOut
            | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::QrTokenExpired | ServiceError::QrTokenInvalid => StatusCode::UNAUTHORIZED,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Configuration(_) | ServiceError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ServiceError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                "Internal Server Error".to_string()
            }
            ServiceError::Configuration(detail) => {
                tracing::error!(%detail, "configuration failure");
                "Internal Server Error".to_string()
            }
            ServiceError::Upstream(detail) => {
                tracing::error!(%detail, "upstream failure");
                "Could not reach a required upstream service.".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({ "message": message }))
    }
}
