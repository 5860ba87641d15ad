use chrono::{Duration, Utc};
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ServiceError, model::attendance::AttendanceAction};

/// Claim set carried by a QR marking token. Ephemeral, never persisted; the
/// token is multi-use until it expires.
#[derive(Debug, Serialize, Deserialize)]
pub struct QrClaims {
    pub agency_id: String,
    pub action: AttendanceAction,
    pub jti: String,
    pub iat: usize,
    pub exp: usize,
}

/// Issues and verifies short-lived signed QR tokens binding an agency to a
/// check-in or check-out action.
#[derive(Clone)]
pub struct QrTokens {
    secret: String,
    ttl_secs: i64,
}

impl QrTokens {
    pub fn new(secret: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    pub fn issue(&self, agency_id: &str, action: AttendanceAction) -> Result<String, ServiceError> {
        let issued_at = Utc::now();
        let claims = QrClaims {
            agency_id: agency_id.to_string(),
            action,
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp() as usize,
            exp: (issued_at + Duration::seconds(self.ttl_secs)).timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ServiceError::Configuration(format!("failed to sign QR token: {e}")))
    }

    /// Distinguishes an expired token from any other kind of invalid token.
    pub fn verify(&self, token: &str) -> Result<QrClaims, ServiceError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<QrClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => ServiceError::QrTokenExpired,
            _ => ServiceError::QrTokenInvalid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENCY: &str = "8c3f2d54-9f10-4f3a-9c93-0a4f2d1e5b77";

    #[test]
    fn issue_then_verify_round_trip() {
        let tokens = QrTokens::new("test-secret", 3600);
        let token = tokens.issue(AGENCY, AttendanceAction::CheckIn).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.agency_id, AGENCY);
        assert_eq!(claims.action, AttendanceAction::CheckIn);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        // A negative TTL puts exp in the past.
        let tokens = QrTokens::new("test-secret", -120);
        let token = tokens.issue(AGENCY, AttendanceAction::CheckOut).unwrap();

        assert!(matches!(
            tokens.verify(&token),
            Err(ServiceError::QrTokenExpired)
        ));
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let theirs = QrTokens::new("their-secret", 3600);
        let ours = QrTokens::new("our-secret", 3600);
        let token = theirs.issue(AGENCY, AttendanceAction::CheckIn).unwrap();

        assert!(matches!(
            ours.verify(&token),
            Err(ServiceError::QrTokenInvalid)
        ));
    }

    #[test]
    fn garbage_token_is_invalid() {
        let tokens = QrTokens::new("test-secret", 3600);
        assert!(matches!(
            tokens.verify("not.a.token"),
            Err(ServiceError::QrTokenInvalid)
        ));
    }
}
