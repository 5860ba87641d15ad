use actix_web::{
    FromRequest, HttpRequest,
    dev::Payload,
    error::{ErrorBadRequest, ErrorUnauthorized},
};
use futures::future::{Ready, ready};
use uuid::Uuid;

/// Identity forwarded by the gateway after it has verified the agency JWT.
/// This service trusts the header but still rejects malformed identifiers.
pub struct AgencyAuth {
    pub agency_id: String,
}

/// Identity forwarded by the gateway after it has verified the user JWT.
pub struct UserAuth {
    pub user_id: String,
}

fn header_uuid(req: &HttpRequest, name: &str) -> Result<String, actix_web::Error> {
    let value = req
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ErrorUnauthorized(format!("Missing {name} header")))?;

    Uuid::parse_str(value).map_err(|_| ErrorBadRequest(format!("Malformed {name} header")))?;
    Ok(value.to_string())
}

impl FromRequest for AgencyAuth {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(header_uuid(req, "x-agency-id").map(|agency_id| AgencyAuth { agency_id }))
    }
}

impl FromRequest for UserAuth {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(header_uuid(req, "x-user-id").map(|user_id| UserAuth { user_id }))
    }
}
