use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::settings::Settings;

/// The bearer header wins over the `token` query parameter.
fn presented_token<'a>(
    auth: Option<&'a Authorization<Bearer>>,
    query_token: Option<&'a str>,
) -> Option<&'a str> {
    auth.map(|a| a.token()).or(query_token).map(str::trim)
}

/// Gate for every schedule route. An empty configured token locks the API.
pub fn verify_token(
    settings: &Settings,
    auth: Option<Authorization<Bearer>>,
    query_token: Option<&str>,
) -> Result<(), ApiError> {
    if settings.auth_token.is_empty() {
        warn!("APP_AUTH_TOKEN is empty; rejecting request");
        return Err(ApiError::Unauthorized("API access is not configured".into()));
    }

    match presented_token(auth.as_ref(), query_token) {
        Some(token) if token == settings.auth_token => Ok(()),
        Some(_) => {
            debug!("Rejected request with wrong token");
            Err(ApiError::Unauthorized("Invalid authentication token".into()))
        }
        None => Err(ApiError::Unauthorized("Missing authentication token".into())),
    }
}
