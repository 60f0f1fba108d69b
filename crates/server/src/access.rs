//! The access check endpoint.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use http::StatusCode;
use limiter::{AccessManager, AccessRequest, LimiterError};
use serde::{Deserialize, Serialize};

/// Body of `POST /access`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AccessBody {
    service_id: String,
    client_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default = "default_usage_amount")]
    usage_amount: u64,
}

fn default_usage_amount() -> u64 {
    1
}

impl From<AccessBody> for AccessRequest {
    fn from(body: AccessBody) -> Self {
        AccessRequest::builder()
            .service(body.service_id)
            .client(body.client_id)
            .user(body.user_id)
            .usage(body.usage_amount)
            .build()
    }
}

/// Response of an access check. `retry_after_seconds` is `null` when waiting cannot help.
#[derive(Debug, Serialize)]
pub(crate) struct AccessStatus {
    is_allowed: bool,
    retry_after_seconds: Option<u64>,
}

/// Errors returned to the caller as `{"error": "..."}`.
#[derive(Debug)]
pub(crate) enum AccessError {
    Limiter(LimiterError),
    InvalidBody(JsonRejection),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AccessError::InvalidBody(rejection) => (rejection.status(), rejection.body_text()),
            AccessError::Limiter(err) => {
                let status = match &err {
                    LimiterError::ServiceNotFound { .. } | LimiterError::BucketNotFound { .. } => StatusCode::NOT_FOUND,
                    LimiterError::DuplicateKey { .. } | LimiterError::DuplicateService { .. } => StatusCode::CONFLICT,
                    LimiterError::InvalidCapacity { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };

                (status, err.to_string())
            }
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Decides whether the caller may use the service, charging the usage if so.
pub(crate) async fn access(
    State(manager): State<Arc<AccessManager>>,
    body: Result<Json<AccessBody>, JsonRejection>,
) -> Result<Json<AccessStatus>, AccessError> {
    let Json(body) = body.map_err(|rejection| {
        log::debug!("Rejected access check body: {rejection}");
        AccessError::InvalidBody(rejection)
    })?;

    let request = AccessRequest::from(body);

    let decision = manager.get_access_status(&request).map_err(|err| {
        log::debug!("Access check for service '{}' failed: {err}", request.service_id);
        AccessError::Limiter(err)
    })?;

    Ok(Json(AccessStatus {
        is_allowed: decision.is_allowed,
        retry_after_seconds: decision.retry_after_seconds(),
    }))
}
