use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// A rejected API request. Rendered as `{"error": "<code>"}` with the matching status.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum APIError {
    #[error("forbidden_ip")]
    ForbiddenIP,
    #[error("no_request_body")]
    NoRequestBody,
    #[error("invalid_request")]
    InvalidRequest,
    #[error("invalid_subdomain")]
    InvalidSubdomain,
    #[error("invalid_txt_record")]
    InvalidTxtRecord,
    #[error("unauthorized")]
    Unauthorized,
    #[error("read_only")]
    ReadOnly,
    #[error("present_failed")]
    PresentFailed,
    #[error("cleanup_failed")]
    CleanupFailed,
    #[error("no_registration_request")]
    NoRegistrationRequest,
    #[error("malformed_json")]
    MalformedJSON,
    #[error("missing_required_fields")]
    MissingRequiredFields,
    #[error("invalid_zone")]
    InvalidZone,
    #[error("invalid_allowfrom_cidr")]
    InvalidAllowfromCidr,
    #[error("account_exists")]
    AccountExists,
    #[error("registration_failed")]
    RegistrationFailed,
    #[error("registration_disabled")]
    RegistrationDisabled,
    #[error("metrics_failed")]
    MetricsFailed,
}

impl APIError {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            APIError::ForbiddenIP | APIError::ReadOnly => StatusCode::FORBIDDEN,
            APIError::Unauthorized => StatusCode::UNAUTHORIZED,
            APIError::AccountExists => StatusCode::CONFLICT,
            APIError::RegistrationDisabled => StatusCode::NOT_IMPLEMENTED,
            APIError::PresentFailed
            | APIError::CleanupFailed
            | APIError::RegistrationFailed
            | APIError::MetricsFailed => StatusCode::INTERNAL_SERVER_ERROR,
            APIError::NoRequestBody
            | APIError::InvalidRequest
            | APIError::InvalidSubdomain
            | APIError::InvalidTxtRecord
            | APIError::NoRegistrationRequest
            | APIError::MalformedJSON
            | APIError::MissingRequiredFields
            | APIError::InvalidZone
            | APIError::InvalidAllowfromCidr => StatusCode::BAD_REQUEST,
        }
    }

    /// The machine readable code sent to clients.
    #[must_use]
    pub fn code(self) -> String {
        self.to_string()
    }
}

impl IntoResponse for APIError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
        }));
        (self.status(), body).into_response()
    }
}
