use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use kitabya_types::api::Envelope;

use crate::blob::BlobError;
use crate::identity::IdentityError;
use crate::push::PushError;

/// Every failure a handler can surface. The message of the client-facing
/// variants is returned verbatim; upstream and internal details are logged
/// and replaced by a generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("device token is invalid or expired")]
    StaleDeviceToken,

    #[error("{service} failure: {message}")]
    Upstream { service: &'static str, message: String },

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{} not found", what))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::StaleDeviceToken => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::StaleDeviceToken => "PUSH_TOKEN_UNREGISTERED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Upstream { service, .. } => format!("{} is unavailable", service),
            Self::Internal(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Internal(e) => error!("Unhandled error: {:?}", e),
            Self::Upstream { service, message } => error!("{} failure: {}", service, message),
            Self::StaleDeviceToken => warn!("Push target token is no longer registered"),
            _ => {}
        }

        let body = Envelope::failure(self.code(), self.public_message());
        (self.status(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        Self::Upstream {
            service: "blob storage",
            message: err.to_string(),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Invalid(reason) => {
                warn!("Rejected credential: {}", reason);
                Self::Unauthorized("Authentication failed".to_string())
            }
            IdentityError::Unavailable(message) => Self::Upstream {
                service: "identity provider",
                message,
            },
        }
    }
}

impl From<PushError> for ApiError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::Unregistered => Self::StaleDeviceToken,
            PushError::Delivery(message) => Self::Upstream {
                service: "push delivery",
                message,
            },
        }
    }
}
