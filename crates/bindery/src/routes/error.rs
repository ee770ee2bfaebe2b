//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quire_common::{FieldError, IssuedChallenge, QuireError};
use serde::Serialize;

use super::challenge::ChallengeResponse;
use crate::captcha::CaptchaError;

/// A rejected request, optionally carrying a fresh challenge to retry with
#[derive(Debug)]
pub struct ApiError {
    error: QuireError,
    challenge: Option<IssuedChallenge>,
}

impl ApiError {
    pub fn with_challenge(mut self, challenge: IssuedChallenge) -> Self {
        self.challenge = Some(challenge);
        self
    }

    /// Session backend failure
    pub fn session(error: anyhow::Error) -> Self {
        QuireError::Session(format!("{error:#}")).into()
    }
}

impl From<QuireError> for ApiError {
    fn from(error: QuireError) -> Self {
        Self {
            error,
            challenge: None,
        }
    }
}

impl From<CaptchaError> for ApiError {
    fn from(error: CaptchaError) -> Self {
        match error {
            CaptchaError::Render(e) => QuireError::Render(e.to_string()).into(),
            CaptchaError::Store(e) => Self::session(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    challenge: Option<ChallengeResponse>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.error, "Request failed");
        } else {
            tracing::debug!(error = %self.error, "Request rejected");
        }

        // Details of internal failures stay in the logs
        let message = match &self.error {
            QuireError::Session(_) => "Service temporarily unavailable".to_string(),
            QuireError::Internal(_) | QuireError::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let fields = match self.error {
            QuireError::Validation(fields) => Some(fields),
            _ => None,
        };

        let body = ErrorBody {
            error: message,
            fields,
            challenge: self.challenge.map(ChallengeResponse::from),
        };

        (status, Json(body)).into_response()
    }
}
