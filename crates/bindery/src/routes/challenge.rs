//! Page view and CAPTCHA issuance endpoints.

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use quire_common::{IssuedChallenge, Purpose, QuireError};
use serde::Serialize;

use super::error::ApiError;
use crate::session::SessionContext;
use crate::state::AppState;
use crate::sweeper;

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    purpose: Purpose,
    image_data: String,
    expires_in_secs: i64,
}

impl From<IssuedChallenge> for ChallengeResponse {
    fn from(challenge: IssuedChallenge) -> Self {
        Self {
            purpose: challenge.purpose,
            expires_in_secs: challenge.expires_in_secs(),
            image_data: challenge.image_data,
        }
    }
}

#[derive(Serialize)]
pub struct HomeResponse {
    merge: ChallengeResponse,
    split: ChallengeResponse,
    max_upload_bytes: usize,
}

/// Page view: sweep stale uploads, then issue one challenge per action
pub async fn home(State(state): State<AppState>, session: SessionContext) -> Response {
    let result = async {
        if let Some(report) =
            sweeper::run_sweep(state.config.upload.dir.clone(), state.retention()).await
        {
            tracing::debug!(removed = report.removed, "Swept uploads on page view");
        }

        let merge = state.issue_challenge(&session.id, Purpose::Merge).await?;
        let split = state.issue_challenge(&session.id, Purpose::Split).await?;

        Ok::<_, ApiError>(Json(HomeResponse {
            merge: merge.into(),
            split: split.into(),
            max_upload_bytes: state.config.upload.max_content_length,
        }))
    }
    .await;

    session.attach(result)
}

/// Issue a fresh challenge for one action
pub async fn get_challenge(
    State(state): State<AppState>,
    session: SessionContext,
    Path(purpose): Path<String>,
) -> Response {
    let result = match purpose.parse::<Purpose>() {
        Ok(purpose) => state
            .issue_challenge(&session.id, purpose)
            .await
            .map(|challenge| Json(ChallengeResponse::from(challenge)))
            .map_err(ApiError::from),
        Err(_) => Err(QuireError::NotFound(format!("challenge type {purpose}")).into()),
    };

    session.attach(result)
}
