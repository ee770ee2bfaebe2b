//! CAPTCHA verification logic.

use anyhow::Result;
use quire_common::Purpose;

use super::answer_digest;
use crate::session::SessionStore;

/// CAPTCHA verifier service
#[derive(Default)]
pub struct CaptchaVerifier;

impl CaptchaVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify a submitted answer for `(session_id, purpose)`.
    ///
    /// The stored challenge is consumed whatever the outcome. A missing or
    /// expired challenge is a failed verification, not an error; only a store
    /// outage returns `Err`.
    pub async fn verify(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
        purpose: Purpose,
        submitted: &str,
    ) -> Result<bool> {
        let Some(challenge) = store.take_challenge(session_id, purpose).await? else {
            tracing::debug!(
                session_id = %session_id,
                purpose = %purpose,
                "No live challenge for session"
            );
            return Ok(false);
        };

        let now = chrono::Utc::now().timestamp();
        if challenge.is_expired(now) {
            tracing::debug!(session_id = %session_id, purpose = %purpose, "Challenge expired");
            return Ok(false);
        }

        let success = answer_digest(submitted) == challenge.answer_digest;

        if success {
            tracing::info!(
                session_id = %session_id,
                purpose = %purpose,
                "CAPTCHA verified successfully"
            );
        } else {
            tracing::debug!(
                session_id = %session_id,
                purpose = %purpose,
                "CAPTCHA verification failed"
            );
        }

        Ok(success)
    }
}
