//! CAPTCHA issuance and verification.
//!
//! A challenge is a short random code rendered into an image. The expected
//! answer is stored against the caller's session (never sent to the client)
//! and consumed by the first verification attempt.

mod generator;
mod render;
mod verifier;

pub use generator::CaptchaGenerator;
pub use render::{CaptchaRenderer, RasterRenderer, RenderError, SYSTEM_FONTS, SvgRenderer};
pub use verifier::CaptchaVerifier;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Failures while issuing a challenge
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("session store unavailable: {0:#}")]
    Store(anyhow::Error),
}

/// Normalise an answer for comparison: trimmed, uppercase
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_uppercase()
}

/// Digest stored in place of the plaintext code
pub fn answer_digest(answer: &str) -> String {
    format!("{:x}", Sha256::digest(normalize_answer(answer).as_bytes()))
}
