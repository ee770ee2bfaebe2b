//! CAPTCHA code generation and issuance.

use quire_common::{IssuedChallenge, Purpose};
use rand::Rng;
use std::sync::Arc;

use super::{CaptchaError, CaptchaRenderer, answer_digest};
use crate::session::{SessionStore, StoredChallenge};

/// CAPTCHA generator service
pub struct CaptchaGenerator {
    /// Challenge TTL in seconds
    pub challenge_ttl: u64,
    /// Characters per code
    pub length: usize,
    /// Characters a code is drawn from
    alphabet: Vec<char>,
    renderer: Arc<dyn CaptchaRenderer>,
}

impl CaptchaGenerator {
    pub fn new(
        challenge_ttl: u64,
        length: usize,
        alphabet: &str,
        renderer: Arc<dyn CaptchaRenderer>,
    ) -> Self {
        Self {
            challenge_ttl,
            length,
            alphabet: alphabet.chars().collect(),
            renderer,
        }
    }

    /// Issue a new challenge for `(session_id, purpose)`, replacing any previous one.
    ///
    /// Nothing is stored when rendering fails, so a caller never ends up with
    /// a live challenge it could not show.
    pub async fn issue(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
        purpose: Purpose,
    ) -> Result<IssuedChallenge, CaptchaError> {
        let code = self.generate_code();
        let image_data = self.renderer.render(&code)?;

        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(self.challenge_ttl).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl);

        let stored = StoredChallenge {
            answer_digest: answer_digest(&code),
            issued_at: now,
            expires_at,
        };
        store
            .put_challenge(session_id, purpose, stored, self.challenge_ttl)
            .await
            .map_err(CaptchaError::Store)?;

        tracing::debug!(
            session_id = %session_id,
            purpose = %purpose,
            "Issued CAPTCHA challenge"
        );

        Ok(IssuedChallenge {
            purpose,
            image_data,
            expires_at,
        })
    }

    /// Random code of the configured length, drawn from the alphabet
    pub fn generate_code(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::{CaptchaVerifier, RenderError, SvgRenderer};
    use crate::session::MemorySessionStore;
    use quire_common::constants::CAPTCHA_ALPHABET;

    /// Renders the code verbatim so tests can read it back
    struct PlainRenderer;

    impl CaptchaRenderer for PlainRenderer {
        fn render(&self, code: &str) -> Result<String, RenderError> {
            Ok(code.to_string())
        }
    }

    struct BrokenRenderer;

    impl CaptchaRenderer for BrokenRenderer {
        fn render(&self, _code: &str) -> Result<String, RenderError> {
            Err(RenderError::Encode("backend unavailable".into()))
        }
    }

    fn generator(renderer: Arc<dyn CaptchaRenderer>) -> CaptchaGenerator {
        CaptchaGenerator::new(300, 5, CAPTCHA_ALPHABET, renderer)
    }

    #[test]
    fn test_code_length_and_alphabet() {
        let generator = generator(Arc::new(SvgRenderer::default()));
        for _ in 0..200 {
            let code = generator.generate_code();
            assert_eq!(code.len(), 5);
            assert!(code.chars().all(|c| CAPTCHA_ALPHABET.contains(c)), "{code}");
        }
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_code() {
        let store = MemorySessionStore::new();
        let generator = generator(Arc::new(PlainRenderer));
        let verifier = CaptchaVerifier::new();

        let first = generator.issue(&store, "s1", Purpose::Merge).await.unwrap();
        let second = generator.issue(&store, "s1", Purpose::Merge).await.unwrap();

        // Only a collision between the two random codes could let the first one through
        let outcome = verifier
            .verify(&store, "s1", Purpose::Merge, &first.image_data)
            .await
            .unwrap();
        assert_eq!(outcome, first.image_data == second.image_data);
    }

    #[tokio::test]
    async fn test_latest_code_verifies() {
        let store = MemorySessionStore::new();
        let generator = generator(Arc::new(PlainRenderer));
        let verifier = CaptchaVerifier::new();

        generator.issue(&store, "s1", Purpose::Split).await.unwrap();
        let latest = generator.issue(&store, "s1", Purpose::Split).await.unwrap();

        assert!(
            verifier
                .verify(&store, "s1", Purpose::Split, &latest.image_data)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_wrap_into_the_past() {
        let store = MemorySessionStore::new();
        let generator = CaptchaGenerator::new(u64::MAX, 5, CAPTCHA_ALPHABET, Arc::new(PlainRenderer));

        let issued = generator.issue(&store, "s1", Purpose::Merge).await.unwrap();
        assert_eq!(issued.expires_at, i64::MAX);
        assert!(
            CaptchaVerifier::new()
                .verify(&store, "s1", Purpose::Merge, &issued.image_data)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_render_failure_stores_nothing() {
        let store = MemorySessionStore::new();
        let generator = generator(Arc::new(BrokenRenderer));

        let result = generator.issue(&store, "s1", Purpose::Merge).await;
        assert!(matches!(result, Err(CaptchaError::Render(_))));
        assert_eq!(store.len(), 0);
    }
}
