//! Application state and shared resources.

use anyhow::{Context, Result};
use quire_common::constants::CAPTCHA_ALPHABET;
use quire_common::{IssuedChallenge, Purpose};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::captcha::{
    CaptchaError, CaptchaGenerator, CaptchaRenderer, CaptchaVerifier, RasterRenderer, SYSTEM_FONTS,
    SvgRenderer,
};
use crate::config::{AppConfig, RendererKind};
use crate::session::{MemorySessionStore, RedisSessionStore, SessionSigner, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Where session-bound challenges live
    pub sessions: Arc<dyn SessionStore>,

    /// Session cookie signer
    pub signer: Arc<SessionSigner>,

    /// CAPTCHA generator
    pub captcha_generator: Arc<CaptchaGenerator>,

    /// CAPTCHA verifier
    pub captcha_verifier: Arc<CaptchaVerifier>,
}

impl AppState {
    /// Create application state from config, connecting to Redis if configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let sessions: Arc<dyn SessionStore> = match config.redis_url.as_deref() {
            Some(url) => {
                let store = RedisSessionStore::connect(url).await?;
                tracing::info!("✅ Redis connected: {}", url);
                Arc::new(store)
            }
            None => {
                tracing::info!("Using in-memory session store");
                Arc::new(MemorySessionStore::new())
            }
        };

        let renderer: Arc<dyn CaptchaRenderer> = match config.captcha.renderer {
            RendererKind::Raster => Arc::new(
                RasterRenderer::locate(Path::new(&config.captcha.font_path), SYSTEM_FONTS)
                    .context("Failed to initialise CAPTCHA renderer")?,
            ),
            RendererKind::Svg => {
                tracing::warn!("SVG CAPTCHA renderer selected; codes are machine-readable");
                Arc::new(SvgRenderer)
            }
        };

        Ok(Self::with_parts(config, sessions, renderer))
    }

    /// Assemble state from already-built parts
    pub fn with_parts(
        config: AppConfig,
        sessions: Arc<dyn SessionStore>,
        renderer: Arc<dyn CaptchaRenderer>,
    ) -> Self {
        let signer = Arc::new(SessionSigner::new(&config.secret_key));
        let captcha_generator = Arc::new(CaptchaGenerator::new(
            config.captcha.challenge_ttl_secs,
            config.captcha.length,
            CAPTCHA_ALPHABET,
            renderer,
        ));

        Self {
            config: Arc::new(config),
            sessions,
            signer,
            captcha_generator,
            captcha_verifier: Arc::new(CaptchaVerifier::new()),
        }
    }

    /// Issue a challenge bound to `session_id`
    pub async fn issue_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
    ) -> Result<IssuedChallenge, CaptchaError> {
        self.captcha_generator
            .issue(self.sessions.as_ref(), session_id, purpose)
            .await
    }

    /// Verify (and consume) the challenge bound to `session_id`
    pub async fn verify_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
        submitted: &str,
    ) -> Result<bool> {
        self.captcha_verifier
            .verify(self.sessions.as_ref(), session_id, purpose, submitted)
            .await
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.config.cleanup.retention_secs)
    }
}
