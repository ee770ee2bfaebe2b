//! Configuration management for Bindery.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use quire_common::constants::{
    ALLOWED_EXTENSIONS, CAPTCHA_LENGTH, CAPTCHA_TTL_SECS, DEFAULT_LISTEN_ADDR,
    DEFAULT_MAX_CONTENT_LENGTH, DEFAULT_RETENTION_SECS, DEFAULT_UPLOAD_DIR,
};

/// Longest accepted challenge lifetime (one day)
pub const MAX_CHALLENGE_TTL_SECS: u64 = 86_400;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Redis connection URL; sessions are kept in memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Key used to sign session cookies (normally from APP_SECRET_KEY)
    #[serde(default)]
    pub secret_key: String,

    /// CAPTCHA configuration
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Upload handling configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Retention sweep configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Which CAPTCHA renderer to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// PNG rasterised from a TrueType font
    Raster,
    /// Vector image, no font file needed
    Svg,
}

/// CAPTCHA-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Number of characters per challenge
    #[serde(default = "default_captcha_length")]
    pub length: usize,

    /// Renderer backend
    #[serde(default = "default_renderer")]
    pub renderer: RendererKind,

    /// Path to font file for CAPTCHA text (raster renderer); system
    /// DejaVu locations are tried when it is missing
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            length: default_captcha_length(),
            renderer: default_renderer(),
            font_path: default_font_path(),
            challenge_ttl_secs: default_challenge_ttl(),
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Directory where merged/split output is written
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Maximum request body in bytes
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Accepted file extensions (case-insensitive)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_content_length: default_max_content_length(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Retention sweep configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Files older than this are deleted
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Background sweep period; 0 disables the timer (page views still sweep)
    #[serde(default)]
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            interval_secs: 0,
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_captcha_length() -> usize { CAPTCHA_LENGTH }
fn default_renderer() -> RendererKind { RendererKind::Raster }
fn default_font_path() -> String { "assets/fonts/DejaVuSans.ttf".to_string() }
fn default_challenge_ttl() -> u64 { CAPTCHA_TTL_SECS }
fn default_upload_dir() -> PathBuf { PathBuf::from(DEFAULT_UPLOAD_DIR) }
fn default_max_content_length() -> usize { DEFAULT_MAX_CONTENT_LENGTH }
fn default_retention() -> u64 { DEFAULT_RETENTION_SECS }

fn default_allowed_extensions() -> Vec<String> {
    ALLOWED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

impl AppConfig {
    /// Load configuration from file, with CLI/env overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = Some(redis_url.clone());
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref dir) = args.upload_dir {
            config.upload.dir = dir.clone();
        }
        if let Some(ref secret) = args.secret_key {
            config.secret_key = secret.clone();
        }

        Ok(config)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.secret_key.trim().is_empty() {
            bail!("APP_SECRET_KEY is not set; refusing to start with unsigned sessions");
        }
        if self.captcha.length == 0 {
            bail!("captcha.length must be at least 1");
        }
        if self.captcha.challenge_ttl_secs == 0
            || self.captcha.challenge_ttl_secs > MAX_CHALLENGE_TTL_SECS
        {
            bail!(
                "captcha.challenge_ttl_secs must be between 1 and {}",
                MAX_CHALLENGE_TTL_SECS
            );
        }
        if self.upload.allowed_extensions.is_empty() {
            bail!("upload.allowed_extensions must not be empty");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            redis_url: None,
            secret_key: String::new(),
            captcha: CaptchaConfig::default(),
            upload: UploadConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}
