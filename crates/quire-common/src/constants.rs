//! Shared constants for Quire components.

/// Default Bindery HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Default directory for generated PDF artifacts
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Maximum accepted request body (10 MiB)
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Files older than this are removed by the retention sweep (1 hour)
pub const DEFAULT_RETENTION_SECS: u64 = 3600;

/// CAPTCHA challenge expiry (10 minutes)
pub const CAPTCHA_TTL_SECS: u64 = 600;

/// Number of characters in a CAPTCHA code
pub const CAPTCHA_LENGTH: usize = 5;

/// Characters a CAPTCHA code is drawn from
pub const CAPTCHA_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Extensions accepted by the upload boundary (compared lowercase)
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "quire_session";

/// Redis key prefixes
pub mod redis_keys {
    /// CAPTCHA challenge: captcha:{session_id}:{purpose}
    pub const CAPTCHA_PREFIX: &str = "captcha:";
}

/// Multipart form field names
pub mod fields {
    /// Files to merge (repeated)
    pub const PDF_FILES: &str = "pdf_files";

    /// File to split
    pub const PDF_FILE: &str = "pdf_file";

    /// The user's answer to the CAPTCHA
    pub const CAPTCHA_ANSWER: &str = "captcha_answer";
}
