//! Per-client session state.
//!
//! A session is identified by an opaque id carried in a signed cookie. The
//! only thing stored against it is the expected CAPTCHA answer for each
//! [`Purpose`], so the store interface is deliberately narrow.

mod context;
mod memory;
mod redis_store;

pub use context::{SessionContext, SessionSigner};
pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

use anyhow::Result;
use async_trait::async_trait;
use quire_common::Purpose;
use serde::{Deserialize, Serialize};

/// Expected CAPTCHA answer held server-side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChallenge {
    /// SHA-256 (hex) of the normalised code
    pub answer_digest: String,
    /// Creation timestamp
    pub issued_at: i64,
    /// Expiry timestamp
    pub expires_at: i64,
}

impl StoredChallenge {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

/// Storage for session-bound challenges.
///
/// Implementations must keep one slot per `(session_id, purpose)`: `put`
/// overwrites, `take` removes and returns atomically.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store the expected answer, replacing any previous one for this purpose
    async fn put_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
        challenge: StoredChallenge,
        ttl_secs: u64,
    ) -> Result<()>;

    /// Remove and return the expected answer, if any
    async fn take_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
    ) -> Result<Option<StoredChallenge>>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;
}

/// Generate a random session id (128 bits, URL-safe)
pub fn generate_session_id() -> String {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use rand::Rng;

    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
