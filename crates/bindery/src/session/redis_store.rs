//! Redis-backed session store, for running several Bindery instances.

use anyhow::{Context, Result};
use async_trait::async_trait;
use quire_common::Purpose;
use quire_common::constants::redis_keys::CAPTCHA_PREFIX;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{SessionStore, StoredChallenge};

/// Session store keyed as `captcha:{session_id}:{purpose}` with a TTL
#[derive(Clone)]
pub struct RedisSessionStore {
    /// Redis connection manager (auto-reconnecting)
    redis: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect to Redis with connection manager (handles reconnection)
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self { redis })
    }

    fn key(session_id: &str, purpose: Purpose) -> String {
        format!("{}{}:{}", CAPTCHA_PREFIX, session_id, purpose)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
        challenge: StoredChallenge,
        ttl_secs: u64,
    ) -> Result<()> {
        let key = Self::key(session_id, purpose);
        let value = serde_json::to_string(&challenge)?;

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(&key, &value, ttl_secs.max(1))
            .await
            .context("Failed to store challenge")?;

        Ok(())
    }

    async fn take_challenge(
        &self,
        session_id: &str,
        purpose: Purpose,
    ) -> Result<Option<StoredChallenge>> {
        let key = Self::key(session_id, purpose);

        // GET + DEL in one MULTI block so two racing submissions cannot both read it
        let mut conn = self.redis.clone();
        let (stored, _): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(&key)
            .del(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to fetch challenge")?;

        match stored {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}
