//! Signed session cookie and the per-request session extractor.

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, header, request::Parts},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::convert::Infallible;

use quire_common::constants::SESSION_COOKIE;

use super::generate_session_id;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Signs and checks session ids so clients cannot pick their own
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size")
    }

    /// `{id}.{signature}`
    pub fn sign(&self, session_id: &str) -> String {
        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{session_id}.{signature}")
    }

    /// Returns the session id if the signature checks out
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (session_id, signature) = cookie_value.rsplit_once('.')?;
        if session_id.is_empty() {
            return None;
        }
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        Some(session_id.to_string())
    }
}

/// The caller's session for this request
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: String,
    /// Set when no valid cookie came in; the response must carry a new one
    set_cookie: Option<String>,
}

impl SessionContext {
    /// Resolve the session from request headers, minting one if needed
    pub fn resolve(headers: &axum::http::HeaderMap, signer: &SessionSigner) -> Self {
        let existing = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .and_then(|(_, value)| signer.verify(value));

        match existing {
            Some(id) => Self { id, set_cookie: None },
            None => {
                let id = generate_session_id();
                let cookie = format!(
                    "{}={}; Path=/; HttpOnly; SameSite=Lax",
                    SESSION_COOKIE,
                    signer.sign(&id)
                );
                tracing::debug!(session_id = %id, "Started new session");
                Self {
                    id,
                    set_cookie: Some(cookie),
                }
            }
        }
    }

    pub fn is_new(&self) -> bool {
        self.set_cookie.is_some()
    }

    /// Attach the session cookie to a response when the session was just created
    pub fn attach(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(cookie) = self
            .set_cookie
            .as_deref()
            .and_then(|cookie| HeaderValue::from_str(cookie).ok())
        {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        response
    }
}

impl FromRequestParts<AppState> for SessionContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(&parts.headers, &state.signer))
    }
}
