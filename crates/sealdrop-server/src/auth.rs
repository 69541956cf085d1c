//! Challenge-response login and bearer session validation.
//!
//! A client proves possession of its identity key by signing a single-use
//! nonce. A good signature earns a session token with a fixed lifetime.
//! Challenges and sessions both expire lazily: expiry is checked when they
//! are read, and an expired row is removed by that read.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, SubsecRound, Utc};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use sealdrop_shared::constants::{
    CHALLENGE_NONCE_BYTES, CHALLENGE_TTL_SECS, SESSION_TOKEN_BYTES, SESSION_TTL_SECS,
};
use sealdrop_shared::crypto::random_bytes;
use sealdrop_shared::encoding;
use sealdrop_shared::identity::verify_signature;
use sealdrop_shared::models::{Challenge, Session};
use sealdrop_shared::protocol::{AuthChallenge, AuthResponse};
use sealdrop_store::{Storage, StoreError};

use crate::error::ServerError;

/// Current time at the precision the store persists.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Lifetimes of issued sessions and outstanding challenges.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    pub session_ttl: Duration,
    pub challenge_ttl: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(SESSION_TTL_SECS as u64),
            challenge_ttl: Duration::from_secs(CHALLENGE_TTL_SECS as u64),
        }
    }
}

/// The identity attached to a request that presented a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub token: String,
}

pub struct Authenticator {
    storage: Arc<Storage>,
    policy: AuthPolicy,
}

impl Authenticator {
    pub fn new(storage: Arc<Storage>, policy: AuthPolicy) -> Self {
        Self { storage, policy }
    }

    /// Issue a fresh nonce for a registered user, replacing any outstanding one.
    pub fn issue_challenge(&self, username: &str) -> Result<AuthChallenge, ServerError> {
        match self.storage.get_user(username) {
            Ok(_) => {}
            Err(StoreError::NotFound) => return Err(ServerError::NotFound("user")),
            Err(e) => return Err(e.into()),
        }

        let raw = random_bytes::<CHALLENGE_NONCE_BYTES>()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let challenge = Challenge {
            username: username.to_string(),
            nonce: encoding::encode(&raw),
            created_at: now(),
        };
        self.storage.put_challenge(&challenge)?;

        info!(username, "challenge issued");
        Ok(AuthChallenge {
            username: challenge.username,
            nonce: challenge.nonce,
        })
    }

    /// Consume the outstanding challenge and, if the signature over it
    /// verifies, mint a session.
    ///
    /// The challenge is gone after this call whatever the outcome.
    pub fn login(&self, response: &AuthResponse) -> Result<Session, ServerError> {
        self.login_at(response, now())
    }

    pub(crate) fn login_at(
        &self,
        response: &AuthResponse,
        now: DateTime<Utc>,
    ) -> Result<Session, ServerError> {
        let username = response.username.as_str();

        let Some(challenge) = self.storage.take_challenge(username)? else {
            warn!(username, "login rejected: no outstanding challenge");
            return Err(ServerError::Unauthorized);
        };

        // A lifetime past the end of the calendar never runs out.
        let deadline = challenge
            .created_at
            .checked_add_signed(ttl(self.policy.challenge_ttl)?);
        if deadline.is_some_and(|deadline| deadline <= now) {
            warn!(username, "login rejected: challenge expired");
            return Err(ServerError::Unauthorized);
        }

        let nonce_matches: bool = challenge
            .nonce
            .as_bytes()
            .ct_eq(response.nonce.as_bytes())
            .into();
        if !nonce_matches {
            warn!(username, "login rejected: nonce mismatch");
            return Err(ServerError::Unauthorized);
        }

        let user = match self.storage.get_user(username) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                warn!(username, "login rejected: user vanished");
                return Err(ServerError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = verify_signature(
            &user.identity_public_key,
            response.nonce.as_bytes(),
            &response.signature,
        ) {
            warn!(username, error = %e, "login rejected: bad signature");
            return Err(ServerError::Unauthorized);
        }

        let token = random_bytes::<SESSION_TOKEN_BYTES>()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let session = Session {
            token: hex::encode(token),
            username: user.username,
            expires_at: offset(now, self.policy.session_ttl)?,
        };
        self.storage.create_session(&session)?;

        info!(username = %session.username, expires_at = %session.expires_at, "login succeeded");
        Ok(session)
    }

    /// Validate an `Authorization` header value.
    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthenticatedUser, ServerError> {
        self.authenticate_at(header, now())
    }

    pub(crate) fn authenticate_at(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedUser, ServerError> {
        let Some(token) = header.and_then(parse_bearer) else {
            debug!("missing or malformed authorization header");
            return Err(ServerError::Unauthorized);
        };

        match self.storage.lookup_live_session(token, now)? {
            Some(session) => Ok(AuthenticatedUser {
                username: session.username,
                token: session.token,
            }),
            None => {
                debug!("unknown or expired session token");
                Err(ServerError::Unauthorized)
            }
        }
    }

    /// Revoke one session. Revoking an unknown token is not an error.
    pub fn logout(&self, user: &AuthenticatedUser) -> Result<(), ServerError> {
        if self.storage.delete_session(&user.token)? {
            info!(username = %user.username, "logged out");
        }
        Ok(())
    }

    /// Drop expired sessions and stale challenges. Returns both counts.
    pub fn purge_expired(&self) -> Result<(usize, usize), ServerError> {
        let now = now();
        let sessions = self.storage.purge_expired_sessions(now)?;
        let challenges = self
            .storage
            .purge_stale_challenges(
                now.checked_sub_signed(ttl(self.policy.challenge_ttl)?)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            )?;
        Ok((sessions, challenges))
    }
}

fn ttl(d: Duration) -> Result<chrono::Duration, ServerError> {
    chrono::Duration::from_std(d).map_err(|_| ServerError::Internal("ttl out of range".into()))
}

/// `at + d`, failing instead of overflowing the calendar.
fn offset(at: DateTime<Utc>, d: Duration) -> Result<DateTime<Utc>, ServerError> {
    at.checked_add_signed(ttl(d)?)
        .ok_or_else(|| ServerError::Internal("ttl out of range".into()))
}

/// Extract the token from `Bearer <token>`.
///
/// Exactly two space-separated parts are accepted, with the scheme spelled
/// `Bearer`.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Extractor for routes that require a session.
pub struct AuthUser(pub AuthenticatedUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<Authenticator>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<Authenticator>::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        auth.authenticate(header).map(AuthUser)
    }
}
