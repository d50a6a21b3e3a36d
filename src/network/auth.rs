//! JWT Player Tokens
//!
//! Registration issues an HS256 token binding a player id to its session.
//! A client that reconnects presents the token instead of registering again.

use std::time::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::game::player::PlayerId;
use crate::network::session::SessionId;

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Issuer claim ("iss") written and required. If None, any issuer accepted.
    pub issuer: Option<String>,
    /// HS256 secret.
    pub secret: Option<String>,
    /// Lifetime of issued tokens.
    pub token_ttl: Duration,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Config with a random per-process secret. Tokens die with the process.
    pub fn ephemeral() -> Self {
        Self {
            issuer: Some("powergrid-server".into()),
            secret: Some(uuid::Uuid::new_v4().simple().to_string()),
            token_ttl: Duration::from_secs(24 * 3600),
            skip_expiry: false,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::ephemeral();
        match std::env::var("AUTH_SECRET") {
            Ok(secret) if !secret.is_empty() => config.secret = Some(secret),
            _ => warn!("AUTH_SECRET not set, using an ephemeral secret"),
        }
        if let Ok(issuer) = std::env::var("AUTH_ISSUER") {
            config.issuer = Some(issuer);
        }
        if let Some(secs) = std::env::var("AUTH_TOKEN_TTL_SECS").ok().and_then(|v| v.parse().ok()) {
            config.token_ttl = Duration::from_secs(secs);
        }
        config.skip_expiry = std::env::var("AUTH_SKIP_EXPIRY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        config
    }

    /// Check if authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

/// Claims carried by a player token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Player id (UUID).
    pub sub: String,
    /// Session id (hex).
    pub sid: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenClaims {
    /// Player id from the subject claim.
    pub fn player_id(&self) -> Option<PlayerId> {
        PlayerId::from_uuid_str(&self.sub)
    }

    /// Session id from the `sid` claim.
    pub fn session_id(&self) -> Option<SessionId> {
        hex::decode(&self.sid).ok()?.try_into().ok()
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No secret configured on server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Required claim is missing or malformed.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT encoding error.
    #[error("encode error: {0}")]
    EncodeError(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Issue a token for a seated player.
pub fn issue_token(
    player_id: &PlayerId,
    session_id: &SessionId,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let secret = config.secret.as_ref().ok_or(AuthError::NotConfigured)?;
    let iat = now_secs();
    let claims = TokenClaims {
        sub: player_id.to_uuid_string(),
        sid: hex::encode(session_id),
        exp: iat + config.token_ttl.as_secs(),
        iat,
        iss: config.issuer.clone(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::EncodeError(e.to_string()))
}

/// Validate a JWT token and extract claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let secret = config.secret.as_ref().ok_or(AuthError::NotConfigured)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims = std::collections::HashSet::new();
    validation.validate_aud = false;

    // Set expected issuer (if not set, any issuer is accepted)
    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }
    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data: TokenData<TokenClaims> = decode(token, &key, &validation).map_err(map_jwt_error)?;
    let claims = token_data.claims;

    if claims.player_id().is_none() {
        return Err(AuthError::MissingClaim("sub".into()));
    }
    if claims.session_id().is_none() {
        return Err(AuthError::MissingClaim("sid".into()));
    }

    // Manual expiry check (in case validation was skipped)
    if !config.skip_expiry && claims.exp > 0 && now_secs() > claims.exp {
        return Err(AuthError::Expired);
    }

    Ok(claims)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
