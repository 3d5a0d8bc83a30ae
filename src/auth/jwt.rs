//! JWT Token Service
//!
//! Issues and validates the stateless HS256 bearer tokens that stand in for a
//! login session. Nothing is stored server-side: a token is valid exactly when
//! its signature checks out under the configured secret and its expiry has not
//! been reached.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::database::models::UserId;

/// Lifetime of an access token unless configured otherwise.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 45;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT Claims structure
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User identifier, as a decimal string
    pub sub: String,
    /// Token issued at timestamp
    pub iat: i64,
    /// Token expiration timestamp
    pub exp: i64,
}

/// Claims as they arrive, before their types are checked.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClaims {
    sub: Option<Value>,
    exp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signing secret is empty")]
    MissingSecret,
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("token is malformed")]
    MalformedToken,
    #[error("token was not signed with HS256")]
    UnexpectedAlgorithm,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token claims are malformed")]
    MalformedClaims,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenError::UnexpectedAlgorithm
            }
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature => TokenError::MalformedClaims,
            _ => TokenError::MalformedToken,
        }
    }
}

/// JWT Service for token operations
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    /// Create a token service signing with `secret`. An empty secret is refused.
    pub fn new(secret: &str, ttl: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        // Claim presence, types and expiry are checked in `validate_at`
        // against the caller's clock with no leeway.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a token for a user, valid for the configured TTL from now
    pub fn issue(&self, user_id: UserId) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate a token and return the user it was issued to
    pub fn validate(&self, token: &str) -> Result<UserId, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Same as [`validate`](Self::validate) with an explicit clock.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, TokenError> {
        check_algorithm(token)?;
        let claims = decode::<RawClaims>(token, &self.decoding_key, &self.validation)?.claims;

        let exp = claims
            .exp
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or(TokenError::MalformedClaims)?;
        let user_id = claims
            .sub
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|sub| sub.parse::<UserId>().ok())
            .ok_or(TokenError::MalformedClaims)?;

        if now.timestamp() >= exp {
            return Err(TokenError::Expired);
        }
        Ok(user_id)
    }
}

/// Reads `alg` from the token header. Anything but HS256, including `none`,
/// is refused before the signature is looked at.
fn check_algorithm(token: &str) -> Result<(), TokenError> {
    let (header, _) = token.split_once('.').ok_or(TokenError::MalformedToken)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::MalformedToken)?;
    let header: Value = serde_json::from_slice(&bytes).map_err(|_| TokenError::MalformedToken)?;

    match header.get("alg").and_then(Value::as_str) {
        Some("HS256") => Ok(()),
        _ => Err(TokenError::UnexpectedAlgorithm),
    }
}
