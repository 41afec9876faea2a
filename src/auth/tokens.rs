//! Signed bearer tokens.
//!
//! Session tokens and activation tokens share one HS256 format and one
//! secret. The `purpose` claim keeps them apart, so an activation link cannot
//! be replayed as a login and a session cannot activate an account.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Session,
    Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id (or, for older tokens, a federation subject id)
    pub id: String,
    pub purpose: TokenPurpose,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Token issued for a different purpose")]
    WrongPurpose,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AppError::Internal(msg),
            _ => AppError::Unauthorized("Invalid or expired token".into()),
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: Duration,
    activation_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.token_secret.as_bytes()),
            session_ttl: Duration::days(config.session_days),
            activation_ttl: Duration::minutes(config.activation_minutes),
        }
    }

    pub fn issue_session(&self, user_id: &str) -> Result<String, TokenError> {
        self.issue(user_id, TokenPurpose::Session, self.session_ttl)
    }

    pub fn issue_activation(&self, user_id: &str) -> Result<String, TokenError> {
        self.issue(user_id, TokenPurpose::Activation, self.activation_ttl)
    }

    pub fn verify_session(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenPurpose::Session)
    }

    pub fn verify_activation(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenPurpose::Activation)
    }

    fn issue(&self, user_id: &str, purpose: TokenPurpose, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            id: user_id.to_string(),
            purpose,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        // header.payload.signature
        if token.is_empty() || token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    TokenError::Malformed
                }
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.purpose != purpose {
            return Err(TokenError::WrongPurpose);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(&AuthConfig {
            token_secret: secret.to_string(),
            ..Default::default()
        })
    }

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn session_token_round_trips() {
        let tokens = issuer(SECRET);
        let token = tokens.issue_session("user-1").unwrap();
        let claims = tokens.verify_session(&token).unwrap();
        assert_eq!(claims.id, "user-1");
        assert_eq!(claims.purpose, TokenPurpose::Session);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn activation_token_lasts_thirty_minutes() {
        let tokens = issuer(SECRET);
        let token = tokens.issue_activation("user-1").unwrap();
        let claims = tokens.verify_activation(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn purposes_are_not_interchangeable() {
        let tokens = issuer(SECRET);
        let session = tokens.issue_session("user-1").unwrap();
        let activation = tokens.issue_activation("user-1").unwrap();
        assert_eq!(
            tokens.verify_activation(&session).unwrap_err(),
            TokenError::WrongPurpose
        );
        assert_eq!(
            tokens.verify_session(&activation).unwrap_err(),
            TokenError::WrongPurpose
        );
    }

    #[test]
    fn malformed_structure_is_rejected() {
        let tokens = issuer(SECRET);
        assert_eq!(tokens.verify_session("").unwrap_err(), TokenError::Malformed);
        assert_eq!(
            tokens.verify_session("only.two").unwrap_err(),
            TokenError::Malformed
        );
        assert_eq!(
            tokens.verify_session("a.b.c.d").unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let token = issuer(SECRET).issue_session("user-1").unwrap();
        let other = issuer("another-secret-that-is-also-long-enough");
        assert_eq!(other.verify_session(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenIssuer::new(&AuthConfig {
            token_secret: SECRET.to_string(),
            session_days: -1,
            ..Default::default()
        });
        let token = tokens.issue_session("user-1").unwrap();
        assert_eq!(tokens.verify_session(&token).unwrap_err(), TokenError::Expired);
    }
}
