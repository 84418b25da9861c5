//! Signing and verification of access and refresh tokens.
//!
//! The two token kinds carry distinct claim shapes and are never
//! interchangeable: verification checks the `typ` claim after the
//! signature, so a well-signed refresh token presented as an access token
//! (or vice versa) is rejected.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by a short-lived bearer access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub typ: TokenKind,
    /// Session id ("jti") the token is bound to.
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by a rotating refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub sid: String,
    pub typ: TokenKind,
    /// Device id grouping the token family.
    pub did: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature or claims are invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
            TokenError::Malformed
        }
        _ => TokenError::Invalid,
    }
}

pub fn issue_access_token(
    user_id: UserId,
    email: &str,
    session_id: &str,
    secret: &str,
    ttl_minutes: i64,
) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        typ: TokenKind::Access,
        sid: session_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(ttl_minutes)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;
    Ok(token)
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<AccessClaims, TokenError> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(classify)?;

    if data.claims.typ != TokenKind::Access {
        return Err(TokenError::Invalid);
    }
    Ok(data.claims)
}

pub fn issue_refresh_token(
    user_id: UserId,
    email: &str,
    session_id: &str,
    device_id: &str,
    secret: &str,
    ttl_days: i64,
) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = RefreshClaims {
        sub: user_id.to_string(),
        sid: session_id.to_string(),
        typ: TokenKind::Refresh,
        did: device_id.to_string(),
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(ttl_days)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;
    Ok(token)
}

pub fn verify_refresh_token(token: &str, secret: &str) -> Result<RefreshClaims, TokenError> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(classify)?;

    if data.claims.typ != TokenKind::Refresh {
        return Err(TokenError::Invalid);
    }
    Ok(data.claims)
}
