//! Custom Axum extractors.
//!
//! OAuth/OIDC and passkey protocol handling are out of scope;
//! this layer only trusts whatever identity an upstream gateway has already
//! resolved and attached as a header, mirroring
//! `openibank-api::extractors::AuthenticatedUser` reading from request
//! extensions set by its auth middleware — simplified here to a header read
//! since the protocol that populates it isn't this crate's concern.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};

use messaging_types::MessagingError;

use crate::error::ApiError;

const USER_ID_HEADER: &str = "x-user-id";

/// The caller's identity, trusted from upstream auth.
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| AuthenticatedUser(v.to_string()))
            .ok_or_else(|| ApiError::from(MessagingError::AuthRequired).into_response())
    }
}

/// The client IP used for rate-limit/abuse fingerprinting, read from the
/// common reverse-proxy headers.
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .or_else(|| parts.headers.get("x-real-ip"))
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string());
        Ok(ClientIp(ip))
    }
}
