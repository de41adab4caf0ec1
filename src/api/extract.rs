//! Request extractors that turn headers into identities.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;

use crate::api::AppState;
use crate::ports::VerifiedUser;
use crate::services::{Credentials, ResolvedIdentity};
use crate::EcommerceError;

pub const SESSION_HEADER: &str = "x-session-id";

fn header_str<'a>(headers: &'a HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl FromRequestParts<AppState> for Credentials {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = header_str(&parts.headers, AUTHORIZATION)
            .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
            .map(|t| t.trim().to_string());
        let session_id = header_str(&parts.headers, SESSION_HEADER).map(str::to_string);
        Ok(Self { bearer, session_id })
    }
}

/// Any caller. Mints a guest session when the request carries none.
pub struct Caller(pub ResolvedIdentity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let creds = Credentials::from_request_parts(parts, state).await?;
        Ok(Self(state.identity.resolve(&creds).await))
    }
}

/// A caller allowed to change state: a verified user or an existing guest session.
pub struct Owner(pub ResolvedIdentity);

#[async_trait]
impl FromRequestParts<AppState> for Owner {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let creds = Credentials::from_request_parts(parts, state).await.unwrap_or_default();
        Ok(Self(state.identity.resolve_for_mutation(&creds).await?))
    }
}

pub struct Admin(pub VerifiedUser);

#[async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Owner(resolved) = Owner::from_request_parts(parts, state).await.map_err(|_| EcommerceError::Forbidden)?;
        match resolved.user {
            Some(user) if user.is_admin() => Ok(Self(user)),
            _ => Err(EcommerceError::Forbidden),
        }
    }
}

/// Hands a freshly minted guest session back to the client.
pub fn with_session(resolved: &ResolvedIdentity, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    if resolved.minted {
        if let Ok(value) = HeaderValue::from_str(resolved.identity.id()) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}
