//! Request extractors: caller identity, path parameters and JSON bodies.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Path, Request};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::SharedState;
use crate::auth::AuthError;
use crate::services::{RequestContext, ServiceError};

const BEARER_PREFIX: &str = "Bearer ";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// The caller behind a request.
///
/// No `Authorization` header yields an anonymous context; services decide
/// whether that is acceptable. A header that is present but does not carry
/// a valid bearer token is rejected with 401 here.
pub struct Ctx(pub RequestContext);

#[async_trait]
impl FromRequestParts<SharedState> for Ctx {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let actor = match bearer_token(&parts.headers)? {
            Some(token) => Some(state.auth.authenticate(token)?),
            None => None,
        };

        Ok(Ctx(RequestContext {
            actor,
            ip_address: client_ip(parts),
            user_agent: header_str(&parts.headers, USER_AGENT.as_str()),
        }))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ServiceError::from(AuthError::InvalidToken(
                "expected `Authorization: Bearer <token>`".to_string(),
            ))
        })?;
    Ok(Some(token))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// First `X-Forwarded-For` hop, else the peer address.
fn client_ip(parts: &Parts) -> Option<String> {
    if let Some(forwarded) = header_str(&parts.headers, FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return Some(first.to_string());
        }
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// `Path` with rejections rendered in the API's error envelope.
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}

/// `Json` with rejections rendered in the API's error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}
