//! Principal supplied by the upstream authentication layer.
//!
//! OAuth happens in front of this server; the authenticated user arrives
//! in request headers.

use crate::error::ApiError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use remark42::store::User;

pub const USER_ID_HEADER: &str = "x-remark-user-id";
pub const USER_NAME_HEADER: &str = "x-remark-user-name";
pub const USER_PICTURE_HEADER: &str = "x-remark-user-picture";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Authenticated user of a request. `user.ip_hash` holds the raw client
/// address until the data service hashes it.
#[derive(Debug, Clone)]
pub struct Principal(pub User);

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(&parts.headers, USER_ID_HEADER).ok_or_else(ApiError::unauthorized)?;
        let name = header(&parts.headers, USER_NAME_HEADER).unwrap_or_else(|| id.clone());
        let mut user = User::new(id, name);
        user.picture = header(&parts.headers, USER_PICTURE_HEADER).unwrap_or_default();
        user.ip_hash = header(&parts.headers, REAL_IP_HEADER).unwrap_or_default();
        Ok(Principal(user))
    }
}
