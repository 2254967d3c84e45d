//! Admin-only handlers under `/api/v1/admin`.

use super::SiteQuery;
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use remark42::backup;
use remark42::cache::{comment_scopes, LAST_COMMENTS_SCOPE};
use remark42::store::{BlockedUser, Comment, DeleteMode, Locator};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub site: String,
    pub url: String,
    /// `hard` also erases the author's identity.
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PinQuery {
    pub site: String,
    pub url: String,
    pub pin: i32,
}

#[derive(Debug, Deserialize)]
pub struct BlockQuery {
    pub site: String,
    pub block: i32,
    /// Block duration in seconds, 0 or missing is permanent.
    #[serde(default)]
    pub ttl: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReadOnlyQuery {
    pub site: String,
    pub url: String,
    pub ro: i32,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub site: String,
    pub verified: i32,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: String,
    pub locator: Locator,
}

#[derive(Debug, Serialize)]
pub struct UserStatus {
    pub user_id: String,
    pub site_id: String,
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadOnlyResponse {
    pub locator: Locator,
    pub read_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub status: &'static str,
    pub size: usize,
}

fn require_admin(state: &AppState, site_id: &str, principal: &Principal) -> ApiResult<()> {
    if state.service.is_admin(site_id, &principal.0.id) {
        Ok(())
    } else {
        Err(ApiError::admin_only())
    }
}

/// Delete a comment, soft by default
#[instrument(skip(state, principal))]
pub async fn delete_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<Json<DeletedResponse>> {
    require_admin(&state, &query.site, &principal)?;
    let locator = Locator::new(query.site.as_str(), query.url.as_str());
    let mode = match query.mode.as_deref() {
        Some("hard") => DeleteMode::Hard,
        _ => DeleteMode::Soft,
    };

    let author = state.service.get(&locator, &id)?.user.id;
    state.service.delete(&locator, &id, mode)?;
    state.flush(&comment_scopes(&locator, &author));

    Ok(Json(DeletedResponse { id, locator }))
}

/// Pin or unpin a comment
#[instrument(skip(state, principal))]
pub async fn pin(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Query(query): Query<PinQuery>,
) -> ApiResult<Json<Comment>> {
    require_admin(&state, &query.site, &principal)?;
    let locator = Locator::new(query.site.as_str(), query.url.as_str());
    let comment = state.service.set_pin(&locator, &id, query.pin == 1)?;
    state.flush(&comment_scopes(&locator, &comment.user.id));
    Ok(Json(comment))
}

/// Block or unblock a user
#[instrument(skip(state, principal))]
pub async fn block(
    State(state): State<AppState>,
    principal: Principal,
    Path(uid): Path<String>,
    Query(query): Query<BlockQuery>,
) -> ApiResult<Json<UserStatus>> {
    require_admin(&state, &query.site, &principal)?;
    let status = query.block == 1;
    state
        .service
        .set_block(&query.site, &uid, status, Duration::from_secs(query.ttl))?;
    // a block changes every view that shows the user's comments
    state.flush(&[query.site.clone()]);
    info!(site = %query.site, user = %uid, blocked = status, "user block updated");

    Ok(Json(UserStatus {
        user_id: uid,
        site_id: query.site,
        status,
    }))
}

/// Currently blocked users
#[instrument(skip(state, principal))]
pub async fn blocked(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<SiteQuery>,
) -> ApiResult<Json<Vec<BlockedUser>>> {
    require_admin(&state, &query.site, &principal)?;
    Ok(Json(state.service.blocked(&query.site)?))
}

/// Erase a user's identity from all their comments
#[instrument(skip(state, principal))]
pub async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(uid): Path<String>,
    Query(query): Query<SiteQuery>,
) -> ApiResult<Json<UserStatus>> {
    require_admin(&state, &query.site, &principal)?;
    state.service.delete_user(&query.site, &uid)?;
    state.flush(&[
        query.site.clone(),
        uid.clone(),
        LAST_COMMENTS_SCOPE.to_string(),
    ]);
    info!(site = %query.site, user = %uid, "user deleted");

    Ok(Json(UserStatus {
        user_id: uid,
        site_id: query.site,
        status: true,
    }))
}

/// Mark a post read-only or writable
#[instrument(skip(state, principal))]
pub async fn read_only(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ReadOnlyQuery>,
) -> ApiResult<Json<ReadOnlyResponse>> {
    require_admin(&state, &query.site, &principal)?;
    let locator = Locator::new(query.site.as_str(), query.url.as_str());
    let status = query.ro == 1;
    state.service.set_read_only(&locator, status)?;
    state.flush(&[query.site.clone(), query.url.clone()]);

    Ok(Json(ReadOnlyResponse {
        locator,
        read_only: status,
    }))
}

/// Mark a user verified or not
#[instrument(skip(state, principal))]
pub async fn verify(
    State(state): State<AppState>,
    principal: Principal,
    Path(uid): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<Json<UserStatus>> {
    require_admin(&state, &query.site, &principal)?;
    let status = query.verified == 1;
    state.service.set_verified(&query.site, &uid, status)?;
    state.flush(&[query.site.clone()]);

    Ok(Json(UserStatus {
        user_id: uid,
        site_id: query.site,
        status,
    }))
}

/// Download all comments of a site as JSON lines
#[instrument(skip(state, principal))]
pub async fn export(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<SiteQuery>,
) -> ApiResult<Response> {
    require_admin(&state, &query.site, &principal)?;
    let mut body = Vec::new();
    let exported = backup::export(state.service.engine().as_ref(), &query.site, &mut body)?;
    info!(site = %query.site, comments = exported, "site exported");

    let disposition = format!(
        "attachment; filename=\"{}-{}.json\"",
        query.site,
        chrono::Utc::now().format("%Y%m%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Replace all comments of a site from a JSON lines body
#[instrument(skip(state, principal, body))]
pub async fn import(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<SiteQuery>,
    body: Bytes,
) -> ApiResult<Json<ImportResponse>> {
    require_admin(&state, &query.site, &principal)?;
    let size = backup::import(state.service.engine().as_ref(), &query.site, body.as_ref())?;
    state.flush(&[query.site.clone(), LAST_COMMENTS_SCOPE.to_string()]);

    Ok(Json(ImportResponse { status: "ok", size }))
}
