//! Request handlers for the public API.

pub mod admin;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use remark42::cache::{comment_scopes, Key, LAST_COMMENTS_SCOPE};
use remark42::moderation::ModerationView;
use remark42::service::EditRequest;
use remark42::store::{Comment, Locator, SortOrder};
use remark42::tree::{make_tree, post_info};
use remark42::RemarkError;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

// ============================================================================
// Request and response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LocatorQuery {
    pub site: String,
    pub url: String,
}

impl LocatorQuery {
    pub fn locator(&self) -> Locator {
        Locator::new(self.site.as_str(), self.url.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct SiteQuery {
    pub site: String,
}

#[derive(Debug, Deserialize)]
pub struct FindQuery {
    pub site: String,
    pub url: String,
    pub sort: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LastQuery {
    pub site: String,
    /// RFC 3339 time or unix milliseconds.
    pub since: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub site: String,
    pub user: String,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub site: String,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

#[derive(Debug, Deserialize)]
pub struct VoteQuery {
    pub site: String,
    pub url: String,
    pub vote: i32,
}

#[derive(Debug, Deserialize)]
pub struct EditBody {
    pub text: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub delete: bool,
}

#[derive(Debug, Serialize)]
pub struct CommentsWithInfo {
    pub comments: Vec<Comment>,
    pub info: remark42::store::PostInfo,
}

#[derive(Debug, Serialize)]
pub struct UserComments {
    pub comments: Vec<Comment>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub id: String,
    pub score: i64,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub url: String,
    pub count: usize,
}

// ============================================================================
// Helpers
// ============================================================================

fn is_admin(state: &AppState, site_id: &str, viewer: Option<&Principal>) -> bool {
    viewer.is_some_and(|p| state.service.is_admin(site_id, &p.0.id))
}

/// Serves a JSON response from the cache, loading it on a miss.
fn cached<T, F>(state: &AppState, key: Key, load: F) -> ApiResult<Response>
where
    T: Serialize,
    F: Fn() -> remark42::Result<T>,
{
    let bytes = state.cache.get(&key, None, &|| {
        let value = load()?;
        Ok(serde_json::to_vec(&value)?)
    })?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

fn parse_since(since: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(raw) = since.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(Some)
        .ok_or_else(|| ApiError::bad_request(format!("invalid since {:?}", raw)))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn ping() -> &'static str {
    "pong"
}

/// Create a comment as the authenticated user
#[instrument(skip(state, principal, comment))]
pub async fn create_comment(
    State(state): State<AppState>,
    principal: Principal,
    Json(mut comment): Json<Comment>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    comment.prepare_untrusted();
    comment.user = principal.0;
    let mut created = state.service.create(comment)?;
    state.flush(&comment_scopes(&created.locator, &created.user.id));
    info!(locator = %created.locator, id = %created.id, "comment posted");

    created.user.ip_hash.clear();
    Ok((StatusCode::CREATED, Json(created)))
}

/// Edit or self-delete a comment
#[instrument(skip(state, principal, body))]
pub async fn edit_comment(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Query(query): Query<LocatorQuery>,
    Json(body): Json<EditBody>,
) -> ApiResult<Json<Comment>> {
    let locator = query.locator();
    let request = EditRequest {
        admin: state.service.is_admin(&locator.site_id, &principal.0.id),
        user_id: principal.0.id,
        orig: body.text,
        summary: body.summary,
        delete: body.delete,
    };
    let mut edited = state.service.edit_comment(&locator, &id, request)?;
    state.flush(&comment_scopes(&locator, &edited.user.id));

    edited.user.ip_hash.clear();
    Ok(Json(edited))
}

/// Get a single comment
#[instrument(skip(state, viewer))]
pub async fn get_comment(
    State(state): State<AppState>,
    viewer: Option<Principal>,
    Path(id): Path<String>,
    Query(query): Query<LocatorQuery>,
) -> ApiResult<Json<Comment>> {
    let locator = query.locator();
    let admin = is_admin(&state, &locator.site_id, viewer.as_ref());
    let mut comment = state.service.get(&locator, &id).map_err(ApiError::rejected)?;
    ModerationView::for_site(&state.service, &locator.site_id, admin)?.apply_one(&mut comment);
    Ok(Json(comment))
}

/// Comments of a post, plain or as a tree
#[instrument(skip(state, viewer, uri))]
pub async fn find(
    State(state): State<AppState>,
    viewer: Option<Principal>,
    uri: Uri,
    Query(query): Query<FindQuery>,
) -> ApiResult<Response> {
    let locator = Locator::new(query.site.as_str(), query.url.as_str());
    let admin = is_admin(&state, &locator.site_id, viewer.as_ref());
    let sort = SortOrder::parse(query.sort.as_deref());
    let as_tree = query.format.as_deref() == Some("tree");
    let service = &state.service;

    let key = Key::new(query.site.as_str())
        .id(uri.to_string())
        .scopes([query.site.clone(), query.url.clone()])
        .admin(admin);

    cached(&state, key, || {
        let mut comments = service.find(&locator, sort)?;
        ModerationView::for_site(service, &locator.site_id, admin)?.apply(&mut comments);
        let read_only = service.is_read_only(&locator)?;

        if as_tree {
            let mut tree = make_tree(&comments, sort);
            tree.info.url = locator.url.clone();
            tree.info.read_only = read_only;
            Ok(serde_json::to_value(tree)?)
        } else {
            let mut info = post_info(&comments);
            info.url = locator.url.clone();
            info.read_only = read_only;
            Ok(serde_json::to_value(CommentsWithInfo { comments, info })?)
        }
    })
}

/// Most recent comments of a site
#[instrument(skip(state, viewer, uri))]
pub async fn last(
    State(state): State<AppState>,
    viewer: Option<Principal>,
    uri: Uri,
    Path(max): Path<usize>,
    Query(query): Query<LastQuery>,
) -> ApiResult<Response> {
    let since = parse_since(query.since.as_deref())?;
    let admin = is_admin(&state, &query.site, viewer.as_ref());
    let service = &state.service;

    let key = Key::new(query.site.as_str())
        .id(uri.to_string())
        .scopes([query.site.clone(), LAST_COMMENTS_SCOPE.to_string()])
        .admin(admin);

    cached(&state, key, || {
        let mut comments = service.last(&query.site, max, since)?;
        ModerationView::for_site(service, &query.site, admin)?.apply(&mut comments);
        Ok(comments)
    })
}

/// Comments of one user with their total count
#[instrument(skip(state, viewer, uri))]
pub async fn user_comments(
    State(state): State<AppState>,
    viewer: Option<Principal>,
    uri: Uri,
    Query(query): Query<UserQuery>,
) -> ApiResult<Response> {
    let admin = is_admin(&state, &query.site, viewer.as_ref());
    let service = &state.service;

    let key = Key::new(query.site.as_str())
        .id(uri.to_string())
        .scopes([query.site.clone(), query.user.clone()])
        .admin(admin);

    cached(&state, key, || {
        let (mut comments, count) =
            match service.user_comments(&query.site, &query.user, query.limit, query.skip) {
                Ok(found) => found,
                Err(RemarkError::NotFound(_)) => (Vec::new(), 0),
                Err(e) => return Err(e),
            };
        ModerationView::for_site(service, &query.site, admin)?.apply(&mut comments);
        Ok(UserComments { comments, count })
    })
}

/// Number of comments of a post
#[instrument(skip(state, uri))]
pub async fn count(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<LocatorQuery>,
) -> ApiResult<Response> {
    let locator = query.locator();
    let key = Key::new(query.site.as_str())
        .id(uri.to_string())
        .scopes([query.site.clone(), query.url.clone()]);

    cached(&state, key, || {
        Ok(CountResponse {
            url: locator.url.clone(),
            count: state.service.count(&locator)?,
        })
    })
}

/// Numbers of comments of several posts
#[instrument(skip(state, uri, urls))]
pub async fn counts(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<SiteQuery>,
    Json(urls): Json<Vec<String>>,
) -> ApiResult<Response> {
    let key = Key::new(query.site.as_str())
        .id(format!("{}:{}", uri, urls.join(",")))
        .scopes([query.site.clone()]);

    cached(&state, key, || state.service.counts(&query.site, &urls))
}

/// Posts of a site, most recently commented first
#[instrument(skip(state, uri))]
pub async fn list(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<ListQuery>,
) -> ApiResult<Response> {
    let key = Key::new(query.site.as_str())
        .id(uri.to_string())
        .scopes([query.site.clone()]);

    cached(&state, key, || {
        state.service.list(&query.site, query.limit, query.skip)
    })
}

/// Vote for a comment, `vote=1` is an upvote
#[instrument(skip(state, principal))]
pub async fn vote(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<String>,
    Query(query): Query<VoteQuery>,
) -> ApiResult<Json<VoteResponse>> {
    let locator = Locator::new(query.site.as_str(), query.url.as_str());
    let voted = state
        .service
        .vote(&locator, &id, &principal.0.id, query.vote == 1)
        .map_err(ApiError::rejected)?;
    state.flush(&comment_scopes(&locator, &voted.user.id));

    Ok(Json(VoteResponse {
        id: voted.id,
        score: voted.score,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since(None).unwrap(), None);
        assert_eq!(parse_since(Some("")).unwrap(), None);

        let rfc = parse_since(Some("2024-01-02T03:04:05Z")).unwrap().unwrap();
        assert_eq!(rfc.timestamp(), 1_704_164_645);

        let millis = parse_since(Some("1704164645000")).unwrap().unwrap();
        assert_eq!(millis, rfc);

        assert!(parse_since(Some("yesterday")).is_err());
    }
}
