use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use kitabya_db::now_timestamp;
use kitabya_types::api::{
    DeletedCount, Envelope, LimitQuery, RecentSearchResponse, RecordRecentSearchRequest,
};

use crate::convert::{parse_timestamp, recent_search_response};
use crate::error::ApiError;
use crate::listings::parse_listing_id;
use crate::middleware::CurrentUser;
use crate::pagination::clamp_limit;
use crate::state::{AppState, AppStateInner};

/// What `record` hands back: the record id and its refreshed timestamp.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedSearch {
    pub id: String,
    pub product_id: String,
    pub searched_at: chrono::DateTime<chrono::Utc>,
}

/// Note that `user_id` looked at `listing_id`. Repeat views refresh the
/// existing record instead of adding one.
pub async fn record(
    state: &AppStateInner,
    user_id: &str,
    listing_id: &str,
) -> Result<RecordedSearch, ApiError> {
    let listing_id = parse_listing_id(listing_id)?;

    let user = user_id.to_string();
    let listing = listing_id.clone();
    let entry = state
        .with_db(move |db| db.upsert_recent_search(&user, &listing, &now_timestamp()))
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;

    Ok(RecordedSearch {
        id: entry.id,
        product_id: listing_id,
        searched_at: parse_timestamp(&entry.searched_at),
    })
}

pub async fn list(
    state: &AppStateInner,
    user_id: &str,
    limit: Option<u32>,
) -> Result<Vec<RecentSearchResponse>, ApiError> {
    let limit = clamp_limit(limit);
    let user = user_id.to_string();
    let rows = state
        .with_db(move |db| db.list_recent_searches(&user, limit))
        .await?;
    Ok(rows.into_iter().map(recent_search_response).collect())
}

pub async fn clear(state: &AppStateInner, user_id: &str) -> Result<usize, ApiError> {
    let user = user_id.to_string();
    let removed = state.with_db(move |db| db.clear_recent_searches(&user)).await?;
    info!("Cleared {} recent search(es) for user {}", removed, user_id);
    Ok(removed)
}

/// Remove one record; it must belong to `user_id`.
pub async fn delete_one(state: &AppStateInner, user_id: &str, id: &str) -> Result<usize, ApiError> {
    let user = user_id.to_string();
    let record = id.to_string();
    let removed = state
        .with_db(move |db| db.delete_recent_search(&user, &record))
        .await?;
    if removed == 0 {
        return Err(ApiError::not_found("Recent search"));
    }
    Ok(removed)
}

// -- Handlers --

pub async fn record_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<RecordRecentSearchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let recorded = record(&state, &user.id, &req.product_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(recorded).with_message("Recent search recorded")),
    ))
}

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let searches = list(&state, &user.id, query.limit).await?;
    Ok(Json(Envelope::ok(searches)))
}

pub async fn clear_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = clear(&state, &user.id).await?;
    Ok(Json(
        Envelope::ok(DeletedCount { deleted }).with_message("Recent searches cleared"),
    ))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = delete_one(&state, &user.id, &id).await?;
    Ok(Json(
        Envelope::ok(DeletedCount { deleted }).with_message("Recent search deleted"),
    ))
}
