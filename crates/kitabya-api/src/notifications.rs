use axum::{
    Extension, Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
    response::IntoResponse,
};
use serde_json::{Map, Value};
use tracing::{info, warn};

use kitabya_db::models::BroadcastRow;
use kitabya_db::{new_id, now_timestamp};
use kitabya_types::api::{
    BroadcastRequest, BroadcastResponse, Envelope, PageQuery, SendNotificationRequest,
    SendNotificationResponse,
};
use kitabya_types::models::BroadcastStatus;

use crate::convert::broadcast_response;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::pagination::{Page, PageRequest};
use crate::push::{BROADCAST_TOPIC, PushMessage, PushTarget, stringify_data};
use crate::state::{AppState, AppStateInner};

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{} is required", name)))
}

fn message(title: &str, body: &str, data: Option<&Map<String, Value>>) -> Result<PushMessage, ApiError> {
    let data = stringify_data(data).map_err(|key| {
        ApiError::validation(format!(
            "data.{} must be a string, number or boolean",
            key
        ))
    })?;
    Ok(PushMessage {
        title: title.to_string(),
        body: body.to_string(),
        data,
    })
}

/// Push to one device. A token the provider no longer knows comes back as
/// [`ApiError::StaleDeviceToken`] so the caller can drop it.
pub async fn send_to_device(
    state: &AppStateInner,
    token: Option<&str>,
    title: Option<&str>,
    body: Option<&str>,
    data: Option<&Map<String, Value>>,
) -> Result<String, ApiError> {
    let token = required(token, "token")?;
    let title = required(title, "title")?;
    let body = required(body, "body")?;
    let message = message(title, body, data)?;

    let message_id = state
        .push
        .send(&PushTarget::Device(token.to_string()), &message)
        .await?;
    info!("Push notification sent: {}", message_id);
    Ok(message_id)
}

/// Push to every subscriber. The attempt is written to the broadcast log
/// whether delivery succeeds or not.
pub async fn broadcast(
    state: &AppStateInner,
    sender_id: &str,
    title: Option<&str>,
    body: Option<&str>,
    data: Option<&Map<String, Value>>,
) -> Result<BroadcastResponse, ApiError> {
    let title = required(title, "title")?;
    let body = required(body, "body")?;
    let message = message(title, body, data)?;

    let outcome = state
        .push
        .send(&PushTarget::Topic(BROADCAST_TOPIC.to_string()), &message)
        .await;

    let (status, message_id) = match &outcome {
        Ok(id) => (BroadcastStatus::Sent, Some(id.clone())),
        Err(e) => {
            warn!("Broadcast delivery failed: {}", e);
            (BroadcastStatus::Failed, None)
        }
    };

    let row = BroadcastRow {
        id: new_id(),
        title: message.title.clone(),
        body: message.body.clone(),
        data: serde_json::to_value(&message.data).map_err(anyhow::Error::from)?,
        sent_by: sender_id.to_string(),
        message_id,
        status: status.as_str().to_string(),
        created_at: now_timestamp(),
    };
    let logged = row.clone();
    state.with_db(move |db| db.insert_broadcast(&logged)).await?;

    outcome?;
    info!("Broadcast {} sent by {}", row.id, sender_id);
    Ok(broadcast_response(row))
}

pub async fn history(
    state: &AppStateInner,
    page: PageRequest,
) -> Result<Page<BroadcastResponse>, ApiError> {
    let (rows, total) = state
        .with_db(move |db| db.list_broadcasts(page.offset(), page.limit))
        .await?;
    Ok(Page {
        items: rows.into_iter().map(broadcast_response).collect(),
        pagination: page.pagination(total),
    })
}

// -- Handlers --

/// Not a public route: any signed-in caller may send, no admin flag needed.
pub async fn send(
    State(state): State<AppState>,
    body: Result<Json<SendNotificationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let message_id = send_to_device(
        &state,
        req.token.as_deref(),
        req.title.as_deref(),
        req.body.as_deref(),
        req.data.as_ref(),
    )
    .await?;

    Ok(Json(
        Envelope::ok(SendNotificationResponse { message_id })
            .with_message("Notification sent successfully"),
    ))
}

pub async fn broadcast_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    user.ensure_admin()?;
    let Json(req) = body?;
    let sent = broadcast(
        &state,
        &user.id,
        req.title.as_deref(),
        req.body.as_deref(),
        req.data.as_ref(),
    )
    .await?;

    Ok(Json(Envelope::ok(sent).with_message("Broadcast sent successfully")))
}

pub async fn history_handler(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    user.ensure_admin()?;
    let Query(query) = query?;
    let page = history(&state, PageRequest::new(query.page, query.limit)).await?;
    Ok(Json(Envelope::ok(page.items).with_pagination(page.pagination)))
}
