use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate};
use tracing::info;

use kitabya_db::models::ProfilePatch;
use kitabya_types::api::{Envelope, RegisterRequest, UserProfile};
use kitabya_types::models::OwnerSummary;

use crate::blob::Upload;
use crate::convert::user_profile;
use crate::error::ApiError;
use crate::listings::{discard_blobs, upload_all};
use crate::middleware::CurrentUser;
use crate::state::{AppState, AppStateInner};
use crate::upload::read_form;

const PHOTO_FOLDER: &str = "profiles";

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp; stores the date part.
pub fn parse_date_of_birth(raw: &str) -> Result<String, ApiError> {
    let raw = raw.trim();
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .ok_or_else(|| ApiError::validation("dateOfBirth must be a date (YYYY-MM-DD)"))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Create a user ahead of their first sign-in. Registering an email that is
/// already known returns the existing user.
pub async fn register(
    state: &AppStateInner,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<OwnerSummary, ApiError> {
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    let email = email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
    let (Some(name), Some(email)) = (name, email) else {
        return Err(ApiError::validation("Name and email are required"));
    };
    if !email.contains('@') {
        return Err(ApiError::validation("email must be a valid address"));
    }

    let name = name.to_string();
    let (user, _) = state.with_db(move |db| db.register_user(&name, &email)).await?;
    Ok(OwnerSummary {
        id: user.id,
        name: user.name,
        email: user.email,
    })
}

pub async fn get_profile(state: &AppStateInner, user_id: &str) -> Result<UserProfile, ApiError> {
    let id = user_id.to_string();
    let user = state
        .with_db(move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(user_profile(user))
}

/// Apply profile changes. A new photo replaces the old one, whose blob is
/// then removed on a best-effort basis.
pub async fn update_profile(
    state: &AppStateInner,
    user_id: &str,
    mut patch: ProfilePatch,
    photo: Option<Upload>,
) -> Result<UserProfile, ApiError> {
    let uploaded = match photo {
        Some(photo) => upload_all(state, PHOTO_FOLDER, std::slice::from_ref(&photo)).await?,
        None => Vec::new(),
    };
    patch.photo_url = uploaded.first().cloned();

    let id = user_id.to_string();
    let result = state.with_db(move |db| db.update_profile(&id, &patch)).await;

    let (user, replaced) = match result {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            discard_blobs(state, &uploaded).await;
            return Err(ApiError::not_found("User"));
        }
        Err(e) => {
            discard_blobs(state, &uploaded).await;
            return Err(e);
        }
    };

    if let Some(old) = replaced {
        discard_blobs(state, &[old]).await;
    }
    info!("User {} updated their profile", user.id);
    Ok(user_profile(user))
}

// -- Handlers --

pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let user = register(&state, req.name.as_deref(), req.email.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(user).with_message("User registered successfully")),
    ))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = get_profile(&state, &user.id).await?;
    Ok(Json(Envelope::ok(profile)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_form(multipart?, "photo", 1).await?;

    let patch = ProfilePatch {
        name: form.text("name").map(str::to_string),
        location: form.text("location").map(str::to_string),
        date_of_birth: form.text("dateOfBirth").map(parse_date_of_birth).transpose()?,
        photo_url: None,
    };
    let photo = form.files.pop();

    let profile = update_profile(&state, &user.id, patch, photo).await?;
    Ok(Json(Envelope::ok(profile).with_message("Profile updated successfully")))
}
