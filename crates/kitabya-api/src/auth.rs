use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use kitabya_types::api::{AuthResponse, Envelope};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::users::get_profile;

// Both routes sit behind `require_auth`, which has already created or linked
// the local user by the time they run.

pub async fn login(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = get_profile(&state, &user.id).await?;
    info!("User {} signed in", profile.id);
    Ok(Json(
        Envelope::ok(AuthResponse { user: profile }).with_message("Login successful"),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = get_profile(&state, &user.id).await?;
    Ok(Json(
        Envelope::ok(AuthResponse { user: profile })
            .with_message("User profile retrieved successfully"),
    ))
}
