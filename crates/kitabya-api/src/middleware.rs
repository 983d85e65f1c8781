use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use tracing::debug;

use kitabya_db::models::SignIn;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub subject: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn ensure_admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin access required".into()))
        }
    }
}

/// Verify the bearer credential and resolve it to a local user.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|e| {
        debug!("Missing bearer credential: {}", e);
        ApiError::Unauthorized("Authentication required".into())
    })?;

    let identity = state.identity.verify(bearer.token()).await?;
    let grant_admin = state.is_admin_email(&identity.email);

    let subject = identity.subject.clone();

    let user = state
        .with_db(move |db| {
            db.resolve_user(SignIn {
                subject: &identity.subject,
                email: &identity.email,
                name: identity.name.as_deref(),
                picture: identity.picture.as_deref(),
                grant_admin,
            })
        })
        .await?;

    req.extensions_mut().insert(CurrentUser {
        id: user.id,
        subject,
        email: user.email,
        name: user.name,
        is_admin: user.is_admin,
    });
    Ok(next.run(req).await)
}
