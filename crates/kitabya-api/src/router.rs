use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};
use chrono::Utc;
use serde_json::json;

use crate::listings::MAX_IMAGES;
use crate::middleware::require_auth;
use crate::state::AppState;
use crate::upload::MAX_FILE_SIZE;
use crate::{auth, listings, notifications, questionnaire, recent_searches, reports, search, users};

/// Room for a full set of images plus the text fields around them.
const MAX_BODY_SIZE: usize = MAX_IMAGES * MAX_FILE_SIZE + 1024 * 1024;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

/// All HTTP routes. Reads of listings are public; everything that acts on
/// behalf of a user goes through [`require_auth`].
pub fn build_router(state: AppState) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.clone(), require_auth);

    let product_routes = Router::new()
        .route(
            "/v1/products",
            get(listings::list_all).merge(post(listings::create).route_layer(auth_layer.clone())),
        )
        .route("/v1/products/search", get(search::search))
        .route("/v1/products/popular", get(listings::popular))
        .route("/v1/products/user/{user_id}", get(listings::list_by_owner))
        .route(
            "/v1/products/recent-searches",
            get(recent_searches::list_handler)
                .post(recent_searches::record_handler)
                .delete(recent_searches::clear_handler)
                .route_layer(auth_layer.clone()),
        )
        .route(
            "/v1/products/recent-searches/{id}",
            delete(recent_searches::delete_handler).route_layer(auth_layer.clone()),
        )
        .route(
            "/v1/products/reports/{id}/status",
            patch(reports::set_status).route_layer(auth_layer.clone()),
        )
        .route(
            "/v1/products/{id}",
            get(listings::get_by_id).merge(
                put(listings::update)
                    .delete(listings::delete)
                    .route_layer(auth_layer.clone()),
            ),
        )
        .route("/v1/products/{id}/report", post(reports::create).route_layer(auth_layer.clone()))
        .route("/v1/products/{id}/reports", get(reports::list).route_layer(auth_layer.clone()));

    let user_routes = Router::new()
        .route("/v1/users/register", post(users::register_handler))
        .route(
            "/v1/users/profile",
            get(users::profile).put(users::update).route_layer(auth_layer.clone()),
        )
        .route("/v1/auth/login", post(auth::login).route_layer(auth_layer.clone()))
        .route("/v1/auth/me", get(auth::me).route_layer(auth_layer.clone()))
        .route(
            "/v1/questionnaire",
            get(questionnaire::get_handler)
                .post(questionnaire::submit_handler)
                .route_layer(auth_layer.clone()),
        );

    let notification_routes = Router::new()
        .route("/v1/notifications/send", post(notifications::send))
        .route("/v1/notifications/broadcast", post(notifications::broadcast_handler))
        .route("/v1/notifications/broadcasts", get(notifications::history_handler))
        .route_layer(auth_layer);

    Router::new()
        .route("/health", get(health))
        .merge(product_routes)
        .merge(user_routes)
        .merge(notification_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}
