use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::middleware::{optional_auth, require_auth};
use crate::{acceptance, messages, suggest};

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/sign-up", post(auth::sign_up))
        .route("/api/verify-code", post(auth::verify_code))
        .route("/api/sign-in", post(auth::sign_in))
        .route("/api/check-username-unique", get(auth::check_username_unique))
        .route("/api/get-public-messages", get(messages::get_public_messages))
        .route("/api/suggest-messages", post(suggest::suggest_messages));

    // Signing in is optional here; the session only matters for attribution.
    let ingress_routes = Router::new()
        .route("/api/send-message", post(messages::send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    let protected_routes = Router::new()
        .route(
            "/api/accept-message",
            get(acceptance::get_accept_status).post(acceptance::update_accept_status),
        )
        .route("/api/get-messages", get(messages::get_messages))
        .route("/api/get-sent-messages", get(messages::get_sent_messages))
        .route("/api/reply-message", post(messages::reply_message))
        .route("/api/delete-message/{message_id}", delete(messages::delete_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(ingress_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
