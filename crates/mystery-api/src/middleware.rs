use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};

use mystery_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Session of a route where signing in is optional. `None` means an
/// anonymous visitor (no token, or a token that failed validation).
#[derive(Debug, Clone)]
pub struct Session(pub Option<Claims>);

/// Decode and validate the bearer token, if any.
pub fn session_from_headers(headers: &HeaderMap, jwt_secret: &str) -> Option<Claims> {
    let bearer = headers.typed_get::<Authorization<Bearer>>()?;

    decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Reject the request unless it carries a valid JWT; otherwise hand the
/// claims to the handler as an `Extension<Claims>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = session_from_headers(req.headers(), &state.jwt_secret)
        .ok_or_else(ApiError::unauthenticated)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Attach a [`Session`] without rejecting anonymous callers.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let session = Session(session_from_headers(req.headers(), &state.jwt_secret));
    req.extensions_mut().insert(session);
    next.run(req).await
}
