use axum::{Extension, Json, extract::State, response::IntoResponse};
use axum_extra::extract::WithRejection;
use tracing::info;

use mystery_types::api::{AcceptMessageRequest, AcceptStatusResponse, Claims, UpdatedUserResponse};

use crate::auth::{AppState, run_db};
use crate::convert::user_from_row;
use crate::error::ApiError;

/// GET /api/accept-message
pub async fn get_accept_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let user = run_db(&state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(AcceptStatusResponse {
        success: true,
        message: "User found successfully".into(),
        is_accepting_messages: user.is_accepting_messages,
    }))
}

/// POST /api/accept-message
pub async fn update_accept_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<AcceptMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    let accepting = req.accept_message;
    let user = run_db(&state, move |db| db.set_accepting_messages(&id, accepting))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("User {} is accepting messages: {}", user.username, accepting);
    Ok(Json(UpdatedUserResponse {
        success: true,
        message: "Message acceptance status updated successfully".into(),
        updated_user: user_from_row(&user),
    }))
}
