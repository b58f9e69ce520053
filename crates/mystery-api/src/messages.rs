use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use mystery_db::AppendOutcome;
use mystery_types::api::{
    ApiResponse, Claims, MessagesResponse, ReplyMessageRequest, SendMessageRequest, UsernameQuery,
};
use mystery_types::models::Message;

use crate::auth::{AppState, run_db};
use crate::convert::{message_from_row, sent_message_from_row};
use crate::error::ApiError;
use crate::middleware::Session;

/// Longest message body accepted, in characters.
pub const MAX_CONTENT_CHARS: usize = 300;

/// POST /api/send-message: Anonymous by default.
///
/// A message is attributed only when the body names a `senderId` and that id
/// is the caller's own session; anything else claiming a sender is refused.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let content = req.content.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    if content.is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::bad_request(format!(
            "Message must be no longer than {} characters",
            MAX_CONTENT_CHARS
        )));
    }

    let sender_id = match (req.sender_id, session.0) {
        (None, _) => None,
        (Some(claimed), Some(claims)) if claimed == claims.sub => Some(claimed),
        (Some(_), _) => {
            // An unknown recipient is reported before the sender mismatch.
            let to = username.clone();
            if run_db(&state, move |db| db.get_user_by_username(&to)).await?.is_none() {
                return Err(ApiError::not_found("User not found"));
            }
            return Err(ApiError::forbidden(
                "senderId must match the signed-in user",
            ));
        }
    };

    let message_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let to = username.clone();
    let outcome = run_db(&state, move |db| {
        let sender = sender_id.map(|id| id.to_string());
        db.append_message(&message_id, &to, &content, sender.as_deref(), now)
    })
    .await?;

    match outcome {
        AppendOutcome::OwnerNotFound => Err(ApiError::not_found("User not found")),
        AppendOutcome::NotAccepting => Err(ApiError::forbidden("User is not accepting messages")),
        AppendOutcome::Appended(row) => {
            info!(
                "Message {} delivered to {} ({})",
                row.id,
                username,
                if row.sender_id.is_some() { "attributed" } else { "anonymous" }
            );
            Ok(Json(ApiResponse::ok("Message sent successfully")))
        }
    }
}

/// GET /api/get-messages: The signed-in owner's inbox, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.get_inbox(&owner_id)).await?;

    Ok(Json(MessagesResponse {
        success: true,
        message: "Messages fetched successfully".into(),
        messages: rows.into_iter().map(message_from_row).collect(),
    }))
}

/// GET /api/get-public-messages?username=: The public Q&A board.
pub async fn get_public_messages(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let username = query.username.unwrap_or_default().trim().to_string();
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }

    let rows = run_db(&state, move |db| {
        let Some(owner) = db.get_user_by_username(&username)? else {
            return Ok(None);
        };
        db.get_public_messages(&owner.id).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(MessagesResponse {
        success: true,
        message: "Public messages fetched successfully".into(),
        messages: rows
            .into_iter()
            .map(message_from_row)
            .filter(Message::is_public_answer)
            .collect(),
    }))
}

/// GET /api/get-sent-messages: The signed-in user's outbox across owners.
pub async fn get_sent_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sender_id = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.get_sent_messages(&sender_id)).await?;

    Ok(Json(MessagesResponse {
        success: true,
        message: "Sent messages fetched successfully".into(),
        messages: rows.into_iter().map(sent_message_from_row).collect(),
    }))
}

/// POST /api/reply-message: Replying again overwrites the previous reply.
pub async fn reply_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ReplyMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let message_id = req.message_id.trim().to_string();
    let reply = req.content.trim().to_string();
    if message_id.is_empty() || reply.is_empty() {
        return Err(ApiError::bad_request("Message ID and content are required"));
    }

    let owner_id = claims.sub.to_string();
    let now = Utc::now();
    let row = run_db(&state, move |db| {
        db.reply_to_message(&owner_id, &message_id, &reply, now)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Message not found"))?;

    info!("User {} replied to message {}", claims.username, row.id);
    Ok(Json(ApiResponse::ok("Reply sent successfully")))
}

/// DELETE /api/delete-message/{id}
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = claims.sub.to_string();
    let id = message_id.clone();
    let removed = run_db(&state, move |db| db.delete_message(&owner_id, &id)).await?;

    if !removed {
        return Err(ApiError::not_found("Message not found or already deleted"));
    }

    info!("User {} deleted message {}", claims.username, message_id);
    Ok(Json(ApiResponse::ok("Message deleted")))
}
