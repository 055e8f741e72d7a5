use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use ripple_types::api::{Claims, ContactResponse, SendMessageRequest};
use ripple_types::models::{Message, UserSummary};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::util;

/// Fetch the two-way conversation with a peer, oldest first. Opening the
/// conversation marks everything the peer sent us as read.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let peer = user_id.to_string();

    let rows = tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_id(&peer)?.is_none() {
            return Err(ApiError::NotFound);
        }
        db.db.mark_conversation_read(&peer, &me)?;
        Ok::<_, ApiError>(db.db.get_conversation(&me, &peer)?)
    })
    .await??;

    Ok(Json(rows.iter().map(util::message_from_row).collect()))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("message content is required".into()));
    }
    if user_id == claims.sub {
        return Err(ApiError::Validation(
            "you cannot message yourself".into(),
        ));
    }

    let message_id = Uuid::new_v4();

    let db = state.clone();
    let mid = message_id.to_string();
    let sender = claims.sub.to_string();
    let receiver = user_id.to_string();
    let body = content.clone();
    tokio::task::spawn_blocking(move || {
        if db.db.get_user_by_id(&receiver)?.is_none() {
            return Err(ApiError::NotFound);
        }
        db.db.insert_message(&mid, &sender, &receiver, &body)?;
        Ok::<_, ApiError>(())
    })
    .await??;

    let message = Message {
        id: message_id,
        sender_id: claims.sub,
        receiver_id: user_id,
        content,
        read: false,
        created_at: chrono::Utc::now(),
    };

    // Targeted delivery to the two endpoints of the conversation only
    state.dispatcher.deliver_message(message.clone()).await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// The chat sidebar: every other user with their unread count.
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_contacts(&me)).await??;

    let contacts = rows
        .iter()
        .map(|row| ContactResponse {
            user: UserSummary {
                id: util::parse_uuid(&row.id, "contact id"),
                username: row.username.clone(),
                full_name: row.full_name.clone(),
                avatar_url: row.avatar_url.clone(),
            },
            unread_count: row.unread_count,
        })
        .collect();

    Ok(Json(contacts))
}
