use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use ripple_types::api::{Claims, CreateCommentRequest, CreatePostRequest, LikeResponse};
use ripple_types::events::GatewayEvent;
use ripple_types::models::{Comment, Post};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::util;

const MAX_POST_LENGTH: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: pass the `created_at` of the oldest post
    /// from the previous page to fetch older ones.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    20
}

pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let db = state.clone();
    let viewer = claims.sub.to_string();
    let limit = query.limit.min(100);
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || {
        db.db.get_feed(&viewer, None, limit, before.as_deref())
    })
    .await??;

    Ok(Json(rows.iter().map(util::post_from_row).collect()))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("post content is required".into()));
    }
    if content.len() > MAX_POST_LENGTH {
        return Err(ApiError::Validation(format!(
            "post content exceeds {MAX_POST_LENGTH} characters"
        )));
    }

    let post_id = Uuid::new_v4();

    let db = state.clone();
    let author = claims.sub.to_string();
    let pid = post_id.to_string();
    let row = tokio::task::spawn_blocking(move || {
        db.db
            .insert_post(&pid, &author, &content, req.image_url.as_deref())?;
        // Re-read through the feed projection so the response matches what
        // other clients will fetch
        db.db.get_post(&author, &pid)
    })
    .await??
    .ok_or(ApiError::Provisioning)?;

    let post = util::post_from_row(&row);
    state
        .dispatcher
        .broadcast(GatewayEvent::PostCreate { post: post.clone() });

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let pid = post_id.to_string();
    let owner = claims.sub.to_string();
    let deleted =
        tokio::task::spawn_blocking(move || db.db.delete_post(&pid, &owner)).await??;

    // Someone else's post and a missing post look the same to the caller
    if !deleted {
        return Err(ApiError::NotFound);
    }

    state.dispatcher.broadcast(GatewayEvent::PostDelete {
        post_id,
        author_id: claims.sub,
    });

    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<LikeResponse>, ApiError> {
    toggle_like(state, post_id, claims, true).await
}

pub async fn unlike_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<LikeResponse>, ApiError> {
    toggle_like(state, post_id, claims, false).await
}

async fn toggle_like(
    state: AppState,
    post_id: Uuid,
    claims: Claims,
    liked: bool,
) -> Result<Json<LikeResponse>, ApiError> {
    let db = state.clone();
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();

    let (changed, likes_count) = tokio::task::spawn_blocking(move || {
        if !db.db.post_exists(&pid)? {
            return Err(ApiError::NotFound);
        }
        let changed = if liked {
            db.db.like_post(&Uuid::new_v4().to_string(), &pid, &uid)?
        } else {
            db.db.unlike_post(&pid, &uid)?
        };
        let count = db.db.count_likes(&pid)?;
        Ok::<_, ApiError>((changed, count))
    })
    .await??;

    // Repeated likes from a retried optimistic update change nothing and
    // need no event
    if changed {
        state.dispatcher.broadcast(GatewayEvent::LikeUpdate {
            post_id,
            likes_count,
        });
    }

    Ok(Json(LikeResponse { liked, likes_count }))
}

pub async fn get_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let db = state.clone();
    let pid = post_id.to_string();

    let rows = tokio::task::spawn_blocking(move || {
        if !db.db.post_exists(&pid)? {
            return Err(ApiError::NotFound);
        }
        Ok::<_, ApiError>(db.db.get_comments(&pid)?)
    })
    .await??;

    Ok(Json(rows.iter().map(util::comment_from_row).collect()))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("comment content is required".into()));
    }

    let comment_id = Uuid::new_v4();

    let db = state.clone();
    let pid = post_id.to_string();
    let cid = comment_id.to_string();
    let author = claims.sub.to_string();
    let row = tokio::task::spawn_blocking(move || {
        if !db.db.post_exists(&pid)? {
            return Err(ApiError::NotFound);
        }
        db.db.insert_comment(&cid, &pid, &author, &content)?;
        Ok::<_, ApiError>(db.db.get_comment(&cid)?)
    })
    .await??
    .ok_or(ApiError::Provisioning)?;

    let comment = util::comment_from_row(&row);
    state.dispatcher.broadcast(GatewayEvent::CommentCreate {
        post_id,
        comment: comment.clone(),
    });

    Ok((StatusCode::CREATED, Json(comment)))
}
