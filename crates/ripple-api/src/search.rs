use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use ripple_types::api::Claims;
use ripple_types::models::UserSummary;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::util;

const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Case-insensitive username search, excluding the caller.
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let q = query.q.trim().to_string();
    if q.is_empty() {
        return Ok(Json(vec![]));
    }

    let db = state.clone();
    let caller = claims.sub.to_string();
    let rows =
        tokio::task::spawn_blocking(move || db.db.search_users(&q, &caller, SEARCH_LIMIT))
            .await??;

    Ok(Json(rows.iter().map(util::user_summary).collect()))
}
